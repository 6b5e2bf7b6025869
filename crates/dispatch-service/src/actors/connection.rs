//! `ConnectionActor` - outbound writer for one client socket.
//!
//! Each `ConnectionActor`:
//! - Owns the write half of exactly one socket
//! - Serializes `ServerEvent`s to JSON text and writes them in mailbox order
//! - Never blocks its senders: [`ConnectionActorHandle::try_deliver`] drops
//!   the event when the mailbox is full
//!
//! The actor is generic over a `Sink<String>` so the WebSocket write half and
//! in-memory test channels drive the same code.
//!
//! # Lifecycle
//!
//! 1. Spawned by the socket handler when a connection is accepted
//! 2. Runs until `Close`, its mailbox closes, or its token is cancelled
//! 3. Cancellation via child token propagates from the `DispatcherActor`

use crate::errors::DispatchError;
use crate::protocol::ServerEvent;

use super::messages::ConnectionMessage;
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};

use common::types::ConnectionHandle;
use futures::{Sink, SinkExt};
use std::fmt::Display;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Default channel buffer size for the connection mailbox.
pub const DEFAULT_OUTBOUND_BUFFER: usize = 200;

/// Handle to a `ConnectionActor`.
#[derive(Clone, Debug)]
pub struct ConnectionActorHandle {
    sender: mpsc::Sender<ConnectionMessage>,
    cancel_token: CancellationToken,
    handle: ConnectionHandle,
    metrics: Arc<ActorMetrics>,
}

impl ConnectionActorHandle {
    /// Get the connection handle this actor writes for.
    #[must_use]
    pub fn handle(&self) -> ConnectionHandle {
        self.handle
    }

    /// Queue an event without waiting.
    ///
    /// Returns `false` if the event was dropped, either because the mailbox
    /// is full or because the actor has already stopped.
    pub fn try_deliver(&self, event: ServerEvent) -> bool {
        match self.sender.try_send(ConnectionMessage::Deliver { event }) {
            Ok(()) => true,
            Err(TrySendError::Full(ConnectionMessage::Deliver { event })) => {
                warn!(
                    target: "ds.actor.connection",
                    connection = %self.handle,
                    event = event.name(),
                    "Outbound mailbox full, dropping event"
                );
                self.metrics.record_drop(ActorType::Connection);
                false
            }
            Err(TrySendError::Full(_)) => {
                self.metrics.record_drop(ActorType::Connection);
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(
                    target: "ds.actor.connection",
                    connection = %self.handle,
                    "Outbound mailbox closed, event discarded"
                );
                false
            }
        }
    }

    /// Ask the actor to flush and close the socket.
    pub async fn close(&self, reason: String) -> Result<(), DispatchError> {
        self.sender
            .send(ConnectionMessage::Close { reason })
            .await
            .map_err(|e| DispatchError::Internal(format!("channel send failed: {e}")))
    }

    /// Cancel the connection actor.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// The `ConnectionActor` implementation.
pub struct ConnectionActor<S> {
    /// Connection this actor writes for.
    handle: ConnectionHandle,
    /// Outbound text sink.
    sink: S,
    /// Message receiver.
    receiver: mpsc::Receiver<ConnectionMessage>,
    /// Cancellation token (child of the dispatcher's token).
    cancel_token: CancellationToken,
    /// Shared metrics.
    metrics: Arc<ActorMetrics>,
    /// Mailbox monitor.
    mailbox: MailboxMonitor,
    /// Set once the sink has failed or been closed.
    is_closing: bool,
}

impl<S> ConnectionActor<S>
where
    S: Sink<String> + Unpin + Send + 'static,
    S::Error: Display + Send,
{
    /// Spawn a new connection actor writing to `sink`.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        handle: ConnectionHandle,
        sink: S,
        buffer: usize,
        cancel_token: CancellationToken,
        metrics: Arc<ActorMetrics>,
    ) -> (ConnectionActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));

        let actor = Self {
            handle,
            sink,
            receiver,
            cancel_token: cancel_token.clone(),
            metrics: Arc::clone(&metrics),
            mailbox: MailboxMonitor::new(ActorType::Connection, handle.to_string()),
            is_closing: false,
        };

        let task_handle = tokio::spawn(actor.run());

        let actor_handle = ConnectionActorHandle {
            sender,
            cancel_token,
            handle,
            metrics,
        };

        (actor_handle, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "ds.actor.connection", fields(connection = %self.handle))]
    async fn run(mut self) {
        debug!(
            target: "ds.actor.connection",
            connection = %self.handle,
            "ConnectionActor started"
        );

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(
                        target: "ds.actor.connection",
                        connection = %self.handle,
                        "ConnectionActor received cancellation signal"
                    );
                    self.graceful_close("cancelled").await;
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.mailbox.record_depth(self.receiver.len());
                            let should_exit = self.handle_message(message).await;
                            self.mailbox.record_processed();
                            self.metrics.record_message_processed();

                            if should_exit {
                                break;
                            }
                        }
                        None => {
                            debug!(
                                target: "ds.actor.connection",
                                connection = %self.handle,
                                "ConnectionActor channel closed, exiting"
                            );
                            self.graceful_close("mailbox closed").await;
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "ds.actor.connection",
            connection = %self.handle,
            messages_processed = self.mailbox.messages_processed(),
            "ConnectionActor stopped"
        );
    }

    /// Handle a single message. Returns true if the actor should exit.
    async fn handle_message(&mut self, message: ConnectionMessage) -> bool {
        match message {
            ConnectionMessage::Deliver { event } => {
                self.handle_deliver(event).await;
                false
            }

            ConnectionMessage::Close { reason } => {
                self.graceful_close(&reason).await;
                true
            }
        }
    }

    /// Write one event to the socket.
    async fn handle_deliver(&mut self, event: ServerEvent) {
        if self.is_closing {
            debug!(
                target: "ds.actor.connection",
                connection = %self.handle,
                event = event.name(),
                "Discarding event, connection is closing"
            );
            return;
        }

        let text = match serde_json::to_string(&event) {
            Ok(text) => text,
            Err(e) => {
                warn!(
                    target: "ds.actor.connection",
                    connection = %self.handle,
                    event = event.name(),
                    error = %e,
                    "Failed to serialize outbound event"
                );
                return;
            }
        };

        if let Err(e) = self.sink.send(text).await {
            // The reader side notices the broken socket and disconnects.
            debug!(
                target: "ds.actor.connection",
                connection = %self.handle,
                event = event.name(),
                error = %e,
                "Socket write failed"
            );
            self.is_closing = true;
        }
    }

    /// Close the outbound side of the socket once.
    async fn graceful_close(&mut self, reason: &str) {
        if self.is_closing {
            return;
        }
        self.is_closing = true;

        debug!(
            target: "ds.actor.connection",
            connection = %self.handle,
            reason = reason,
            "Closing connection"
        );

        if let Err(e) = self.sink.close().await {
            debug!(
                target: "ds.actor.connection",
                connection = %self.handle,
                error = %e,
                "Socket close failed"
            );
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use futures::channel::mpsc as fmpsc;
    use futures::StreamExt;
    use serde_json::Value;
    use std::time::Duration;

    fn spawn_actor(
        buffer: usize,
    ) -> (
        ConnectionActorHandle,
        JoinHandle<()>,
        fmpsc::UnboundedReceiver<String>,
        Arc<ActorMetrics>,
    ) {
        let (tx, rx) = fmpsc::unbounded::<String>();
        let metrics = ActorMetrics::new();
        let (handle, task) = ConnectionActor::spawn(
            ConnectionHandle::new(),
            tx,
            buffer,
            CancellationToken::new(),
            Arc::clone(&metrics),
        );
        (handle, task, rx, metrics)
    }

    #[tokio::test]
    async fn test_deliver_writes_json_in_order() {
        let (handle, task, mut rx, _metrics) = spawn_actor(DEFAULT_OUTBOUND_BUFFER);

        assert!(handle.try_deliver(ServerEvent::NoPoliceAvailable));
        assert!(handle.try_deliver(ServerEvent::ReceiveNotification {
            message: "hello".to_string(),
        }));

        let first: Value = serde_json::from_str(&rx.next().await.unwrap()).unwrap();
        let second: Value = serde_json::from_str(&rx.next().await.unwrap()).unwrap();
        assert_eq!(first.get("event"), Some(&Value::from("noPoliceAvailable")));
        assert_eq!(second.get("event"), Some(&Value::from("receiveNotification")));
        assert_eq!(
            second.pointer("/data/message"),
            Some(&Value::from("hello"))
        );

        handle.close("test".to_string()).await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_close_closes_sink() {
        let (handle, task, mut rx, _metrics) = spawn_actor(DEFAULT_OUTBOUND_BUFFER);

        handle.close("done".to_string()).await.unwrap();
        task.await.unwrap();

        // Sink closed: the stream terminates.
        assert!(rx.next().await.is_none());
        assert!(!handle.try_deliver(ServerEvent::NoPoliceAvailable));
    }

    #[tokio::test]
    async fn test_cancellation_stops_actor() {
        let (handle, task, _rx, _metrics) = spawn_actor(DEFAULT_OUTBOUND_BUFFER);

        handle.cancel();
        assert!(handle.is_cancelled());

        let result = tokio::time::timeout(Duration::from_secs(1), task).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_full_mailbox_drops_without_blocking() {
        let metrics = ActorMetrics::new();
        let token = CancellationToken::new();

        // Build the handle by hand so no actor drains the mailbox.
        let (sender, _receiver) = mpsc::channel(1);
        let handle = ConnectionActorHandle {
            sender,
            cancel_token: token,
            handle: ConnectionHandle::new(),
            metrics: Arc::clone(&metrics),
        };

        assert!(handle.try_deliver(ServerEvent::NoPoliceAvailable));
        assert!(!handle.try_deliver(ServerEvent::NoPoliceAvailable));
        assert_eq!(metrics.dropped_count(), 1);
    }
}

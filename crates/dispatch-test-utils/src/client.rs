//! In-memory signaling clients.

use dispatch_service::actors::{
    ActorMetrics, ConnectionActor, ConnectionActorHandle, DisconnectSummary,
    DispatcherActorHandle,
};
use dispatch_service::errors::DispatchError;
use dispatch_service::handlers::handle_frame;
use dispatch_service::protocol::{ClientEvent, ServerEvent};
use dispatch_service::state::RoleDeclaration;

use common::types::ConnectionHandle;
use futures::channel::mpsc::{unbounded, UnboundedReceiver};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;

/// How long `next_event` waits before failing the test.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(1);

/// How long `expect_silence` listens.
pub const SILENCE_WINDOW: Duration = Duration::from_millis(50);

/// Outbound mailbox size for test clients.
const TEST_OUTBOUND_BUFFER: usize = 64;

/// A dispatcher plus the metrics its connections share.
///
/// The dispatcher is cancelled when the harness is dropped.
pub struct TestHarness {
    pub dispatcher: DispatcherActorHandle,
    pub metrics: Arc<ActorMetrics>,
}

impl TestHarness {
    /// Harness with a generous connection limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_connections(1_000)
    }

    #[must_use]
    pub fn with_max_connections(max_connections: usize) -> Self {
        let metrics = ActorMetrics::new();
        let dispatcher = DispatcherActorHandle::new(
            "ds-test".to_string(),
            max_connections,
            Arc::clone(&metrics),
        );
        Self {
            dispatcher,
            metrics,
        }
    }

    /// Attach a new client, panicking if the dispatcher refuses it.
    pub async fn connect(&self) -> TestClient {
        self.try_connect()
            .await
            .expect("dispatcher should accept the connection")
    }

    /// Attach a new client.
    ///
    /// # Errors
    ///
    /// Whatever `attach` fails with (capacity, draining).
    pub async fn try_connect(&self) -> Result<TestClient, DispatchError> {
        let handle = ConnectionHandle::new();
        let (tx, inbound) = unbounded::<String>();
        let (outbox, task_handle) = ConnectionActor::spawn(
            handle,
            tx,
            TEST_OUTBOUND_BUFFER,
            self.dispatcher.child_token(),
            Arc::clone(&self.metrics),
        );

        self.dispatcher
            .attach(handle, outbox.clone(), task_handle)
            .await?;

        Ok(TestClient {
            dispatcher: self.dispatcher.clone(),
            outbox,
            inbound,
        })
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TestHarness {
    fn drop(&mut self) {
        self.dispatcher.cancel();
    }
}

/// One attached connection, seen from the client side.
pub struct TestClient {
    dispatcher: DispatcherActorHandle,
    outbox: ConnectionActorHandle,
    inbound: UnboundedReceiver<String>,
}

impl TestClient {
    /// Connection handle assigned at attach.
    #[must_use]
    pub fn handle(&self) -> ConnectionHandle {
        self.outbox.handle()
    }

    /// Send an event as a JSON text frame.
    ///
    /// # Errors
    ///
    /// The error the event failed with. It has also been reported to this
    /// client as an `error` event unless it was `NoResponderAvailable`.
    pub async fn send(&self, event: &ClientEvent) -> Result<(), DispatchError> {
        let text = serde_json::to_string(event).expect("client events serialize");
        self.send_raw(&text).await
    }

    /// Send an arbitrary text frame.
    ///
    /// # Errors
    ///
    /// See [`TestClient::send`].
    pub async fn send_raw(&self, text: &str) -> Result<(), DispatchError> {
        handle_frame(&self.dispatcher, &self.outbox, text).await
    }

    /// Register and consume the `registered` acknowledgement.
    pub async fn register(&mut self, declaration: impl Into<RoleDeclaration>) {
        let declaration = declaration.into();
        let role = declaration.role;
        self.send(&ClientEvent::RegisterRole(declaration))
            .await
            .expect("registration should succeed");

        match self.next_event().await {
            ServerEvent::Registered { handle, role: acked } => {
                assert_eq!(handle, self.handle(), "registered ack for wrong handle");
                assert_eq!(acked, role, "registered ack for wrong role");
            }
            other => panic!("expected registered, got {other:?}"),
        }
    }

    /// Wait for the next outbound event.
    pub async fn next_event(&mut self) -> ServerEvent {
        let text = tokio::time::timeout(EVENT_TIMEOUT, self.inbound.next())
            .await
            .unwrap_or_else(|_| panic!("no event for {} within {EVENT_TIMEOUT:?}", self.handle()))
            .unwrap_or_else(|| panic!("socket for {} was closed", self.handle()));

        serde_json::from_str(&text)
            .unwrap_or_else(|e| panic!("outbound frame is not a server event: {e}: {text}"))
    }

    /// Assert nothing arrives for a short window.
    pub async fn expect_silence(&mut self) {
        if let Ok(frame) = tokio::time::timeout(SILENCE_WINDOW, self.inbound.next()).await {
            panic!("expected silence for {}, got {frame:?}", self.handle());
        }
    }

    /// Wait until the socket is closed by the server.
    pub async fn expect_closed(&mut self) {
        loop {
            match tokio::time::timeout(EVENT_TIMEOUT, self.inbound.next()).await {
                Ok(None) => return,
                Ok(Some(_)) => {}
                Err(_) => panic!("socket for {} was not closed", self.handle()),
            }
        }
    }

    /// Drop the connection the way the socket task does.
    pub async fn disconnect(self) -> DisconnectSummary {
        self.dispatcher
            .disconnect(self.handle())
            .await
            .expect("dispatcher should process disconnect")
    }
}

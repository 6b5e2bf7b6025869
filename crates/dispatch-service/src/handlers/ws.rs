//! WebSocket signaling endpoint.
//!
//! `GET /ws` upgrades to a socket carrying JSON text frames (see
//! [`crate::protocol`]). Each socket gets a fresh [`ConnectionHandle`]; the
//! write half is owned by a `ConnectionActor` and the read half is driven by
//! the upgrade task below.
//!
//! Inbound events are applied by the dispatcher in arrival order. Errors are
//! answered with an `error` event on the same socket and never close it.

use crate::actors::{ConnectionActor, ConnectionActorHandle, DispatcherActorHandle};
use crate::errors::DispatchError;
use crate::observability::metrics as prom;
use crate::protocol::{ClientEvent, ServerEvent, MAX_FRAME_BYTES};
use crate::routes::AppState;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use common::types::ConnectionHandle;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Handler for `GET /ws`.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.max_message_size(MAX_FRAME_BYTES)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

/// Drive one socket from attach to disconnect.
#[instrument(skip_all, name = "ds.transport.ws", fields(connection = tracing::field::Empty))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let handle = ConnectionHandle::new();
    tracing::Span::current().record("connection", tracing::field::display(handle));

    let (sink, mut stream) = socket.split();
    let sink = sink.with(|text: String| {
        futures::future::ready(Ok::<_, axum::Error>(Message::Text(text)))
    });

    let cancel_token = state.dispatcher.child_token();
    let (outbox, task_handle) = ConnectionActor::spawn(
        handle,
        sink,
        state.config.outbound_buffer,
        cancel_token.clone(),
        Arc::clone(&state.metrics),
    );

    if let Err(e) = state
        .dispatcher
        .attach(handle, outbox.clone(), task_handle)
        .await
    {
        warn!(
            target: "ds.transport.ws",
            connection = %handle,
            error = %e,
            "Rejecting socket"
        );
        outbox.try_deliver(ServerEvent::from_error(&e));
        if let Err(close_err) = outbox.close(e.client_message()).await {
            debug!(
                target: "ds.transport.ws",
                connection = %handle,
                error = %close_err,
                "Outbox already gone"
            );
        }
        return;
    }

    info!(target: "ds.transport.ws", connection = %handle, "Socket attached");

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                debug!(target: "ds.transport.ws", connection = %handle, "Socket cancelled");
                break;
            }

            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        // Failures were already reported on the socket.
                        let _ = handle_frame(&state.dispatcher, &outbox, &text).await;
                    }
                    Some(Ok(Message::Binary(_))) => {
                        debug!(target: "ds.transport.ws", connection = %handle, "Ignoring binary frame");
                    }
                    // axum answers pings itself
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(target: "ds.transport.ws", connection = %handle, "Client closed socket");
                        break;
                    }
                    Some(Err(e)) => {
                        debug!(
                            target: "ds.transport.ws",
                            connection = %handle,
                            error = %e,
                            "Socket read failed"
                        );
                        break;
                    }
                }
            }
        }
    }

    match state.dispatcher.disconnect(handle).await {
        Ok(summary) => info!(
            target: "ds.transport.ws",
            connection = %handle,
            role = summary.role.map_or("unregistered", |role| role.as_str()),
            orphaned_operators = summary.orphaned_operators.len(),
            "Socket detached"
        ),
        Err(e) => {
            // Dispatcher already stopped; make sure the writer exits too.
            debug!(
                target: "ds.transport.ws",
                connection = %handle,
                error = %e,
                "Disconnect not processed"
            );
            outbox.cancel();
        }
    }
}

/// Decode one text frame and apply it.
///
/// Any error other than `NoResponderAvailable` (which already produced a
/// `noPoliceAvailable` event) is reported back on `outbox` as an `error`
/// event before being returned.
///
/// # Errors
///
/// Returns the error the event failed with.
pub async fn handle_frame(
    dispatcher: &DispatcherActorHandle,
    outbox: &ConnectionActorHandle,
    text: &str,
) -> Result<(), DispatchError> {
    let result = match ClientEvent::parse(text) {
        Ok(event) => route_event(dispatcher, outbox.handle(), event).await,
        Err(e) => {
            prom::record_event_rejected("frame", e.as_label());
            Err(e)
        }
    };

    if let Err(e) = &result {
        debug!(
            target: "ds.transport.ws",
            connection = %outbox.handle(),
            error = %e,
            "Event failed"
        );
        if !matches!(e, DispatchError::NoResponderAvailable) {
            outbox.try_deliver(ServerEvent::from_error(e));
        }
    }

    result
}

async fn route_event(
    dispatcher: &DispatcherActorHandle,
    handle: ConnectionHandle,
    event: ClientEvent,
) -> Result<(), DispatchError> {
    match event {
        ClientEvent::RegisterRole(declaration) => {
            dispatcher.register_role(handle, declaration).await?;
        }
        ClientEvent::Emergency(report) => {
            dispatcher.report_emergency(handle, report).await?;
        }
        ClientEvent::TrafficStatus(report) => {
            dispatcher.report_status(handle, report).await?;
        }
        ClientEvent::UpdateLocation(position) => {
            dispatcher.update_location(handle, position).await?;
        }
        ClientEvent::SendNotification(request) => {
            dispatcher.send_notification(handle, request).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::actors::ActorMetrics;
    use futures::channel::mpsc::{unbounded, UnboundedReceiver};
    use serde_json::Value;
    use std::time::Duration;

    async fn attached(
        dispatcher: &DispatcherActorHandle,
        metrics: &Arc<ActorMetrics>,
    ) -> (ConnectionActorHandle, UnboundedReceiver<String>) {
        let (tx, rx) = unbounded::<String>();
        let handle = ConnectionHandle::new();
        let (outbox, task) = ConnectionActor::spawn(
            handle,
            tx,
            16,
            dispatcher.child_token(),
            Arc::clone(metrics),
        );
        dispatcher.attach(handle, outbox.clone(), task).await.unwrap();
        (outbox, rx)
    }

    async fn next_event(rx: &mut UnboundedReceiver<String>) -> Value {
        let text = tokio::time::timeout(Duration::from_secs(1), rx.next())
            .await
            .expect("timed out waiting for frame")
            .expect("sink closed");
        serde_json::from_str(&text).unwrap()
    }

    #[tokio::test]
    async fn test_malformed_frame_is_answered_with_error() {
        let metrics = ActorMetrics::new();
        let dispatcher = DispatcherActorHandle::new("ds-test".to_string(), 10, Arc::clone(&metrics));
        let (outbox, mut rx) = attached(&dispatcher, &metrics).await;

        let result = handle_frame(&dispatcher, &outbox, "{not json").await;
        assert!(matches!(result, Err(DispatchError::RejectedInput(_))));

        let event = next_event(&mut rx).await;
        assert_eq!(event.get("event").and_then(Value::as_str), Some("error"));
        assert_eq!(event.pointer("/data/code").and_then(Value::as_i64), Some(1));

        // Socket is still usable.
        handle_frame(
            &dispatcher,
            &outbox,
            r#"{"event":"registerRole","data":{"role":"officer"}}"#,
        )
        .await
        .unwrap();
        let event = next_event(&mut rx).await;
        assert_eq!(event.get("event").and_then(Value::as_str), Some("registered"));

        dispatcher.cancel();
    }

    #[tokio::test]
    async fn test_no_responder_sends_only_no_police_available() {
        let metrics = ActorMetrics::new();
        let dispatcher = DispatcherActorHandle::new("ds-test".to_string(), 10, Arc::clone(&metrics));
        let (outbox, mut rx) = attached(&dispatcher, &metrics).await;

        handle_frame(
            &dispatcher,
            &outbox,
            r#"{"event":"registerRole","data":{"role":"operator","identity":"KA-01"}}"#,
        )
        .await
        .unwrap();
        next_event(&mut rx).await;

        let result = handle_frame(
            &dispatcher,
            &outbox,
            r#"{"event":"emergency","data":{"identity":"KA-01","location":{"lat":1.0,"lon":1.0}}}"#,
        )
        .await;
        assert!(matches!(result, Err(DispatchError::NoResponderAvailable)));

        let event = next_event(&mut rx).await;
        assert_eq!(
            event.get("event").and_then(Value::as_str),
            Some("noPoliceAvailable")
        );
        assert!(
            tokio::time::timeout(Duration::from_millis(50), rx.next())
                .await
                .is_err(),
            "no error event should follow"
        );

        dispatcher.cancel();
    }

    #[tokio::test]
    async fn test_unregistered_event_reports_not_registered() {
        let metrics = ActorMetrics::new();
        let dispatcher = DispatcherActorHandle::new("ds-test".to_string(), 10, Arc::clone(&metrics));
        let (outbox, mut rx) = attached(&dispatcher, &metrics).await;

        let result = handle_frame(
            &dispatcher,
            &outbox,
            r#"{"event":"sendNotification","data":{"identity":"KA-01","message":"hi"}}"#,
        )
        .await;
        assert!(matches!(result, Err(DispatchError::NotRegistered(_))));

        let event = next_event(&mut rx).await;
        assert_eq!(event.pointer("/data/code").and_then(Value::as_i64), Some(2));

        dispatcher.cancel();
    }
}

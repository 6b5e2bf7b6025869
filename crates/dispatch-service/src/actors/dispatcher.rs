//! `DispatcherActor` - singleton owner of all dispatch state.
//!
//! The `DispatcherActor` is the top-level actor of the service:
//!
//! - Singleton per service instance
//! - Owns `ConnectionRegistry`, `IdentityIndex` and `PairingTable`
//! - Tracks the outbox (`ConnectionActorHandle`) of every attached socket
//! - Owns the root `CancellationToken` for graceful shutdown
//! - Monitors connection actor health (panic detection via `JoinHandle`)
//!
//! Every request is handled to completion before the next one is taken from
//! the mailbox, so registration, dispatch, status routing, broadcast and
//! disconnect are each a single atomic step against the shared state.
//! Outbound events are enqueued with `try_deliver` and never awaited.
//!
//! # Graceful Shutdown
//!
//! On shutdown the dispatcher:
//! 1. Sets `accepting_new = false` (new attachments fail with `Draining`)
//! 2. Cancels the root token (propagates to every connection actor)
//! 3. Waits up to the shutdown deadline for connection actors to finish

use crate::errors::DispatchError;
use crate::observability::metrics as prom;
use crate::protocol::{EmergencyReport, NotificationRequest, ServerEvent, StatusReport};
use crate::state::{ConnectionRegistry, IdentityIndex, PairingTable, Role, RoleDeclaration, Session};

use super::connection::ConnectionActorHandle;
use super::messages::{DisconnectSummary, DispatcherMessage, DispatcherStatus, OfficerSelection};
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};

use common::types::{ConnectionHandle, Coordinates};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Default channel buffer size for the dispatcher mailbox.
const DISPATCHER_CHANNEL_BUFFER: usize = 1000;

/// Default time to wait for connection actors during shutdown.
const DEFAULT_SHUTDOWN_DEADLINE: Duration = Duration::from_secs(5);

/// Handle to the `DispatcherActor`.
///
/// This is the public interface for interacting with the dispatcher.
/// All methods are async and return results via oneshot channels.
#[derive(Clone, Debug)]
pub struct DispatcherActorHandle {
    sender: mpsc::Sender<DispatcherMessage>,
    cancel_token: CancellationToken,
    instance_id: String,
}

impl DispatcherActorHandle {
    /// Create a new `DispatcherActor` and return a handle to it.
    ///
    /// This spawns the actor task and returns immediately.
    ///
    /// # Arguments
    ///
    /// * `instance_id` - Service instance ID (logs and status)
    /// * `max_connections` - Maximum number of attached sockets
    /// * `metrics` - Shared actor metrics
    #[must_use]
    pub fn new(instance_id: String, max_connections: usize, metrics: Arc<ActorMetrics>) -> Self {
        let (sender, receiver) = mpsc::channel(DISPATCHER_CHANNEL_BUFFER);
        let cancel_token = CancellationToken::new();

        let actor = DispatcherActor::new(
            instance_id.clone(),
            receiver,
            cancel_token.clone(),
            max_connections,
            metrics,
        );

        tokio::spawn(actor.run());

        Self {
            sender,
            cancel_token,
            instance_id,
        }
    }

    /// Service instance ID.
    #[must_use]
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Start tracking an accepted socket.
    ///
    /// Fails with `CapacityExceeded` at the connection limit and with
    /// `Draining` once shutdown has begun.
    pub async fn attach(
        &self,
        handle: ConnectionHandle,
        outbox: ConnectionActorHandle,
        task_handle: JoinHandle<()>,
    ) -> Result<(), DispatchError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(DispatcherMessage::Attach {
                handle,
                outbox,
                task_handle,
                respond_to: tx,
            })
            .await
            .map_err(|e| DispatchError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| DispatchError::Internal(format!("response receive failed: {e}")))?
    }

    /// Register (or re-register) the role of a connection.
    pub async fn register_role(
        &self,
        handle: ConnectionHandle,
        declaration: RoleDeclaration,
    ) -> Result<Session, DispatchError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(DispatcherMessage::RegisterRole {
                handle,
                declaration,
                respond_to: tx,
            })
            .await
            .map_err(|e| DispatchError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| DispatchError::Internal(format!("response receive failed: {e}")))?
    }

    /// Dispatch the nearest officer to an operator's emergency.
    pub async fn report_emergency(
        &self,
        handle: ConnectionHandle,
        report: EmergencyReport,
    ) -> Result<OfficerSelection, DispatchError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(DispatcherMessage::ReportEmergency {
                handle,
                report,
                respond_to: tx,
            })
            .await
            .map_err(|e| DispatchError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| DispatchError::Internal(format!("response receive failed: {e}")))?
    }

    /// Route an officer's status reply to an operator.
    ///
    /// Returns the handle of the operator that received it.
    pub async fn report_status(
        &self,
        handle: ConnectionHandle,
        report: StatusReport,
    ) -> Result<ConnectionHandle, DispatchError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(DispatcherMessage::ReportStatus {
                handle,
                report,
                respond_to: tx,
            })
            .await
            .map_err(|e| DispatchError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| DispatchError::Internal(format!("response receive failed: {e}")))?
    }

    /// Store a new position and broadcast it to every other session.
    ///
    /// Returns the number of sessions the update was enqueued for.
    pub async fn update_location(
        &self,
        handle: ConnectionHandle,
        position: Coordinates,
    ) -> Result<usize, DispatchError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(DispatcherMessage::UpdateLocation {
                handle,
                position,
                respond_to: tx,
            })
            .await
            .map_err(|e| DispatchError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| DispatchError::Internal(format!("response receive failed: {e}")))?
    }

    /// Send a direct message to the operator holding an identity.
    pub async fn send_notification(
        &self,
        handle: ConnectionHandle,
        request: NotificationRequest,
    ) -> Result<ConnectionHandle, DispatchError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(DispatcherMessage::SendNotification {
                handle,
                request,
                respond_to: tx,
            })
            .await
            .map_err(|e| DispatchError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| DispatchError::Internal(format!("response receive failed: {e}")))?
    }

    /// Erase every trace of a connection.
    pub async fn disconnect(
        &self,
        handle: ConnectionHandle,
    ) -> Result<DisconnectSummary, DispatchError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(DispatcherMessage::Disconnect {
                handle,
                respond_to: tx,
            })
            .await
            .map_err(|e| DispatchError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| DispatchError::Internal(format!("response receive failed: {e}")))
    }

    /// Get the registered session of a connection.
    pub async fn get_session(
        &self,
        handle: ConnectionHandle,
    ) -> Result<Option<Session>, DispatchError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(DispatcherMessage::GetSession {
                handle,
                respond_to: tx,
            })
            .await
            .map_err(|e| DispatchError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| DispatchError::Internal(format!("response receive failed: {e}")))
    }

    /// Get the connection currently holding an operator identity.
    pub async fn resolve_identity(
        &self,
        identity: String,
    ) -> Result<Option<ConnectionHandle>, DispatchError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(DispatcherMessage::ResolveIdentity {
                identity,
                respond_to: tx,
            })
            .await
            .map_err(|e| DispatchError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| DispatchError::Internal(format!("response receive failed: {e}")))
    }

    /// Get the officer responding to an operator's emergency.
    pub async fn pairing_for(
        &self,
        operator: ConnectionHandle,
    ) -> Result<Option<ConnectionHandle>, DispatchError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(DispatcherMessage::PairingFor {
                operator,
                respond_to: tx,
            })
            .await
            .map_err(|e| DispatchError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| DispatchError::Internal(format!("response receive failed: {e}")))
    }

    /// Get the current dispatcher status.
    pub async fn get_status(&self) -> Result<DispatcherStatus, DispatchError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(DispatcherMessage::GetStatus { respond_to: tx })
            .await
            .map_err(|e| DispatchError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| DispatchError::Internal(format!("response receive failed: {e}")))
    }

    /// Initiate graceful shutdown.
    pub async fn shutdown(&self, deadline: Duration) -> Result<(), DispatchError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(DispatcherMessage::Shutdown {
                deadline,
                respond_to: tx,
            })
            .await
            .map_err(|e| DispatchError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| DispatchError::Internal(format!("response receive failed: {e}")))?
    }

    /// Cancel the actor (for immediate shutdown).
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Get a child token for spawning connection actors.
    #[must_use]
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }
}

/// Internal state for an attached socket.
struct ManagedConnection {
    /// Outbound mailbox of the socket.
    outbox: ConnectionActorHandle,
    /// Join handle for monitoring the actor task.
    task_handle: JoinHandle<()>,
}

/// The `DispatcherActor` implementation.
///
/// This struct owns the dispatch state and runs the message loop.
pub struct DispatcherActor {
    /// Service instance ID.
    instance_id: String,
    /// Message receiver.
    receiver: mpsc::Receiver<DispatcherMessage>,
    /// Cancellation token (root).
    cancel_token: CancellationToken,
    /// Maximum number of attached sockets.
    max_connections: usize,
    /// Attached sockets by handle.
    connections: HashMap<ConnectionHandle, ManagedConnection>,
    /// Registered sessions.
    registry: ConnectionRegistry,
    /// Operator identity to handle.
    identities: IdentityIndex,
    /// Active emergencies.
    pairings: PairingTable,
    /// Whether new attachments are accepted.
    accepting_new: bool,
    /// How long to wait for connection actors on shutdown.
    shutdown_deadline: Duration,
    /// Shared metrics.
    metrics: Arc<ActorMetrics>,
    /// Mailbox monitor.
    mailbox: MailboxMonitor,
}

impl DispatcherActor {
    /// Create a new dispatcher actor (not started).
    fn new(
        instance_id: String,
        receiver: mpsc::Receiver<DispatcherMessage>,
        cancel_token: CancellationToken,
        max_connections: usize,
        metrics: Arc<ActorMetrics>,
    ) -> Self {
        let mailbox = MailboxMonitor::new(ActorType::Dispatcher, &instance_id);

        Self {
            instance_id,
            receiver,
            cancel_token,
            max_connections,
            connections: HashMap::new(),
            registry: ConnectionRegistry::new(),
            identities: IdentityIndex::new(),
            pairings: PairingTable::new(),
            accepting_new: true,
            shutdown_deadline: DEFAULT_SHUTDOWN_DEADLINE,
            metrics,
            mailbox,
        }
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "ds.actor.dispatcher", fields(instance_id = %self.instance_id))]
    async fn run(mut self) {
        info!(
            target: "ds.actor.dispatcher",
            instance_id = %self.instance_id,
            max_connections = self.max_connections,
            "DispatcherActor started"
        );

        loop {
            // Check for terminated connection actors
            self.check_connection_health().await;

            tokio::select! {
                // Handle cancellation
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "ds.actor.dispatcher",
                        instance_id = %self.instance_id,
                        "DispatcherActor received cancellation signal"
                    );
                    self.graceful_shutdown().await;
                    break;
                }

                // Handle messages
                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.mailbox.record_depth(self.receiver.len());
                            self.handle_message(message);
                            self.mailbox.record_processed();
                            self.metrics.record_message_processed();
                        }
                        None => {
                            info!(
                                target: "ds.actor.dispatcher",
                                instance_id = %self.instance_id,
                                "DispatcherActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "ds.actor.dispatcher",
            instance_id = %self.instance_id,
            sessions_remaining = self.registry.len(),
            messages_processed = self.mailbox.messages_processed(),
            "DispatcherActor stopped"
        );
    }

    /// Handle a single message.
    fn handle_message(&mut self, message: DispatcherMessage) {
        match message {
            DispatcherMessage::Attach {
                handle,
                outbox,
                task_handle,
                respond_to,
            } => {
                let result = self.attach(handle, outbox, task_handle);
                let _ = respond_to.send(result);
            }

            DispatcherMessage::RegisterRole {
                handle,
                declaration,
                respond_to,
            } => {
                let started = Instant::now();
                let result = self.register_role(handle, declaration);
                self.finish_event("registerRole", started, result.as_ref().err());
                let _ = respond_to.send(result);
            }

            DispatcherMessage::ReportEmergency {
                handle,
                report,
                respond_to,
            } => {
                let started = Instant::now();
                let result = self.report_emergency(handle, report);
                self.finish_event("emergency", started, result.as_ref().err());
                let _ = respond_to.send(result);
            }

            DispatcherMessage::ReportStatus {
                handle,
                report,
                respond_to,
            } => {
                let started = Instant::now();
                let result = self.report_status(handle, report);
                self.finish_event("trafficStatus", started, result.as_ref().err());
                let _ = respond_to.send(result);
            }

            DispatcherMessage::UpdateLocation {
                handle,
                position,
                respond_to,
            } => {
                let started = Instant::now();
                let result = self.update_location(handle, position);
                self.finish_event("updateLocation", started, result.as_ref().err());
                let _ = respond_to.send(result);
            }

            DispatcherMessage::SendNotification {
                handle,
                request,
                respond_to,
            } => {
                let started = Instant::now();
                let result = self.send_notification(handle, request);
                self.finish_event("sendNotification", started, result.as_ref().err());
                let _ = respond_to.send(result);
            }

            DispatcherMessage::Disconnect { handle, respond_to } => {
                let started = Instant::now();
                let summary = self.disconnect(handle);
                self.finish_event("disconnect", started, None);
                let _ = respond_to.send(summary);
            }

            DispatcherMessage::GetSession { handle, respond_to } => {
                let _ = respond_to.send(self.registry.get(&handle).cloned());
            }

            DispatcherMessage::ResolveIdentity {
                identity,
                respond_to,
            } => {
                let _ = respond_to.send(self.identities.resolve(&identity));
            }

            DispatcherMessage::PairingFor {
                operator,
                respond_to,
            } => {
                let _ = respond_to.send(self.pairings.responder_for(&operator));
            }

            DispatcherMessage::GetStatus { respond_to } => {
                let _ = respond_to.send(self.get_status());
            }

            DispatcherMessage::Shutdown {
                deadline,
                respond_to,
            } => {
                let result = self.initiate_shutdown(deadline);
                let _ = respond_to.send(result);
            }
        }
    }

    /// Record latency and rejection metrics for one client event.
    fn finish_event(&self, event: &'static str, started: Instant, error: Option<&DispatchError>) {
        prom::record_event_latency(event, started.elapsed());

        if let Some(err) = error {
            // NoResponderAvailable is a normal outcome with its own counter.
            if !matches!(err, DispatchError::NoResponderAvailable) {
                prom::record_event_rejected(event, err.as_label());
            }
            debug!(
                target: "ds.actor.dispatcher",
                instance_id = %self.instance_id,
                event = event,
                error = %err,
                "Event not applied"
            );
        }
    }

    /// Start tracking an accepted socket.
    fn attach(
        &mut self,
        handle: ConnectionHandle,
        outbox: ConnectionActorHandle,
        task_handle: JoinHandle<()>,
    ) -> Result<(), DispatchError> {
        if !self.accepting_new {
            return Err(DispatchError::Draining);
        }

        if self.connections.len() >= self.max_connections {
            warn!(
                target: "ds.actor.dispatcher",
                instance_id = %self.instance_id,
                max_connections = self.max_connections,
                "Connection limit reached, refusing socket"
            );
            return Err(DispatchError::CapacityExceeded);
        }

        if self.connections.contains_key(&handle) {
            return Err(DispatchError::Internal(
                "connection handle already attached".to_string(),
            ));
        }

        self.connections.insert(
            handle,
            ManagedConnection {
                outbox,
                task_handle,
            },
        );
        self.metrics.connection_attached();

        debug!(
            target: "ds.actor.dispatcher",
            instance_id = %self.instance_id,
            connection = %handle,
            total_connections = self.connections.len(),
            "Connection attached"
        );

        Ok(())
    }

    /// Validate a role declaration and store the resulting session.
    fn register_role(
        &mut self,
        handle: ConnectionHandle,
        declaration: RoleDeclaration,
    ) -> Result<Session, DispatchError> {
        if !self.connections.contains_key(&handle) {
            return Err(DispatchError::NotRegistered(
                "connection is not attached".to_string(),
            ));
        }

        let session = declaration.into_session(handle, chrono::Utc::now().timestamp())?;

        if let Some(previous) = self.registry.upsert(session.clone()) {
            // The old record is replaced whole; drop index and pairing
            // entries it no longer justifies.
            if let Some(old_identity) = previous.operator_identity() {
                if session.operator_identity() != Some(old_identity) {
                    self.identities.release(old_identity, handle);
                }
            }
            if previous.role != session.role {
                self.pairings.clear(&handle);
                self.pairings.release_officer(&handle);
            }
        }

        if let Some(identity) = session.operator_identity() {
            if let Some(superseded) = self.identities.claim(identity, handle) {
                info!(
                    target: "ds.actor.dispatcher",
                    instance_id = %self.instance_id,
                    connection = %handle,
                    superseded = %superseded,
                    "Identity claimed by a newer connection"
                );
            }
        }

        self.publish_session_counts();
        self.deliver(
            &handle,
            ServerEvent::Registered {
                handle,
                role: session.role,
            },
        );

        info!(
            target: "ds.actor.dispatcher",
            instance_id = %self.instance_id,
            connection = %handle,
            role = session.role.as_str(),
            has_position = session.position.is_some(),
            "Role registered"
        );

        Ok(session)
    }

    /// Select the nearest officer with a known position and pair it.
    fn report_emergency(
        &mut self,
        handle: ConnectionHandle,
        report: EmergencyReport,
    ) -> Result<OfficerSelection, DispatchError> {
        let session = self.require_session(&handle)?;
        if session.role != Role::Operator {
            return Err(DispatchError::NotRegistered(
                "only operators can report emergencies".to_string(),
            ));
        }

        let reported_identity = report.identity.trim();
        if reported_identity.is_empty() {
            return Err(DispatchError::RejectedInput(
                "emergency identity is required".to_string(),
            ));
        }
        let location = report.location.validate()?;

        if reported_identity != session.identity {
            warn!(
                target: "ds.actor.dispatcher",
                instance_id = %self.instance_id,
                connection = %handle,
                "Emergency identity differs from registered identity, using registered identity"
            );
        }
        let identity = session.identity.clone();

        let Some(selection) = self.nearest_officer(location) else {
            self.deliver(&handle, ServerEvent::NoPoliceAvailable);
            prom::record_emergency("no_responder");
            info!(
                target: "ds.actor.dispatcher",
                instance_id = %self.instance_id,
                connection = %handle,
                "No officer available for emergency"
            );
            return Err(DispatchError::NoResponderAvailable);
        };

        if let Some(replaced) =
            self.pairings
                .pair(handle, selection.officer, chrono::Utc::now().timestamp())
        {
            debug!(
                target: "ds.actor.dispatcher",
                instance_id = %self.instance_id,
                connection = %handle,
                replaced = %replaced,
                "New emergency replaced an active pairing"
            );
        }

        self.deliver(
            &selection.officer,
            ServerEvent::EmergencyAlert { identity, location },
        );
        self.deliver(
            &handle,
            ServerEvent::PoliceLocation {
                lat: selection.position.lat,
                lon: selection.position.lon,
            },
        );
        prom::record_emergency("dispatched");

        info!(
            target: "ds.actor.dispatcher",
            instance_id = %self.instance_id,
            connection = %handle,
            officer = %selection.officer,
            distance = selection.distance,
            "Emergency dispatched"
        );

        Ok(selection)
    }

    /// Officer with the smallest planar distance to `location`.
    ///
    /// Officers without a position are ineligible. Ties go to the first
    /// officer in registry iteration order.
    fn nearest_officer(&self, location: Coordinates) -> Option<OfficerSelection> {
        self.registry
            .iter()
            .filter_map(|session| {
                session.dispatchable_position().map(|position| OfficerSelection {
                    officer: session.handle,
                    position,
                    distance: position.planar_distance(&location),
                })
            })
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }

    /// Route a status reply to the targeted or paired operator.
    ///
    /// The sender is not required to be registered; a sender with no
    /// pairing and no explicit target resolves to `UnknownTarget`.
    fn report_status(
        &mut self,
        handle: ConnectionHandle,
        report: StatusReport,
    ) -> Result<ConnectionHandle, DispatchError> {
        let status = report.status.trim();
        if status.is_empty() {
            return Err(DispatchError::RejectedInput(
                "status is required".to_string(),
            ));
        }

        let target_identity = report
            .target_identity
            .as_deref()
            .map(str::trim)
            .filter(|identity| !identity.is_empty());

        let operator = match target_identity {
            Some(identity) => self.resolve_operator(identity),
            None => self.paired_operator(&handle),
        };

        let Some(operator) = operator else {
            prom::record_status_update("unknown_target");
            return Err(DispatchError::UnknownTarget);
        };

        self.deliver(
            &operator,
            ServerEvent::TrafficStatusUpdate {
                status: status.to_string(),
            },
        );

        // Clear-after-read: further status replies need a fresh emergency.
        let answered = self
            .pairings
            .get(&operator)
            .filter(|pairing| pairing.officer == handle)
            .copied();
        if let Some(pairing) = answered {
            self.pairings.clear(&operator);
            let age_secs = chrono::Utc::now()
                .timestamp()
                .saturating_sub(pairing.paired_at)
                .max(0);
            prom::record_emergency_response(Duration::from_secs(age_secs.unsigned_abs()));
            debug!(
                target: "ds.actor.dispatcher",
                instance_id = %self.instance_id,
                operator = %operator,
                response_secs = age_secs,
                "Emergency answered, pairing cleared"
            );
        }
        prom::record_status_update("delivered");

        debug!(
            target: "ds.actor.dispatcher",
            instance_id = %self.instance_id,
            connection = %handle,
            operator = %operator,
            "Status update delivered"
        );

        Ok(operator)
    }

    /// Store a position and broadcast it to every other registered session.
    fn update_location(
        &mut self,
        handle: ConnectionHandle,
        position: Coordinates,
    ) -> Result<usize, DispatchError> {
        let position = position.validate()?;

        let role = self
            .registry
            .update_position(&handle, position)
            .map(|session| session.role)
            .ok_or_else(|| {
                DispatchError::NotRegistered("register a role before updating location".to_string())
            })?;

        let event = ServerEvent::LiveLocationUpdate {
            handle,
            lat: position.lat,
            lon: position.lon,
            role,
        };

        let mut recipients = 0;
        for peer in self.registry.iter().filter(|s| s.handle != handle) {
            if let Some(managed) = self.connections.get(&peer.handle) {
                if managed.outbox.try_deliver(event.clone()) {
                    recipients += 1;
                }
            }
        }

        prom::record_location_broadcast();

        debug!(
            target: "ds.actor.dispatcher",
            instance_id = %self.instance_id,
            connection = %handle,
            recipients = recipients,
            "Location broadcast"
        );

        Ok(recipients)
    }

    /// Deliver a direct message to an identity-resolved operator.
    fn send_notification(
        &mut self,
        handle: ConnectionHandle,
        request: NotificationRequest,
    ) -> Result<ConnectionHandle, DispatchError> {
        self.require_session(&handle)?;

        let identity = request.identity.trim();
        if identity.is_empty() {
            return Err(DispatchError::RejectedInput(
                "notification identity is required".to_string(),
            ));
        }

        let Some(operator) = self.resolve_operator(identity) else {
            prom::record_notification("unknown_target");
            return Err(DispatchError::UnknownTarget);
        };

        self.deliver(
            &operator,
            ServerEvent::ReceiveNotification {
                message: request.message,
            },
        );
        prom::record_notification("delivered");

        Ok(operator)
    }

    /// Remove a connection from the outbox map, then purge its state.
    fn disconnect(&mut self, handle: ConnectionHandle) -> DisconnectSummary {
        if let Some(managed) = self.connections.remove(&handle) {
            managed.outbox.cancel();
            self.metrics.connection_detached();
            self.reap_connection(handle, managed.task_handle);
        }

        self.purge_session(handle)
    }

    /// Remove a connection from the registry, index and pairing table in
    /// one step.
    fn purge_session(&mut self, handle: ConnectionHandle) -> DisconnectSummary {
        let mut summary = DisconnectSummary::default();

        if let Some(session) = self.registry.remove(&handle) {
            summary.role = Some(session.role);
            if let Some(identity) = session.operator_identity() {
                summary.released_identity = self.identities.release(identity, handle);
            }
        }

        self.pairings.clear(&handle);
        summary.orphaned_operators = self.pairings.release_officer(&handle);

        self.publish_session_counts();

        info!(
            target: "ds.actor.dispatcher",
            instance_id = %self.instance_id,
            connection = %handle,
            role = summary.role.map_or("unregistered", |r| r.as_str()),
            released_identity = summary.released_identity,
            orphaned_operators = summary.orphaned_operators.len(),
            "Connection removed"
        );

        summary
    }

    /// Session of `handle`, or `NotRegistered`.
    fn require_session(&self, handle: &ConnectionHandle) -> Result<&Session, DispatchError> {
        self.registry.get(handle).ok_or_else(|| {
            DispatchError::NotRegistered("register a role first".to_string())
        })
    }

    /// Resolve an identity to a connected operator.
    ///
    /// An index entry whose handle is no longer a registered operator is
    /// removed.
    fn resolve_operator(&mut self, identity: &str) -> Option<ConnectionHandle> {
        let candidate = self.identities.resolve(identity)?;

        if self.registry.has_role(&candidate, Role::Operator) {
            return Some(candidate);
        }

        self.identities.release(identity, candidate);
        prom::record_stale_reference("identity");
        warn!(
            target: "ds.actor.dispatcher",
            instance_id = %self.instance_id,
            stale = %candidate,
            "Removed stale identity entry"
        );
        None
    }

    /// Oldest operator paired with `officer`, if that operator is still
    /// connected.
    ///
    /// A pairing whose operator is gone is removed.
    fn paired_operator(&mut self, officer: &ConnectionHandle) -> Option<ConnectionHandle> {
        let operator = self.pairings.operator_for(officer)?;

        if self.registry.has_role(&operator, Role::Operator) {
            return Some(operator);
        }

        self.pairings.clear(&operator);
        prom::record_stale_reference("pairing");
        warn!(
            target: "ds.actor.dispatcher",
            instance_id = %self.instance_id,
            stale = %operator,
            "Removed stale pairing"
        );
        None
    }

    /// Enqueue an event for one connection without waiting.
    fn deliver(&self, handle: &ConnectionHandle, event: ServerEvent) {
        match self.connections.get(handle) {
            Some(managed) => {
                managed.outbox.try_deliver(event);
            }
            None => {
                debug!(
                    target: "ds.actor.dispatcher",
                    instance_id = %self.instance_id,
                    connection = %handle,
                    event = event.name(),
                    "No outbox for connection, event discarded"
                );
            }
        }
    }

    /// Push per-role session gauges.
    fn publish_session_counts(&self) {
        let operators = self.registry.count_by_role(Role::Operator);
        let officers = self.registry.count_by_role(Role::Officer);
        prom::set_sessions_active(Role::Operator.as_str(), operators);
        prom::set_sessions_active(Role::Officer.as_str(), officers);
        self.metrics.set_sessions(self.registry.len());
    }

    /// Wait for a removed connection actor in the background.
    fn reap_connection(&self, handle: ConnectionHandle, task_handle: JoinHandle<()>) {
        let instance_id = self.instance_id.clone();
        let metrics = Arc::clone(&self.metrics);
        tokio::spawn(async move {
            match tokio::time::timeout(Duration::from_secs(5), task_handle).await {
                Ok(Ok(())) => {
                    debug!(
                        target: "ds.actor.dispatcher",
                        instance_id = %instance_id,
                        connection = %handle,
                        "Connection actor task completed cleanly"
                    );
                }
                Ok(Err(e)) => {
                    if e.is_panic() {
                        metrics.record_panic(ActorType::Connection);
                    }
                    warn!(
                        target: "ds.actor.dispatcher",
                        instance_id = %instance_id,
                        connection = %handle,
                        error = ?e,
                        "Connection actor task failed during removal"
                    );
                }
                Err(_) => {
                    warn!(
                        target: "ds.actor.dispatcher",
                        instance_id = %instance_id,
                        connection = %handle,
                        "Connection actor task cleanup timed out"
                    );
                }
            }
        });
    }

    /// Get current dispatcher status.
    fn get_status(&self) -> DispatcherStatus {
        DispatcherStatus {
            instance_id: self.instance_id.clone(),
            connections: self.connections.len(),
            operators: self.registry.count_by_role(Role::Operator),
            officers: self.registry.count_by_role(Role::Officer),
            active_pairings: self.pairings.len(),
            indexed_identities: self.identities.len(),
            accepting_new: self.accepting_new,
            mailbox_peak: self.mailbox.peak_depth(),
        }
    }

    /// Initiate graceful shutdown.
    fn initiate_shutdown(&mut self, deadline: Duration) -> Result<(), DispatchError> {
        info!(
            target: "ds.actor.dispatcher",
            instance_id = %self.instance_id,
            connection_count = self.connections.len(),
            deadline_secs = deadline.as_secs(),
            "Initiating graceful shutdown"
        );

        self.accepting_new = false;
        self.shutdown_deadline = deadline;

        // Cancel the root token (propagates to all connection actors)
        self.cancel_token.cancel();

        Ok(())
    }

    /// Perform graceful shutdown.
    async fn graceful_shutdown(&mut self) {
        info!(
            target: "ds.actor.dispatcher",
            instance_id = %self.instance_id,
            connection_count = self.connections.len(),
            "Performing graceful shutdown"
        );

        self.accepting_new = false;

        for managed in self.connections.values() {
            managed.outbox.cancel();
        }

        let deadline = self.shutdown_deadline;
        for (handle, managed) in self.connections.drain() {
            match tokio::time::timeout(deadline, managed.task_handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(
                        target: "ds.actor.dispatcher",
                        instance_id = %self.instance_id,
                        connection = %handle,
                        error = ?e,
                        "Connection actor task failed during shutdown"
                    );
                }
                Err(_) => {
                    warn!(
                        target: "ds.actor.dispatcher",
                        instance_id = %self.instance_id,
                        connection = %handle,
                        "Connection actor shutdown timed out"
                    );
                }
            }
            self.metrics.connection_detached();
        }

        info!(
            target: "ds.actor.dispatcher",
            instance_id = %self.instance_id,
            "Graceful shutdown complete"
        );
    }

    /// Check health of attached connection actors.
    ///
    /// A connection actor only stops on its own when its socket is gone or
    /// it panicked; either way the connection is removed.
    async fn check_connection_health(&mut self) {
        let finished: Vec<ConnectionHandle> = self
            .connections
            .iter()
            .filter(|(_, managed)| managed.task_handle.is_finished())
            .map(|(handle, _)| *handle)
            .collect();

        for handle in finished {
            let Some(managed) = self.connections.remove(&handle) else {
                continue;
            };
            self.metrics.connection_detached();

            match managed.task_handle.await {
                Ok(()) => {
                    debug!(
                        target: "ds.actor.dispatcher",
                        instance_id = %self.instance_id,
                        connection = %handle,
                        "Connection actor exited, removing connection"
                    );
                }
                Err(join_error) => {
                    if join_error.is_panic() {
                        error!(
                            target: "ds.actor.dispatcher",
                            instance_id = %self.instance_id,
                            connection = %handle,
                            error = ?join_error,
                            "Connection actor panicked - triggering investigation"
                        );
                        self.metrics.record_panic(ActorType::Connection);
                    }
                }
            }

            self.purge_session(handle);
        }
    }
}

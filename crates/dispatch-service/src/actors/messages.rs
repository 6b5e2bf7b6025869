//! Message types for actor communication.
//!
//! Requests to the dispatcher carry a `oneshot` reply channel; deliveries to
//! connection actors are fire-and-forget.

use crate::errors::DispatchError;
use crate::protocol::{EmergencyReport, NotificationRequest, ServerEvent, StatusReport};
use crate::state::{Role, RoleDeclaration, Session};

use super::connection::ConnectionActorHandle;

use common::types::{ConnectionHandle, Coordinates};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Messages sent to the `DispatcherActor`.
#[derive(Debug)]
pub enum DispatcherMessage {
    /// A socket was accepted; start tracking its outbox.
    Attach {
        handle: ConnectionHandle,
        outbox: ConnectionActorHandle,
        task_handle: JoinHandle<()>,
        respond_to: oneshot::Sender<Result<(), DispatchError>>,
    },

    /// `registerRole` from a client.
    RegisterRole {
        handle: ConnectionHandle,
        declaration: RoleDeclaration,
        respond_to: oneshot::Sender<Result<Session, DispatchError>>,
    },

    /// `emergency` from an operator.
    ReportEmergency {
        handle: ConnectionHandle,
        report: EmergencyReport,
        respond_to: oneshot::Sender<Result<OfficerSelection, DispatchError>>,
    },

    /// `trafficStatus` from an officer.
    ReportStatus {
        handle: ConnectionHandle,
        report: StatusReport,
        respond_to: oneshot::Sender<Result<ConnectionHandle, DispatchError>>,
    },

    /// `updateLocation` from any registered client.
    UpdateLocation {
        handle: ConnectionHandle,
        position: Coordinates,
        respond_to: oneshot::Sender<Result<usize, DispatchError>>,
    },

    /// `sendNotification` from any registered client.
    SendNotification {
        handle: ConnectionHandle,
        request: NotificationRequest,
        respond_to: oneshot::Sender<Result<ConnectionHandle, DispatchError>>,
    },

    /// The socket closed.
    Disconnect {
        handle: ConnectionHandle,
        respond_to: oneshot::Sender<DisconnectSummary>,
    },

    /// Look up a registered session.
    GetSession {
        handle: ConnectionHandle,
        respond_to: oneshot::Sender<Option<Session>>,
    },

    /// Look up the connection currently holding an operator identity.
    ResolveIdentity {
        identity: String,
        respond_to: oneshot::Sender<Option<ConnectionHandle>>,
    },

    /// Look up the officer paired with an operator.
    PairingFor {
        operator: ConnectionHandle,
        respond_to: oneshot::Sender<Option<ConnectionHandle>>,
    },

    /// Get current dispatcher status.
    GetStatus {
        respond_to: oneshot::Sender<DispatcherStatus>,
    },

    /// Stop accepting connections and cancel every connection actor.
    Shutdown {
        deadline: Duration,
        respond_to: oneshot::Sender<Result<(), DispatchError>>,
    },
}

/// Messages sent to a `ConnectionActor`.
#[derive(Debug)]
pub enum ConnectionMessage {
    /// Serialize and write an event to the client.
    Deliver { event: ServerEvent },

    /// Flush and close the outbound side.
    Close { reason: String },
}

/// Result of a successful emergency dispatch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OfficerSelection {
    /// Officer that received the alert.
    pub officer: ConnectionHandle,
    /// Officer position at selection time.
    pub position: Coordinates,
    /// Planar distance from the emergency location.
    pub distance: f64,
}

/// What a disconnect removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisconnectSummary {
    /// Role the connection was registered with, if any.
    pub role: Option<Role>,
    /// Whether the identity index entry was released.
    pub released_identity: bool,
    /// Operators whose responder this connection was.
    pub orphaned_operators: Vec<ConnectionHandle>,
}

/// Dispatcher status snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherStatus {
    /// Service instance ID.
    pub instance_id: String,
    /// Attached sockets, registered or not.
    pub connections: usize,
    /// Registered operators.
    pub operators: usize,
    /// Registered officers.
    pub officers: usize,
    /// Emergencies awaiting a status reply.
    pub active_pairings: usize,
    /// Operator identities in the index.
    pub indexed_identities: usize,
    /// Whether new connections are accepted.
    pub accepting_new: bool,
    /// Largest mailbox backlog seen by the dispatcher.
    pub mailbox_peak: usize,
}

//! Actor model implementation for the Dispatch Service.
//!
//! ```text
//! DispatcherActor (singleton per instance)
//! ├── owns ConnectionRegistry, IdentityIndex, PairingTable
//! └── tracks N ConnectionActors
//!     └── ConnectionActor (one per socket, owns the write half)
//! ```
//!
//! # Key Design Decisions
//!
//! - **Single owner**: all dispatch state lives in the `DispatcherActor`, so
//!   each client event is applied atomically
//! - **Fire-and-forget delivery**: outbound events are enqueued with
//!   `try_send`; a slow socket drops its own events and never stalls others
//! - **CancellationToken propagation**: connection actors run on child tokens
//!   of the dispatcher's root token
//! - **Mailbox monitoring**: Queued backlog sampled on every receive, with thresholds (Dispatcher: 100/500, Connection: 50/200)
//!
//! # Modules
//!
//! - [`dispatcher`] - `DispatcherActor` singleton and its handle
//! - [`connection`] - `ConnectionActor` per socket
//! - [`messages`] - Message types for actor communication
//! - [`metrics`] - Mailbox monitoring and actor metrics

pub mod connection;
pub mod dispatcher;
pub mod messages;
pub mod metrics;

// Re-export primary types
pub use connection::{ConnectionActor, ConnectionActorHandle, DEFAULT_OUTBOUND_BUFFER};
pub use dispatcher::{DispatcherActor, DispatcherActorHandle};
pub use messages::*;
pub use metrics::{ActorMetrics, ActorType, MailboxLevel, MailboxMonitor};

//! Shared dispatch state.
//!
//! Plain data structures with no locking of their own. They are owned by the
//! `DispatcherActor`, whose mailbox serializes every access.
//!
//! - [`registry`] - `ConnectionRegistry`, handle to `Session`
//! - [`identity`] - `IdentityIndex`, vehicle plate to handle
//! - [`pairing`] - `PairingTable`, operator to responding officer
//! - [`roles`] - `RoleDeclaration` validation

pub mod identity;
pub mod pairing;
pub mod registry;
pub mod roles;

pub use identity::IdentityIndex;
pub use pairing::{Pairing, PairingTable};
pub use registry::{ConnectionRegistry, Role, Session};
pub use roles::RoleDeclaration;

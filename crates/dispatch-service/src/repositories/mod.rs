//! Repository layer for the Dispatch Service.
//!
//! The only stored data is user accounts. Connection state is never
//! persisted; it lives in the `DispatcherActor`.

pub mod users;

pub use users::{InMemoryUserStore, NewUser, UserProfile, UserStore};

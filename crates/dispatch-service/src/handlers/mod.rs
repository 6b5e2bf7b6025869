//! HTTP and WebSocket handlers for the Dispatch Service.
//!
//! Health and metrics live on a separate listener; see
//! [`crate::observability::health`].

pub mod users;
pub mod ws;

pub use users::{login_user, register_user};
pub use ws::{handle_frame, ws_handler};

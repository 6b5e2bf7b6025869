//! Dispatch Service Library
//!
//! This library provides the core functionality for the Rescue Link
//! Dispatch Service - a stateful WebSocket signaling server that connects
//! emergency vehicle operators with traffic officers:
//!
//! - Connection registry and role registration
//! - Nearest-officer selection when an operator reports an emergency
//! - Status routing from the responding officer back to the operator
//! - Live position broadcast between all registered sessions
//! - Cleanup of every index and pairing when a socket drops
//!
//! # Architecture
//!
//! ```text
//! WebSocket handler (one task per socket, read half)
//! └── DispatcherActor (singleton, owns all dispatch state)
//!     └── ConnectionActor (one per socket, write half)
//! ```
//!
//! # Modules
//!
//! - [`actors`] - Dispatcher and connection actors
//! - [`config`] - Service configuration from environment
//! - [`errors`] - Error types with client-facing error codes
//! - [`handlers`] - WebSocket and user account handlers
//! - [`observability`] - Health endpoints and Prometheus metrics
//! - [`protocol`] - JSON wire events
//! - [`repositories`] - User account store
//! - [`routes`] - Axum router and application state
//! - [`state`] - Registry, identity index and pairing table

pub mod actors;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod observability;
pub mod protocol;
pub mod repositories;
pub mod routes;
pub mod state;

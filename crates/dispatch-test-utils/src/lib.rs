//! # Dispatch Test Utilities
//!
//! Shared test utilities for the Dispatch Service.
//!
//! Clients are attached to a real `DispatcherActor` through real
//! `ConnectionActor`s; only the socket is replaced by an in-memory sink, so
//! every frame goes through the same decode, route and encode path as
//! production traffic.
//!
//! ## Modules
//!
//! - `client` - `TestHarness` and `TestClient`
//! - `fixtures` - `TestOperator` and `TestOfficer` builders
//! - `assertions` - Expressive checks on received events
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dispatch_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let harness = TestHarness::new();
//!     let mut operator = harness.connect().await;
//!     let mut officer = harness.connect().await;
//!
//!     operator.register(TestOperator::new("KA-01")).await;
//!     officer.register(TestOfficer::new().at(12.0, 77.0)).await;
//!
//!     operator.send(&TestOperator::new("KA-01").emergency_at(12.1, 77.1)).await.unwrap();
//!     officer.next_event().await.assert_emergency_alert("KA-01");
//! }
//! ```

pub mod assertions;
pub mod client;
pub mod fixtures;

// Re-export commonly used items
pub use assertions::*;
pub use client::*;
pub use fixtures::*;

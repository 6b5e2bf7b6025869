//! Observability module for the Dispatch Service.
//!
//! # Privacy by Default
//!
//! Actor loops use `#[instrument(skip_all)]` with explicit fields. Vehicle
//! plates, positions and message bodies are never logged or used as metric
//! labels; connections are identified by their opaque handle.
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `ds_connections_active` | Gauge | none | Attached sockets |
//! | `ds_sessions_active` | Gauge | `role` | Registered sessions |
//! | `ds_actor_mailbox_depth` | Gauge | `actor_type` | Messages queued behind the one in progress |
//! | `ds_emergencies_total` | Counter | `outcome` | Dispatch results |
//! | `ds_status_updates_total` | Counter | `outcome` | Status routing results |
//! | `ds_notifications_total` | Counter | `outcome` | Direct message results |
//! | `ds_location_broadcasts_total` | Counter | none | Position broadcasts |
//! | `ds_events_rejected_total` | Counter | `event`, `reason` | Events not applied |
//! | `ds_stale_references_total` | Counter | `index` | Lazy cleanups |
//! | `ds_event_latency_seconds` | Histogram | `event` | Dispatcher processing time |
//! | `ds_emergency_response_seconds` | Histogram | none | Emergency to first status |
//! | `ds_actor_panics_total` | Counter | `actor_type` | Bugs |
//! | `ds_messages_dropped_total` | Counter | `actor_type` | Slow consumers |

pub mod health;
pub mod metrics;

// Re-exports for convenience
pub use health::{health_router, HealthState};
pub use metrics::init_metrics_recorder;

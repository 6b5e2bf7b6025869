//! Metrics definitions for the Dispatch Service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `ds_` prefix for Dispatch Service
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `actor_type`: 2 values (dispatcher, connection)
//! - `role`: 2 values (operator, officer)
//! - `event`: bounded by the inbound event set (~6 values)
//! - `outcome`: 2-3 values per metric
//! - `index`: 2 values (identity, pairing)

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Event handling is in-memory; most events finish well under 1ms
        .set_buckets_for_metric(
            Matcher::Prefix("ds_event".to_string()),
            &[
                0.0001, 0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250,
            ],
        )
        .map_err(|e| format!("Failed to set event latency buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

// ============================================================================
// Connection & Session Metrics (Gauges)
// ============================================================================

/// Set the number of attached sockets.
///
/// Metric: `ds_connections_active`
/// Labels: none
pub fn set_connections_active(count: u64) {
    // u64 to f64 conversion is safe for realistic connection counts (< 2^53)
    #[allow(clippy::cast_precision_loss)]
    gauge!("ds_connections_active").set(count as f64);
}

/// Set the number of registered sessions for a role.
///
/// Metric: `ds_sessions_active`
/// Labels: `role` (operator, officer)
pub fn set_sessions_active(role: &str, count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("ds_sessions_active", "role" => role.to_string()).set(count as f64);
}

/// Set the mailbox depth for an actor type.
///
/// Metric: `ds_actor_mailbox_depth`
/// Labels: `actor_type` (dispatcher, connection)
pub fn set_actor_mailbox_depth(actor_type: &str, depth: usize) {
    // usize to f64 conversion is safe for realistic mailbox depths
    #[allow(clippy::cast_precision_loss)]
    gauge!("ds_actor_mailbox_depth", "actor_type" => actor_type.to_string()).set(depth as f64);
}

// ============================================================================
// Dispatch Outcomes (Counters)
// ============================================================================

/// Record an emergency report outcome.
///
/// Metric: `ds_emergencies_total`
/// Labels: `outcome` (dispatched, no_responder)
pub fn record_emergency(outcome: &str) {
    counter!("ds_emergencies_total", "outcome" => outcome.to_string()).increment(1);
}

/// Record a status update outcome.
///
/// Metric: `ds_status_updates_total`
/// Labels: `outcome` (delivered, unknown_target)
pub fn record_status_update(outcome: &str) {
    counter!("ds_status_updates_total", "outcome" => outcome.to_string()).increment(1);
}

/// Record a direct notification outcome.
///
/// Metric: `ds_notifications_total`
/// Labels: `outcome` (delivered, unknown_target)
pub fn record_notification(outcome: &str) {
    counter!("ds_notifications_total", "outcome" => outcome.to_string()).increment(1);
}

/// Record one location broadcast.
///
/// Metric: `ds_location_broadcasts_total`
/// Labels: none
pub fn record_location_broadcast() {
    counter!("ds_location_broadcasts_total").increment(1);
}

/// Record a client event that was not applied.
///
/// Metric: `ds_events_rejected_total`
/// Labels: `event`, `reason` (bounded by `DispatchError::as_label`)
pub fn record_event_rejected(event: &str, reason: &str) {
    counter!(
        "ds_events_rejected_total",
        "event" => event.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// Record a stale index or pairing entry found at resolution time.
///
/// Metric: `ds_stale_references_total`
/// Labels: `index` (identity, pairing)
///
/// Disconnect cleanup should keep this at zero.
pub fn record_stale_reference(index: &str) {
    counter!("ds_stale_references_total", "index" => index.to_string()).increment(1);
}

// ============================================================================
// Latency (Histograms)
// ============================================================================

/// Record time spent applying one client event inside the dispatcher.
///
/// Metric: `ds_event_latency_seconds`
/// Labels: `event`
pub fn record_event_latency(event: &str, duration: Duration) {
    histogram!("ds_event_latency_seconds", "event" => event.to_string())
        .record(duration.as_secs_f64());
}

/// Record how long an emergency waited for its responder's first status.
///
/// Metric: `ds_emergency_response_seconds`
/// Labels: none
pub fn record_emergency_response(duration: Duration) {
    histogram!("ds_emergency_response_seconds").record(duration.as_secs_f64());
}

// ============================================================================
// Actor Health (Counters)
// ============================================================================

/// Record an actor panic event.
///
/// Metric: `ds_actor_panics_total`
/// Labels: `actor_type`
///
/// ALERT: Any non-zero value indicates a bug and should trigger investigation.
pub fn record_actor_panic(actor_type: &str) {
    counter!("ds_actor_panics_total", "actor_type" => actor_type.to_string()).increment(1);
}

/// Record messages dropped due to backpressure.
///
/// Metric: `ds_messages_dropped_total`
/// Labels: `actor_type`
///
/// Non-zero values indicate slow clients or an overloaded instance.
pub fn record_message_dropped(actor_type: &str) {
    counter!("ds_messages_dropped_total", "actor_type" => actor_type.to_string()).increment(1);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    // Without a recorder installed these calls are no-ops; they must never
    // panic.

    #[test]
    fn test_gauges_without_recorder() {
        set_connections_active(0);
        set_connections_active(10_000);
        set_sessions_active("operator", 3);
        set_sessions_active("officer", 7);
        set_actor_mailbox_depth("dispatcher", 0);
        set_actor_mailbox_depth("connection", 200);
    }

    #[test]
    fn test_counters_without_recorder() {
        record_emergency("dispatched");
        record_emergency("no_responder");
        record_status_update("delivered");
        record_notification("unknown_target");
        record_location_broadcast();
        record_event_rejected("emergency", "rejected_input");
        record_stale_reference("pairing");
        record_actor_panic("connection");
        record_message_dropped("connection");
        record_event_latency("emergency", Duration::from_micros(150));
        record_emergency_response(Duration::from_secs(42));
    }

    #[test]
    fn test_metric_names_and_labels() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            set_connections_active(2);
            set_sessions_active("officer", 1);
            record_emergency("dispatched");
            record_emergency("dispatched");
            record_status_update("unknown_target");
            record_location_broadcast();
            record_stale_reference("identity");
            record_message_dropped("connection");
            record_event_latency("updateLocation", Duration::from_millis(1));
            record_emergency_response(Duration::from_secs(30));
        });

        let metrics = snapshotter.snapshot().into_vec();
        let names: Vec<String> = metrics
            .iter()
            .map(|(key, _, _, _)| key.key().name().to_string())
            .collect();

        for expected in [
            "ds_connections_active",
            "ds_sessions_active",
            "ds_emergencies_total",
            "ds_status_updates_total",
            "ds_location_broadcasts_total",
            "ds_stale_references_total",
            "ds_messages_dropped_total",
            "ds_event_latency_seconds",
            "ds_emergency_response_seconds",
        ] {
            assert!(
                names.iter().any(|n| n == expected),
                "missing metric {expected}, got {names:?}"
            );
        }

        let emergencies = metrics
            .iter()
            .find(|(key, _, _, _)| key.key().name() == "ds_emergencies_total")
            .map(|(_, _, _, value)| value.clone());
        assert_eq!(emergencies, Some(&DebugValue::Counter(2)));
    }
}

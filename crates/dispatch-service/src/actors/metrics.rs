//! Actor metrics and mailbox monitoring.
//!
//! Provides mailbox depth monitoring with per-actor thresholds:
//!
//! | Actor Type | Normal | Warning | Critical |
//! |------------|--------|---------|----------|
//! | Dispatcher | < 100  | 100-500 | > 500    |
//! | Connection | < 50   | 50-200  | > 200    |
//!
//! In-process counters live here; Prometheus emission is in
//! [`crate::observability::metrics`].

use crate::observability::metrics as prom;

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Mailbox depth thresholds for the dispatcher actor.
pub const DISPATCHER_MAILBOX_NORMAL: usize = 100;
pub const DISPATCHER_MAILBOX_WARNING: usize = 500;

/// Mailbox depth thresholds for connection actors.
pub const CONNECTION_MAILBOX_NORMAL: usize = 50;
pub const CONNECTION_MAILBOX_WARNING: usize = 200;

/// Actor type for metrics labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorType {
    /// DispatcherActor (singleton).
    Dispatcher,
    /// ConnectionActor (one per socket).
    Connection,
}

impl ActorType {
    /// Returns the actor type as a string for metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ActorType::Dispatcher => "dispatcher",
            ActorType::Connection => "connection",
        }
    }

    /// Returns the warning threshold for this actor type.
    #[must_use]
    pub const fn warning_threshold(&self) -> usize {
        match self {
            ActorType::Dispatcher => DISPATCHER_MAILBOX_WARNING,
            ActorType::Connection => CONNECTION_MAILBOX_WARNING,
        }
    }

    /// Returns the normal threshold for this actor type.
    #[must_use]
    pub const fn normal_threshold(&self) -> usize {
        match self {
            ActorType::Dispatcher => DISPATCHER_MAILBOX_NORMAL,
            ActorType::Connection => CONNECTION_MAILBOX_NORMAL,
        }
    }
}

/// Mailbox depth level for alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxLevel {
    /// Below normal threshold.
    Normal,
    /// Between normal and warning thresholds.
    Warning,
    /// Above warning threshold.
    Critical,
}

/// Mailbox monitor for tracking queue depth.
#[derive(Debug)]
pub struct MailboxMonitor {
    /// Actor type for labeling.
    actor_type: ActorType,
    /// Actor identifier (instance id, connection handle).
    actor_id: String,
    /// Current mailbox depth.
    depth: AtomicUsize,
    /// Peak mailbox depth since last reset.
    peak_depth: AtomicUsize,
    /// Total messages processed.
    messages_processed: AtomicU64,
}

impl MailboxMonitor {
    /// Create a new mailbox monitor for the given actor.
    #[must_use]
    pub fn new(actor_type: ActorType, actor_id: impl Into<String>) -> Self {
        Self {
            actor_type,
            actor_id: actor_id.into(),
            depth: AtomicUsize::new(0),
            peak_depth: AtomicUsize::new(0),
            messages_processed: AtomicU64::new(0),
        }
    }

    /// Record the backlog observed when a message is taken off the channel.
    ///
    /// `depth` is the number of messages still queued behind the one being
    /// handled, as reported by the receiver.
    pub fn record_depth(&self, depth: usize) {
        let previous = self.depth.swap(depth, Ordering::Relaxed);
        self.peak_depth.fetch_max(depth, Ordering::Relaxed);

        let level = self.level_for_depth(depth);
        if level != self.level_for_depth(previous) {
            match level {
                MailboxLevel::Critical => warn!(
                    target: "ds.actor.mailbox",
                    actor_type = self.actor_type.as_str(),
                    actor_id = %self.actor_id,
                    depth = depth,
                    threshold = self.actor_type.warning_threshold(),
                    "Mailbox depth critical"
                ),
                MailboxLevel::Warning => debug!(
                    target: "ds.actor.mailbox",
                    actor_type = self.actor_type.as_str(),
                    actor_id = %self.actor_id,
                    depth = depth,
                    "Mailbox depth elevated"
                ),
                MailboxLevel::Normal => debug!(
                    target: "ds.actor.mailbox",
                    actor_type = self.actor_type.as_str(),
                    actor_id = %self.actor_id,
                    depth = depth,
                    "Mailbox depth back to normal"
                ),
            }
        }

        prom::set_actor_mailbox_depth(self.actor_type.as_str(), depth);
    }

    /// Record a message having been processed.
    pub fn record_processed(&self) {
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current mailbox depth.
    #[must_use]
    pub fn current_depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    /// Get the peak mailbox depth.
    #[must_use]
    pub fn peak_depth(&self) -> usize {
        self.peak_depth.load(Ordering::Relaxed)
    }

    /// Get total messages processed.
    #[must_use]
    pub fn messages_processed(&self) -> u64 {
        self.messages_processed.load(Ordering::Relaxed)
    }

    /// Get the current mailbox level.
    #[must_use]
    pub fn current_level(&self) -> MailboxLevel {
        self.level_for_depth(self.current_depth())
    }

    /// Reset peak depth counter.
    pub fn reset_peak(&self) {
        self.peak_depth
            .store(self.current_depth(), Ordering::Relaxed);
    }

    fn level_for_depth(&self, depth: usize) -> MailboxLevel {
        if depth > self.actor_type.warning_threshold() {
            MailboxLevel::Critical
        } else if depth > self.actor_type.normal_threshold() {
            MailboxLevel::Warning
        } else {
            MailboxLevel::Normal
        }
    }
}

/// Aggregated metrics for the actor system.
///
/// Shared between the dispatcher, connection handles and the health task.
#[derive(Debug, Default)]
pub struct ActorMetrics {
    /// Connections currently attached to the dispatcher.
    pub active_connections: AtomicUsize,
    /// Registered sessions (subset of attached connections).
    pub active_sessions: AtomicUsize,
    /// Total actor panics (indicates bugs).
    pub actor_panics: AtomicU64,
    /// Total messages processed across all actors.
    pub total_messages_processed: AtomicU64,
    /// Outbound events dropped because a recipient mailbox was full.
    pub messages_dropped: AtomicU64,
}

impl ActorMetrics {
    /// Create a new shared metrics instance.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Increment attached connection count.
    pub fn connection_attached(&self) {
        let count = self.active_connections.fetch_add(1, Ordering::Relaxed) + 1;
        prom::set_connections_active(count as u64);
    }

    /// Decrement attached connection count.
    pub fn connection_detached(&self) {
        let count = self
            .active_connections
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |c| {
                Some(c.saturating_sub(1))
            })
            .map_or(0, |previous| previous.saturating_sub(1));
        prom::set_connections_active(count as u64);
    }

    /// Overwrite the registered session count.
    pub fn set_sessions(&self, count: usize) {
        self.active_sessions.store(count, Ordering::Relaxed);
    }

    /// Record an actor panic.
    pub fn record_panic(&self, actor_type: ActorType) {
        self.actor_panics.fetch_add(1, Ordering::Relaxed);
        prom::record_actor_panic(actor_type.as_str());
        tracing::error!(
            target: "ds.actor.panic",
            actor_type = actor_type.as_str(),
            total_panics = self.actor_panics.load(Ordering::Relaxed),
            "Actor panic detected - indicates bug, investigation required"
        );
    }

    /// Record an outbound event dropped due to backpressure.
    pub fn record_drop(&self, actor_type: ActorType) {
        let dropped = self.messages_dropped.fetch_add(1, Ordering::Relaxed) + 1;
        prom::record_message_dropped(actor_type.as_str());
        warn!(
            target: "ds.actor.mailbox",
            actor_type = actor_type.as_str(),
            dropped = dropped,
            "Message dropped due to backpressure"
        );
    }

    /// Record a message being processed.
    pub fn record_message_processed(&self) {
        self.total_messages_processed
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Get current connection count.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Get current session count.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.active_sessions.load(Ordering::Relaxed)
    }

    /// Get total dropped outbound events.
    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.messages_dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_actor_type_as_str() {
        assert_eq!(ActorType::Dispatcher.as_str(), "dispatcher");
        assert_eq!(ActorType::Connection.as_str(), "connection");
    }

    #[test]
    fn test_actor_type_thresholds() {
        assert_eq!(ActorType::Dispatcher.normal_threshold(), 100);
        assert_eq!(ActorType::Dispatcher.warning_threshold(), 500);
        assert_eq!(ActorType::Connection.normal_threshold(), 50);
        assert_eq!(ActorType::Connection.warning_threshold(), 200);
    }

    #[test]
    fn test_mailbox_monitor_tracks_backlog() {
        let monitor = MailboxMonitor::new(ActorType::Dispatcher, "ds-test");

        assert_eq!(monitor.current_depth(), 0);

        monitor.record_depth(3);
        monitor.record_processed();
        assert_eq!(monitor.current_depth(), 3);
        assert_eq!(monitor.peak_depth(), 3);

        monitor.record_depth(2);
        monitor.record_processed();
        assert_eq!(monitor.current_depth(), 2);
        assert_eq!(monitor.peak_depth(), 3);
        assert_eq!(monitor.messages_processed(), 2);
    }

    #[test]
    fn test_mailbox_monitor_levels() {
        let monitor = MailboxMonitor::new(ActorType::Connection, "conn-1");
        assert_eq!(monitor.current_level(), MailboxLevel::Normal);

        monitor.record_depth(75);
        assert_eq!(monitor.current_level(), MailboxLevel::Warning);

        monitor.record_depth(225);
        assert_eq!(monitor.current_level(), MailboxLevel::Critical);

        monitor.record_depth(0);
        assert_eq!(monitor.current_level(), MailboxLevel::Normal);
        assert_eq!(monitor.peak_depth(), 225);
    }

    #[test]
    fn test_dispatcher_backlog_above_warning_is_critical() {
        let monitor = MailboxMonitor::new(ActorType::Dispatcher, "ds-test");

        monitor.record_depth(600);
        assert_eq!(monitor.current_level(), MailboxLevel::Critical);
        assert_eq!(monitor.peak_depth(), 600);
    }

    #[test]
    fn test_mailbox_monitor_reset_peak() {
        let monitor = MailboxMonitor::new(ActorType::Dispatcher, "ds-test");

        monitor.record_depth(10);
        monitor.record_depth(5);
        assert_eq!(monitor.peak_depth(), 10);

        monitor.reset_peak();
        assert_eq!(monitor.peak_depth(), 5);
    }

    #[test]
    fn test_actor_metrics_connections_and_sessions() {
        let metrics = ActorMetrics::new();

        metrics.connection_attached();
        metrics.connection_attached();
        assert_eq!(metrics.connection_count(), 2);

        metrics.connection_detached();
        assert_eq!(metrics.connection_count(), 1);

        metrics.set_sessions(7);
        assert_eq!(metrics.session_count(), 7);
    }

    #[test]
    fn test_connection_detached_never_underflows() {
        let metrics = ActorMetrics::new();

        metrics.connection_detached();
        assert_eq!(metrics.connection_count(), 0);

        metrics.connection_attached();
        metrics.connection_detached();
        metrics.connection_detached();
        assert_eq!(metrics.connection_count(), 0);
    }

    #[test]
    fn test_actor_metrics_drops_and_panics() {
        let metrics = ActorMetrics::new();

        metrics.record_drop(ActorType::Connection);
        metrics.record_drop(ActorType::Connection);
        assert_eq!(metrics.dropped_count(), 2);

        metrics.record_panic(ActorType::Dispatcher);
        assert_eq!(metrics.actor_panics.load(Ordering::Relaxed), 1);
    }
}

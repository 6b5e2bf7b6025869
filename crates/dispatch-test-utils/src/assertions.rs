//! Custom test assertions for expressive tests
//!
//! Provides trait-based assertions for outbound server events.

use dispatch_service::protocol::ServerEvent;
use dispatch_service::state::Role;

use common::types::ConnectionHandle;

/// Assertions on a received event.
///
/// # Example
/// ```rust,ignore
/// officer
///     .next_event()
///     .await
///     .assert_emergency_alert("KA-01");
/// ```
pub trait ServerEventAssertions {
    /// Assert the event name (`policeLocation`, `error`, ...).
    fn assert_named(&self, name: &str) -> &Self;

    /// Assert an `emergencyAlert` for the given plate.
    fn assert_emergency_alert(&self, identity: &str) -> &Self;

    /// Assert a `policeLocation` at the given position.
    fn assert_police_location(&self, lat: f64, lon: f64) -> &Self;

    /// Assert a `trafficStatusUpdate` carrying `status`.
    fn assert_status_update(&self, status: &str) -> &Self;

    /// Assert a `liveLocationUpdate` from `handle`.
    fn assert_location_from(&self, handle: ConnectionHandle, role: Role) -> &Self;

    /// Assert an `error` event with the given code.
    fn assert_error_code(&self, code: i32) -> &Self;
}

impl ServerEventAssertions for ServerEvent {
    fn assert_named(&self, name: &str) -> &Self {
        assert_eq!(self.name(), name, "unexpected event {self:?}");
        self
    }

    fn assert_emergency_alert(&self, identity: &str) -> &Self {
        match self {
            ServerEvent::EmergencyAlert { identity: got, .. } => {
                assert_eq!(got, identity, "alert for wrong vehicle");
            }
            other => panic!("expected emergencyAlert, got {other:?}"),
        }
        self
    }

    fn assert_police_location(&self, lat: f64, lon: f64) -> &Self {
        match self {
            ServerEvent::PoliceLocation { lat: got_lat, lon: got_lon } => {
                assert!(
                    (got_lat - lat).abs() < f64::EPSILON && (got_lon - lon).abs() < f64::EPSILON,
                    "expected officer at ({lat}, {lon}), got ({got_lat}, {got_lon})"
                );
            }
            other => panic!("expected policeLocation, got {other:?}"),
        }
        self
    }

    fn assert_status_update(&self, status: &str) -> &Self {
        match self {
            ServerEvent::TrafficStatusUpdate { status: got } => {
                assert_eq!(got, status, "unexpected status text");
            }
            other => panic!("expected trafficStatusUpdate, got {other:?}"),
        }
        self
    }

    fn assert_location_from(&self, handle: ConnectionHandle, role: Role) -> &Self {
        match self {
            ServerEvent::LiveLocationUpdate {
                handle: got_handle,
                role: got_role,
                ..
            } => {
                assert_eq!(*got_handle, handle, "location update from wrong peer");
                assert_eq!(*got_role, role, "location update with wrong role");
            }
            other => panic!("expected liveLocationUpdate, got {other:?}"),
        }
        self
    }

    fn assert_error_code(&self, code: i32) -> &Self {
        match self {
            ServerEvent::Error { code: got, .. } => {
                assert_eq!(*got, code, "unexpected error code");
            }
            other => panic!("expected error, got {other:?}"),
        }
        self
    }
}

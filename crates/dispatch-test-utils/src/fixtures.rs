//! Pre-configured test data fixtures.
//!
//! Builders for registration payloads and the events operators and officers
//! send.

use dispatch_service::protocol::{ClientEvent, EmergencyReport, NotificationRequest, StatusReport};
use dispatch_service::state::{Role, RoleDeclaration};

use common::types::Coordinates;

/// Test emergency vehicle operator.
#[derive(Debug, Clone)]
pub struct TestOperator {
    /// Vehicle plate.
    pub plate: String,
    /// Position declared at registration.
    pub position: Option<Coordinates>,
}

impl TestOperator {
    #[must_use]
    pub fn new(plate: impl Into<String>) -> Self {
        Self {
            plate: plate.into(),
            position: None,
        }
    }

    /// Declare a position at registration.
    #[must_use]
    pub fn at(mut self, lat: f64, lon: f64) -> Self {
        self.position = Some(Coordinates { lat, lon });
        self
    }

    /// `emergency` event for this operator's plate.
    #[must_use]
    pub fn emergency_at(&self, lat: f64, lon: f64) -> ClientEvent {
        ClientEvent::Emergency(EmergencyReport {
            identity: self.plate.clone(),
            location: Coordinates { lat, lon },
        })
    }

    /// `sendNotification` event addressed to this operator.
    #[must_use]
    pub fn notification(&self, message: impl Into<String>) -> ClientEvent {
        ClientEvent::SendNotification(NotificationRequest {
            identity: self.plate.clone(),
            message: message.into(),
        })
    }

    /// `trafficStatus` event addressed to this operator explicitly.
    #[must_use]
    pub fn status_for(&self, status: impl Into<String>) -> ClientEvent {
        ClientEvent::TrafficStatus(StatusReport {
            status: status.into(),
            target_identity: Some(self.plate.clone()),
        })
    }
}

impl From<TestOperator> for RoleDeclaration {
    fn from(operator: TestOperator) -> Self {
        RoleDeclaration {
            role: Role::Operator,
            identity: Some(operator.plate),
            position: operator.position,
        }
    }
}

/// Test traffic officer.
#[derive(Debug, Clone, Default)]
pub struct TestOfficer {
    /// Optional display name.
    pub name: Option<String>,
    /// Position declared at registration; officers without one are never
    /// selected for an emergency.
    pub position: Option<Coordinates>,
}

impl TestOfficer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn at(mut self, lat: f64, lon: f64) -> Self {
        self.position = Some(Coordinates { lat, lon });
        self
    }
}

impl From<TestOfficer> for RoleDeclaration {
    fn from(officer: TestOfficer) -> Self {
        RoleDeclaration {
            role: Role::Officer,
            identity: officer.name,
            position: officer.position,
        }
    }
}

/// `trafficStatus` event routed through the pairing table.
#[must_use]
pub fn status(status: impl Into<String>) -> ClientEvent {
    ClientEvent::TrafficStatus(StatusReport {
        status: status.into(),
        target_identity: None,
    })
}

/// `updateLocation` event.
#[must_use]
pub fn location(lat: f64, lon: f64) -> ClientEvent {
    ClientEvent::UpdateLocation(Coordinates { lat, lon })
}

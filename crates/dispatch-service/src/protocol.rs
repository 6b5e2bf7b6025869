//! Wire protocol for the signaling socket.
//!
//! Every frame is a JSON text message, adjacently tagged:
//!
//! ```text
//! {"event": "updateLocation", "data": {"lat": 12.97, "lon": 77.59}}
//! {"event": "noPoliceAvailable"}
//! ```
//!
//! The event set is fixed; unknown event names are rejected input.

use crate::errors::DispatchError;
use crate::state::{Role, RoleDeclaration};

use common::types::{ConnectionHandle, Coordinates};
use serde::{Deserialize, Serialize};

/// Maximum accepted inbound frame size in bytes.
pub const MAX_FRAME_BYTES: usize = 16 * 1024;

/// Payload of the inbound `emergency` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyReport {
    /// Plate of the reporting vehicle.
    #[serde(default)]
    pub identity: String,
    /// Where the emergency vehicle is.
    pub location: Coordinates,
}

/// Payload of the inbound `trafficStatus` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    /// Free-form status text ("Clear", "Blocked", ...).
    pub status: String,
    /// Operator to address explicitly, bypassing the pairing table.
    #[serde(default)]
    pub target_identity: Option<String>,
}

/// Payload of the inbound `sendNotification` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRequest {
    /// Plate of the operator to notify.
    pub identity: String,
    /// Message body.
    pub message: String,
}

/// Events sent by clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    /// Declare role, identity and (for officers) position.
    RegisterRole(RoleDeclaration),
    /// Operator reports an emergency.
    Emergency(EmergencyReport),
    /// Officer reports traffic status back to an operator.
    TrafficStatus(StatusReport),
    /// Position update, broadcast to peers.
    UpdateLocation(Coordinates),
    /// Direct message to an operator by identity.
    SendNotification(NotificationRequest),
}

impl ClientEvent {
    /// Decode a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::RejectedInput`] for oversized frames, invalid
    /// JSON, unknown events or missing fields.
    pub fn parse(text: &str) -> Result<Self, DispatchError> {
        if text.len() > MAX_FRAME_BYTES {
            return Err(DispatchError::RejectedInput(format!(
                "frame exceeds {MAX_FRAME_BYTES} bytes"
            )));
        }

        serde_json::from_str(text)
            .map_err(|e| DispatchError::RejectedInput(format!("malformed event: {e}")))
    }

    /// Event name for logs and metric labels.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            ClientEvent::RegisterRole(_) => "registerRole",
            ClientEvent::Emergency(_) => "emergency",
            ClientEvent::TrafficStatus(_) => "trafficStatus",
            ClientEvent::UpdateLocation(_) => "updateLocation",
            ClientEvent::SendNotification(_) => "sendNotification",
        }
    }
}

/// Events sent to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    /// Registration accepted.
    Registered {
        handle: ConnectionHandle,
        role: Role,
    },
    /// To the selected officer: an operator needs the way cleared.
    EmergencyAlert {
        identity: String,
        location: Coordinates,
    },
    /// To the reporting operator: where the selected officer is.
    PoliceLocation { lat: f64, lon: f64 },
    /// To the reporting operator: no eligible officer was found.
    NoPoliceAvailable,
    /// To an operator: status from the responding officer.
    TrafficStatusUpdate { status: String },
    /// To every other session: a peer moved.
    LiveLocationUpdate {
        handle: ConnectionHandle,
        lat: f64,
        lon: f64,
        role: Role,
    },
    /// To an operator: direct message.
    ReceiveNotification { message: String },
    /// To the caller: the event failed.
    Error { code: i32, message: String },
}

impl ServerEvent {
    /// Build the `error` event for a failed request.
    #[must_use]
    pub fn from_error(err: &DispatchError) -> Self {
        ServerEvent::Error {
            code: err.error_code(),
            message: err.client_message(),
        }
    }

    /// Event name for logs and metric labels.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            ServerEvent::Registered { .. } => "registered",
            ServerEvent::EmergencyAlert { .. } => "emergencyAlert",
            ServerEvent::PoliceLocation { .. } => "policeLocation",
            ServerEvent::NoPoliceAvailable => "noPoliceAvailable",
            ServerEvent::TrafficStatusUpdate { .. } => "trafficStatusUpdate",
            ServerEvent::LiveLocationUpdate { .. } => "liveLocationUpdate",
            ServerEvent::ReceiveNotification { .. } => "receiveNotification",
            ServerEvent::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_parse_register_role() {
        let event = ClientEvent::parse(
            r#"{"event":"registerRole","data":{"role":"operator","identity":"KA-01"}}"#,
        )
        .unwrap();

        assert_eq!(
            event,
            ClientEvent::RegisterRole(RoleDeclaration {
                role: Role::Operator,
                identity: Some("KA-01".to_string()),
                position: None,
            })
        );
    }

    #[test]
    fn test_parse_traffic_status_with_target() {
        let event = ClientEvent::parse(
            r#"{"event":"trafficStatus","data":{"status":"Clear","targetIdentity":"KA-01"}}"#,
        )
        .unwrap();

        assert_eq!(
            event,
            ClientEvent::TrafficStatus(StatusReport {
                status: "Clear".to_string(),
                target_identity: Some("KA-01".to_string()),
            })
        );
        assert_eq!(event.name(), "trafficStatus");
    }

    #[test]
    fn test_parse_update_location() {
        let event =
            ClientEvent::parse(r#"{"event":"updateLocation","data":{"lat":1.0,"lon":2.0}}"#)
                .unwrap();
        assert_eq!(
            event,
            ClientEvent::UpdateLocation(Coordinates { lat: 1.0, lon: 2.0 })
        );
    }

    #[test]
    fn test_parse_rejects_malformed_frames() {
        for frame in [
            "not json",
            r#"{"event":"teleport","data":{}}"#,
            r#"{"event":"emergency","data":{"identity":"KA-01"}}"#,
            r#"{"event":"updateLocation","data":{"lat":"north","lon":2.0}}"#,
        ] {
            let result = ClientEvent::parse(frame);
            assert!(
                matches!(result, Err(DispatchError::RejectedInput(_))),
                "frame should be rejected: {frame}"
            );
        }
    }

    #[test]
    fn test_parse_rejects_oversized_frame() {
        let frame = format!(
            r#"{{"event":"sendNotification","data":{{"identity":"A","message":"{}"}}}}"#,
            "x".repeat(MAX_FRAME_BYTES)
        );
        assert!(matches!(
            ClientEvent::parse(&frame),
            Err(DispatchError::RejectedInput(_))
        ));
    }

    #[test]
    fn test_server_event_wire_shape() {
        let handle = ConnectionHandle::new();
        let event = ServerEvent::LiveLocationUpdate {
            handle,
            lat: 1.0,
            lon: 2.0,
            role: Role::Officer,
        };

        let value: Value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({
                "event": "liveLocationUpdate",
                "data": {
                    "handle": handle.0.to_string(),
                    "lat": 1.0,
                    "lon": 2.0,
                    "role": "officer",
                }
            })
        );
    }

    #[test]
    fn test_unit_server_event_has_no_payload() {
        let value: Value = serde_json::to_value(&ServerEvent::NoPoliceAvailable).unwrap();
        assert_eq!(value.get("event"), Some(&json!("noPoliceAvailable")));
        assert!(value.get("data").is_none());
    }

    #[test]
    fn test_error_event_uses_client_message() {
        let event = ServerEvent::from_error(&DispatchError::Internal("secret detail".to_string()));
        assert_eq!(
            event,
            ServerEvent::Error {
                code: 6,
                message: "An internal error occurred".to_string(),
            }
        );
    }
}

//! Dispatch Service error types.
//!
//! Error types map to the `code` field of the outbound `error` event.
//! Internal details are logged server-side but not exposed to clients.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::error::CoordinateError;
use serde::Serialize;
use thiserror::Error;

/// Dispatch Service error type.
///
/// Maps to client-facing error codes:
/// - `RejectedInput`: `REJECTED_INPUT` (1)
/// - `NotRegistered`: `NOT_REGISTERED` (2)
/// - `NoResponderAvailable`: `NO_RESPONDER` (3)
/// - `UnknownTarget`: `UNKNOWN_TARGET` (4)
/// - `CapacityExceeded`, `Draining`: `UNAVAILABLE` (5)
/// - `Internal`: `INTERNAL_ERROR` (6)
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Malformed or missing required fields. The event is dropped
    /// without mutating any state.
    #[error("Rejected input: {0}")]
    RejectedInput(String),

    /// The connection has not completed `registerRole` (or registered
    /// with a role that cannot perform the operation).
    #[error("Connection not registered: {0}")]
    NotRegistered(String),

    /// Emergency dispatch found no eligible officer.
    #[error("No responder available")]
    NoResponderAvailable,

    /// A status update or notification could not be resolved to a
    /// connected operator. Stale pairing/index entries surface here too.
    #[error("Unknown target")]
    UnknownTarget,

    /// The service has reached its connection limit.
    #[error("Service at capacity")]
    CapacityExceeded,

    /// The service is shutting down.
    #[error("Service is draining")]
    Draining,

    /// Internal error (actor channel failures and similar).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DispatchError {
    /// Returns the numeric error code carried by the outbound `error` event.
    #[must_use]
    pub fn error_code(&self) -> i32 {
        match self {
            DispatchError::RejectedInput(_) => 1,
            DispatchError::NotRegistered(_) => 2,
            DispatchError::NoResponderAvailable => 3,
            DispatchError::UnknownTarget => 4,
            DispatchError::CapacityExceeded | DispatchError::Draining => 5,
            DispatchError::Internal(_) => 6,
        }
    }

    /// Returns a client-safe error message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            DispatchError::RejectedInput(msg) => msg.clone(),
            DispatchError::NotRegistered(_) => "Register a role before sending this event".to_string(),
            DispatchError::NoResponderAvailable => "No officer is available".to_string(),
            DispatchError::UnknownTarget => "Target is not connected".to_string(),
            DispatchError::CapacityExceeded => {
                "Server is at capacity, please try again".to_string()
            }
            DispatchError::Draining => "Server is shutting down, please reconnect".to_string(),
            DispatchError::Internal(_) => "An internal error occurred".to_string(),
        }
    }

    /// Short, bounded label for metrics.
    #[must_use]
    pub const fn as_label(&self) -> &'static str {
        match self {
            DispatchError::RejectedInput(_) => "rejected_input",
            DispatchError::NotRegistered(_) => "not_registered",
            DispatchError::NoResponderAvailable => "no_responder",
            DispatchError::UnknownTarget => "unknown_target",
            DispatchError::CapacityExceeded => "capacity_exceeded",
            DispatchError::Draining => "draining",
            DispatchError::Internal(_) => "internal",
        }
    }
}

impl From<CoordinateError> for DispatchError {
    fn from(err: CoordinateError) -> Self {
        DispatchError::RejectedInput(err.to_string())
    }
}

/// User store error type.
///
/// Returned by the user registration and login endpoints.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UserStoreError {
    /// No user matches the credentials.
    #[error("User not found")]
    NotFound,

    /// A user with the same name and phone already exists.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The profile failed validation.
    #[error("Invalid profile: {0}")]
    Invalid(String),
}

impl UserStoreError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            UserStoreError::NotFound => 404,
            UserStoreError::Conflict(_) => 409,
            UserStoreError::Invalid(_) => 400,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for UserStoreError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            UserStoreError::NotFound => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                "No user matches these credentials".to_string(),
            ),
            UserStoreError::Conflict(reason) => (StatusCode::CONFLICT, "CONFLICT", reason.clone()),
            UserStoreError::Invalid(reason) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", reason.clone())
            }
        };

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        (status, Json(error_response)).into_response()
    }
}

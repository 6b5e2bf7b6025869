//! `RoleAssignment` - validation of `registerRole` declarations.
//!
//! A declaration either becomes a complete `Session` or is rejected with
//! nothing written; there is no half-registered state.

use super::registry::{Role, Session};
use crate::errors::DispatchError;

use common::types::{ConnectionHandle, Coordinates};
use serde::{Deserialize, Serialize};

/// Maximum accepted length of an identity or display name, in characters.
pub const MAX_IDENTITY_LENGTH: usize = 64;

/// Payload of the inbound `registerRole` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleDeclaration {
    /// Declared role.
    pub role: Role,
    /// Vehicle plate (operators, required) or display name (officers, optional).
    #[serde(default)]
    pub identity: Option<String>,
    /// Current position (officers need one to be dispatchable).
    #[serde(default)]
    pub position: Option<Coordinates>,
}

impl RoleDeclaration {
    /// Validate the declaration and build the session it describes.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::RejectedInput`] if an operator omits its
    /// identity, an identity is too long, or the position is out of range.
    pub fn into_session(
        self,
        handle: ConnectionHandle,
        registered_at: i64,
    ) -> Result<Session, DispatchError> {
        let identity = self
            .identity
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .to_string();

        if identity.chars().count() > MAX_IDENTITY_LENGTH {
            return Err(DispatchError::RejectedInput(format!(
                "identity must be at most {MAX_IDENTITY_LENGTH} characters"
            )));
        }

        if self.role == Role::Operator && identity.is_empty() {
            return Err(DispatchError::RejectedInput(
                "operator identity is required".to_string(),
            ));
        }

        let position = self.position.map(Coordinates::validate).transpose()?;

        Ok(Session {
            handle,
            role: self.role,
            identity,
            position,
            registered_at,
        })
    }
}

//! `ConnectionRegistry` - source of truth for registered sessions.
//!
//! Maps a connection handle to its live `Session`. The registry is owned by
//! the `DispatcherActor`, so every mutation is applied between two mailbox
//! messages and readers never observe a half-applied change. [`all`] hands
//! out a point-in-time copy rather than a view into the map.
//!
//! [`all`]: ConnectionRegistry::all

use common::types::{ConnectionHandle, Coordinates};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Role a client declares at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Emergency vehicle operator, addressed by vehicle plate.
    #[serde(alias = "ambulance")]
    Operator,
    /// Traffic-control officer, addressed by position.
    #[serde(alias = "police")]
    Officer,
}

impl Role {
    /// Returns the role as a string for metric labels and logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Role::Operator => "operator",
            Role::Officer => "officer",
        }
    }
}

/// One registered connection.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    /// Transport-assigned connection handle.
    pub handle: ConnectionHandle,
    /// Declared role.
    pub role: Role,
    /// Vehicle plate for operators; display name (possibly empty) for officers.
    pub identity: String,
    /// Last known position, if any.
    pub position: Option<Coordinates>,
    /// Registration timestamp (unix seconds).
    pub registered_at: i64,
}

impl Session {
    /// The identity this session claims in the `IdentityIndex`, if any.
    ///
    /// Only operators are indexed.
    #[must_use]
    pub fn operator_identity(&self) -> Option<&str> {
        match self.role {
            Role::Operator => Some(self.identity.as_str()),
            Role::Officer => None,
        }
    }

    /// Position of an officer eligible for dispatch.
    #[must_use]
    pub fn dispatchable_position(&self) -> Option<Coordinates> {
        match self.role {
            Role::Officer => self.position,
            Role::Operator => None,
        }
    }
}

/// Registry of sessions keyed by connection handle.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    sessions: HashMap<ConnectionHandle, Session>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the session for `session.handle`.
    ///
    /// Returns the previous record when this is a re-registration.
    pub fn upsert(&mut self, session: Session) -> Option<Session> {
        self.sessions.insert(session.handle, session)
    }

    /// Look up a session.
    #[must_use]
    pub fn get(&self, handle: &ConnectionHandle) -> Option<&Session> {
        self.sessions.get(handle)
    }

    /// Remove a session. This is the only way an entry leaves the registry.
    pub fn remove(&mut self, handle: &ConnectionHandle) -> Option<Session> {
        self.sessions.remove(handle)
    }

    /// Replace the stored position of a session.
    ///
    /// Returns the updated session, or `None` if the handle is unknown.
    pub fn update_position(
        &mut self,
        handle: &ConnectionHandle,
        position: Coordinates,
    ) -> Option<&Session> {
        let session = self.sessions.get_mut(handle)?;
        session.position = Some(position);
        Some(session)
    }

    /// Point-in-time copy of every session.
    #[must_use]
    pub fn all(&self) -> Vec<Session> {
        self.sessions.values().cloned().collect()
    }

    /// Iterate sessions in registry order (unspecified, not stable across runs).
    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    /// Whether `handle` is registered with `role`.
    #[must_use]
    pub fn has_role(&self, handle: &ConnectionHandle, role: Role) -> bool {
        self.sessions.get(handle).is_some_and(|s| s.role == role)
    }

    /// Number of sessions with the given role.
    #[must_use]
    pub fn count_by_role(&self, role: Role) -> usize {
        self.sessions.values().filter(|s| s.role == role).count()
    }

    /// Number of registered sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

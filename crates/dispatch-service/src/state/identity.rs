//! `IdentityIndex` - vehicle plate to current connection handle.
//!
//! Last registration wins: a later operator claiming an identity takes it
//! over, and the earlier connection stays connected but is no longer
//! addressable by identity. Release is conditional on the caller still
//! owning the mapping, so a stale handle's disconnect can never erase the
//! claim of the connection that superseded it.

use common::types::ConnectionHandle;
use std::collections::HashMap;

/// Secondary index over operator identities.
#[derive(Debug, Default)]
pub struct IdentityIndex {
    entries: HashMap<String, ConnectionHandle>,
}

impl IdentityIndex {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Point `identity` at `handle`.
    ///
    /// Returns the superseded handle if the identity previously mapped to a
    /// different connection.
    pub fn claim(&mut self, identity: &str, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        match self.entries.insert(identity.to_string(), handle) {
            Some(previous) if previous != handle => Some(previous),
            _ => None,
        }
    }

    /// Current handle for `identity`.
    #[must_use]
    pub fn resolve(&self, identity: &str) -> Option<ConnectionHandle> {
        self.entries.get(identity).copied()
    }

    /// Remove the mapping only if it still points at `handle`.
    ///
    /// Returns whether an entry was removed.
    pub fn release(&mut self, identity: &str, handle: ConnectionHandle) -> bool {
        if self.entries.get(identity) == Some(&handle) {
            self.entries.remove(identity);
            true
        } else {
            false
        }
    }

    /// Number of indexed identities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_and_resolve() {
        let mut index = IdentityIndex::new();
        let h1 = ConnectionHandle::new();

        assert!(index.claim("P1", h1).is_none());
        assert_eq!(index.resolve("P1"), Some(h1));
        assert!(index.resolve("P2").is_none());
    }

    #[test]
    fn test_later_claim_wins() {
        let mut index = IdentityIndex::new();
        let h1 = ConnectionHandle::new();
        let h2 = ConnectionHandle::new();

        index.claim("P1", h1);
        assert_eq!(index.claim("P1", h2), Some(h1));
        assert_eq!(index.resolve("P1"), Some(h2));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_reclaim_by_same_handle_reports_nothing_superseded() {
        let mut index = IdentityIndex::new();
        let h1 = ConnectionHandle::new();

        index.claim("P1", h1);
        assert!(index.claim("P1", h1).is_none());
    }

    #[test]
    fn test_release_by_stale_handle_keeps_superseding_claim() {
        let mut index = IdentityIndex::new();
        let h1 = ConnectionHandle::new();
        let h2 = ConnectionHandle::new();

        index.claim("P1", h1);
        index.claim("P1", h2);

        assert!(!index.release("P1", h1));
        assert_eq!(index.resolve("P1"), Some(h2));

        assert!(index.release("P1", h2));
        assert!(index.resolve("P1").is_none());
        assert!(index.is_empty());
    }
}

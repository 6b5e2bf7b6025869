//! `PairingTable` - active emergencies, operator to responding officer.
//!
//! Entries are keyed by operator handle. One officer can be the responder
//! for several operators at once; reverse lookup returns the oldest
//! outstanding pairing so consecutive status replies drain emergencies in
//! the order they were assigned.

use common::types::ConnectionHandle;
use std::collections::HashMap;

/// One active emergency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pairing {
    /// Officer currently responsible.
    pub officer: ConnectionHandle,
    /// Monotonic assignment order within this table.
    pub sequence: u64,
    /// Pairing timestamp (unix seconds).
    pub paired_at: i64,
}

/// Operator/officer correlation for active emergencies.
#[derive(Debug, Default)]
pub struct PairingTable {
    by_operator: HashMap<ConnectionHandle, Pairing>,
    next_sequence: u64,
}

impl PairingTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `officer` responds to the emergency of `operator`.
    ///
    /// A fresh emergency replaces any earlier pairing for the same operator;
    /// the replaced officer is returned.
    pub fn pair(
        &mut self,
        operator: ConnectionHandle,
        officer: ConnectionHandle,
        paired_at: i64,
    ) -> Option<ConnectionHandle> {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.by_operator
            .insert(
                operator,
                Pairing {
                    officer,
                    sequence,
                    paired_at,
                },
            )
            .map(|previous| previous.officer)
    }

    /// Officer responding to `operator`, if any.
    #[must_use]
    pub fn responder_for(&self, operator: &ConnectionHandle) -> Option<ConnectionHandle> {
        self.by_operator.get(operator).map(|p| p.officer)
    }

    /// Full pairing record for `operator`.
    #[must_use]
    pub fn get(&self, operator: &ConnectionHandle) -> Option<&Pairing> {
        self.by_operator.get(operator)
    }

    /// Oldest operator whose emergency `officer` is handling.
    #[must_use]
    pub fn operator_for(&self, officer: &ConnectionHandle) -> Option<ConnectionHandle> {
        self.by_operator
            .iter()
            .filter(|(_, pairing)| pairing.officer == *officer)
            .min_by_key(|(_, pairing)| pairing.sequence)
            .map(|(operator, _)| *operator)
    }

    /// Drop the pairing keyed by `operator`, returning its officer.
    pub fn clear(&mut self, operator: &ConnectionHandle) -> Option<ConnectionHandle> {
        self.by_operator.remove(operator).map(|p| p.officer)
    }

    /// Drop every pairing whose responder is `officer`.
    ///
    /// Returns the operators left without a responder.
    pub fn release_officer(&mut self, officer: &ConnectionHandle) -> Vec<ConnectionHandle> {
        let orphaned: Vec<ConnectionHandle> = self
            .by_operator
            .iter()
            .filter(|(_, pairing)| pairing.officer == *officer)
            .map(|(operator, _)| *operator)
            .collect();

        for operator in &orphaned {
            self.by_operator.remove(operator);
        }

        orphaned
    }

    /// Number of active pairings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_operator.len()
    }

    /// Whether no emergency is active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_operator.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_and_lookup_both_directions() {
        let mut table = PairingTable::new();
        let operator = ConnectionHandle::new();
        let officer = ConnectionHandle::new();

        assert!(table.pair(operator, officer, 100).is_none());

        assert_eq!(table.responder_for(&operator), Some(officer));
        assert_eq!(table.operator_for(&officer), Some(operator));
        assert_eq!(table.get(&operator).unwrap().paired_at, 100);
    }

    #[test]
    fn test_new_emergency_replaces_pairing() {
        let mut table = PairingTable::new();
        let operator = ConnectionHandle::new();
        let first = ConnectionHandle::new();
        let second = ConnectionHandle::new();

        table.pair(operator, first, 0);
        assert_eq!(table.pair(operator, second, 1), Some(first));

        assert_eq!(table.len(), 1);
        assert!(table.operator_for(&first).is_none());
        assert_eq!(table.operator_for(&second), Some(operator));
    }

    #[test]
    fn test_reverse_lookup_prefers_oldest_pairing() {
        let mut table = PairingTable::new();
        let officer = ConnectionHandle::new();
        let older = ConnectionHandle::new();
        let newer = ConnectionHandle::new();

        table.pair(older, officer, 0);
        table.pair(newer, officer, 0);

        assert_eq!(table.operator_for(&officer), Some(older));
        table.clear(&older);
        assert_eq!(table.operator_for(&officer), Some(newer));
    }

    #[test]
    fn test_release_officer_orphans_all_its_operators() {
        let mut table = PairingTable::new();
        let officer = ConnectionHandle::new();
        let other_officer = ConnectionHandle::new();
        let a = ConnectionHandle::new();
        let b = ConnectionHandle::new();
        let c = ConnectionHandle::new();

        table.pair(a, officer, 0);
        table.pair(b, officer, 0);
        table.pair(c, other_officer, 0);

        let mut orphaned = table.release_officer(&officer);
        orphaned.sort();
        let mut expected = vec![a, b];
        expected.sort();

        assert_eq!(orphaned, expected);
        assert!(table.responder_for(&a).is_none());
        assert!(table.responder_for(&b).is_none());
        assert_eq!(table.responder_for(&c), Some(other_officer));
    }

    #[test]
    fn test_clear_unknown_operator() {
        let mut table = PairingTable::new();
        assert!(table.clear(&ConnectionHandle::new()).is_none());
        assert!(table.is_empty());
    }
}

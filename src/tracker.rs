use std::collections::HashSet;

use crate::model::SlotKey;

/// Keys with a create or delete awaiting server confirmation.
///
/// Membership is the only admission control against two concurrent mutations on one key.
#[derive(Debug, Clone, Default)]
pub struct MutationTracker {
    pending: HashSet<SlotKey>,
}

impl MutationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the key was already pending.
    pub fn begin(&mut self, key: &SlotKey) -> bool {
        self.pending.insert(key.clone())
    }

    /// Returns false if the key was not pending.
    pub fn end(&mut self, key: &SlotKey) -> bool {
        self.pending.remove(key)
    }

    pub fn is_pending(&self, key: &SlotKey) -> bool {
        self.pending.contains(key)
    }

    pub fn has_any(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SlotKey> {
        self.pending.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn key(slot: &str) -> SlotKey {
        SlotKey::new("X", NaiveDate::from_ymd_opt(2024, 6, 10).unwrap(), slot)
    }

    #[test]
    fn begin_and_end_are_idempotent() {
        let mut t = MutationTracker::new();
        assert!(!t.has_any());
        assert!(t.begin(&key("a")));
        assert!(!t.begin(&key("a")));
        assert_eq!(t.len(), 1);
        assert!(t.is_pending(&key("a")));

        assert!(t.end(&key("a")));
        assert!(!t.end(&key("a")));
        assert!(t.is_empty());
    }

    #[test]
    fn keys_are_scoped_by_instrument_and_date() {
        let mut t = MutationTracker::new();
        let date = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        t.begin(&SlotKey::new("X", date, "a"));
        assert!(!t.is_pending(&SlotKey::new("Y", date, "a")));
        assert!(!t.is_pending(&SlotKey::new("X", date.succ_opt().unwrap(), "a")));
        assert!(t.has_any());
    }
}

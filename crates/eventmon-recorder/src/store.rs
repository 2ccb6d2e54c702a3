//! The in-memory event store: username to [`UserHistory`].

use std::collections::{BTreeMap, HashMap};

use crate::history::UserHistory;
use crate::record::IssuanceRecord;

/// What to do with a user whose history becomes empty after expiry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EmptyHistoryPolicy {
    /// Keep the user with an empty history. Snapshots keep listing them.
    #[default]
    Retain,
    /// Drop the user entirely.
    Remove,
}

/// Every user's issuance history.
///
/// Not synchronized: the recorder task is its only owner.
#[derive(Debug, Clone, Default)]
pub struct EventStore {
    users: HashMap<String, UserHistory>,
}

impl EventStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record to a user's history, creating the history if needed.
    pub fn append_record(&mut self, username: &str, record: IssuanceRecord) {
        if let Some(history) = self.users.get_mut(username) {
            history.append(record);
        } else {
            let mut history = UserHistory::new();
            history.append(record);
            self.users.insert(username.to_owned(), history);
        }
    }

    /// Insert (or replace) a whole user history.
    pub fn insert_history(&mut self, username: impl Into<String>, history: UserHistory) {
        self.users.insert(username.into(), history);
    }

    /// Expire records created before `cutoff`, retaining emptied users.
    ///
    /// Returns whether any record was removed.
    pub fn expire_older_than(&mut self, cutoff: u64) -> bool {
        self.expire_older_than_with(cutoff, EmptyHistoryPolicy::Retain)
    }

    /// Expire records created before `cutoff`.
    ///
    /// Returns whether the store changed: a record was removed, or an empty
    /// user was dropped under [`EmptyHistoryPolicy::Remove`]. A second call
    /// with the same cutoff finds nothing left to do and returns `false`.
    pub fn expire_older_than_with(&mut self, cutoff: u64, policy: EmptyHistoryPolicy) -> bool {
        let mut removed: usize = 0;
        for history in self.users.values_mut() {
            removed = removed.saturating_add(history.expire_older_than(cutoff));
        }
        let users_before = self.users.len();
        if policy == EmptyHistoryPolicy::Remove {
            self.users.retain(|_, history| !history.is_empty());
        }
        removed > 0 || self.users.len() < users_before
    }

    /// A user's history.
    #[must_use]
    pub fn history(&self, username: &str) -> Option<&UserHistory> {
        self.users.get(username)
    }

    /// Iterate over `(username, history)` pairs in arbitrary order.
    pub fn users(&self) -> impl Iterator<Item = (&str, &UserHistory)> {
        self.users.iter().map(|(name, history)| (name.as_str(), history))
    }

    /// Number of users (including users with empty histories).
    #[must_use]
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Whether no user is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Total number of records across all users.
    #[must_use]
    pub fn total_records(&self) -> usize {
        self.users.values().map(UserHistory::len).sum()
    }

    /// Flatten into per-user record lists, newest first.
    #[must_use]
    pub fn records_newest_first(&self) -> BTreeMap<String, Vec<IssuanceRecord>> {
        self.users
            .iter()
            .map(|(name, history)| {
                (
                    name.clone(),
                    history.iter_newest_first().copied().collect(),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::CredentialKind;

    fn ssh(t: u64) -> IssuanceRecord {
        IssuanceRecord::new(t, 600, CredentialKind::Ssh)
    }

    #[test]
    fn test_append_creates_user() {
        let mut store = EventStore::new();
        assert!(store.history("alice").is_none());
        store.append_record("alice", ssh(1));
        store.append_record("alice", ssh(2));
        store.append_record("bob", ssh(3));

        assert_eq!(store.len(), 2);
        assert_eq!(store.total_records(), 3);
        assert_eq!(store.history("alice").unwrap().len(), 2);
    }

    #[test]
    fn test_expire_reports_change() {
        let mut store = EventStore::new();
        store.append_record("alice", ssh(1));
        store.append_record("alice", ssh(50));
        store.append_record("bob", ssh(60));

        assert!(store.expire_older_than(10));
        assert!(!store.expire_older_than(10));
        assert_eq!(store.total_records(), 2);
    }

    #[test]
    fn test_expire_retains_emptied_users_by_default() {
        let mut store = EventStore::new();
        store.append_record("alice", ssh(1));
        assert!(store.expire_older_than(10));
        let history = store.history("alice").unwrap();
        assert!(history.is_empty());
        assert_eq!(store.records_newest_first()["alice"], Vec::new());
    }

    #[test]
    fn test_expire_remove_policy_drops_emptied_users() {
        let mut store = EventStore::new();
        store.append_record("alice", ssh(1));
        store.append_record("bob", ssh(20));
        assert!(store.expire_older_than_with(10, EmptyHistoryPolicy::Remove));
        assert!(store.history("alice").is_none());
        assert!(store.history("bob").is_some());
        assert!(!store.expire_older_than_with(10, EmptyHistoryPolicy::Remove));
    }

    #[test]
    fn test_remove_policy_drops_users_emptied_earlier() {
        let mut store = EventStore::new();
        store.insert_history("ghost", UserHistory::new());
        assert!(store.expire_older_than_with(10, EmptyHistoryPolicy::Remove));
        assert!(store.is_empty());
        assert!(!store.expire_older_than_with(10, EmptyHistoryPolicy::Remove));
    }

    #[test]
    fn test_records_newest_first() {
        let mut store = EventStore::new();
        for t in [1, 2, 3] {
            store.append_record("alice", ssh(t));
        }
        let flat = store.records_newest_first();
        let times: Vec<u64> = flat["alice"].iter().map(|r| r.create_time).collect();
        assert_eq!(times, vec![3, 2, 1]);
    }
}

//! Immutable snapshots of the event store and their cache.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::record::IssuanceRecord;
use crate::store::EventStore;

/// Point-in-time view of every user's history, newest record first.
///
/// Built wholesale from the store and never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Wall-clock time spent building this snapshot.
    pub build_duration: Duration,
    /// When the snapshot was built, seconds since the Unix epoch.
    pub built_at: u64,
    /// Per-user records, newest first.
    pub users: BTreeMap<String, Vec<IssuanceRecord>>,
}

impl Snapshot {
    /// Project the store into a snapshot.
    #[must_use]
    pub fn build(store: &EventStore, now: u64) -> Self {
        let started = Instant::now();
        let users = store.records_newest_first();
        Self {
            build_duration: started.elapsed(),
            built_at: now,
            users,
        }
    }

    /// A user's records, newest first.
    #[must_use]
    pub fn user(&self, username: &str) -> Option<&[IssuanceRecord]> {
        self.users.get(username).map(Vec::as_slice)
    }

    /// Known usernames in sorted order.
    pub fn usernames(&self) -> impl Iterator<Item = &str> {
        self.users.keys().map(String::as_str)
    }

    /// Total number of records across all users.
    #[must_use]
    pub fn total_records(&self) -> usize {
        self.users.values().map(Vec::len).sum()
    }

    /// Whether the snapshot contains no users.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

/// Memoized snapshot, rebuilt at most once per store mutation.
#[derive(Debug, Default)]
pub struct SnapshotCache {
    cached: Option<Arc<Snapshot>>,
    rebuilds: u64,
}

impl SnapshotCache {
    /// Create an empty (invalidated) cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached snapshot, rebuilding it from `store` if invalidated.
    pub fn get(&mut self, store: &EventStore, now: u64) -> Arc<Snapshot> {
        if let Some(snapshot) = &self.cached {
            return Arc::clone(snapshot);
        }
        let snapshot = Arc::new(Snapshot::build(store, now));
        self.rebuilds = self.rebuilds.saturating_add(1);
        debug!(
            users = snapshot.users.len(),
            records = snapshot.total_records(),
            build_us = snapshot.build_duration.as_micros(),
            "Rebuilt history snapshot"
        );
        self.cached = Some(Arc::clone(&snapshot));
        snapshot
    }

    /// Drop the cached snapshot. Must follow every store mutation.
    pub fn invalidate(&mut self) {
        self.cached = None;
    }

    /// Whether a snapshot is currently cached.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.cached.is_some()
    }

    /// How many times the snapshot has been rebuilt.
    #[must_use]
    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::CredentialKind;

    fn store_with(records: &[(&str, u64)]) -> EventStore {
        let mut store = EventStore::new();
        for (user, t) in records {
            store.append_record(user, IssuanceRecord::new(*t, 60, CredentialKind::X509));
        }
        store
    }

    #[test]
    fn test_snapshot_orders_newest_first() {
        let store = store_with(&[("alice", 1), ("bob", 2), ("alice", 3)]);
        let snapshot = Snapshot::build(&store, 99);
        let alice: Vec<u64> = snapshot
            .user("alice")
            .unwrap()
            .iter()
            .map(|r| r.create_time)
            .collect();
        assert_eq!(alice, vec![3, 1]);
        assert_eq!(snapshot.usernames().collect::<Vec<_>>(), vec!["alice", "bob"]);
        assert_eq!(snapshot.total_records(), 3);
        assert_eq!(snapshot.built_at, 99);
    }

    #[test]
    fn test_cache_reuses_snapshot_until_invalidated() {
        let mut store = store_with(&[("alice", 1)]);
        let mut cache = SnapshotCache::new();

        let first = cache.get(&store, 0);
        let second = cache.get(&store, 0);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.rebuild_count(), 1);

        store.append_record("alice", IssuanceRecord::new(2, 60, CredentialKind::Ssh));
        cache.invalidate();
        assert!(!cache.is_valid());

        let third = cache.get(&store, 0);
        let fourth = cache.get(&store, 0);
        assert!(!Arc::ptr_eq(&first, &third));
        assert!(Arc::ptr_eq(&third, &fourth));
        assert_eq!(cache.rebuild_count(), 2);
        assert_eq!(third.total_records(), 2);

        // The old snapshot is untouched by the mutation.
        assert_eq!(first.total_records(), 1);
    }
}

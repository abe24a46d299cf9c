//! In-memory response cache keyed by `repoStateId` (§3, §5).
//!
//! `repoStateId` is the universal cache key: an entry is valid exactly while
//! the working tree is bit-identical *and* the symbol graph hasn't ingested
//! a new snapshot since the entry was cached. No background sweep runs —
//! staleness is discovered lazily the next time an entry is looked up,
//! matching §5: "cache entries whose key no longer matches are discarded
//! lazily on next access."

use dashmap::DashMap;

struct Entry<V> {
    snapshot_id: String,
    value: V,
}

/// A cache of query results, keyed by `repoStateId`, invalidated against the
/// symbol graph's current snapshot id.
pub struct SnapshotCache<V> {
    entries: DashMap<String, Entry<V>>,
}

impl<V: Clone> SnapshotCache<V> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Look up `repo_state_id`, discarding (and returning `None` for) an
    /// entry whose `snapshot_id` no longer matches `current_snapshot_id`.
    pub fn get(&self, repo_state_id: &str, current_snapshot_id: &str) -> Option<V> {
        let stale = match self.entries.get(repo_state_id) {
            Some(entry) => entry.snapshot_id != current_snapshot_id,
            None => return None,
        };
        if stale {
            self.entries.remove(repo_state_id);
            return None;
        }
        self.entries.get(repo_state_id).map(|e| e.value.clone())
    }

    pub fn insert(&self, repo_state_id: String, snapshot_id: String, value: V) {
        self.entries.insert(repo_state_id, Entry { snapshot_id, value });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V: Clone> Default for SnapshotCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_when_snapshot_unchanged() {
        let cache: SnapshotCache<u32> = SnapshotCache::new();
        cache.insert("repo1".into(), "sha256:a".into(), 42);
        assert_eq!(cache.get("repo1", "sha256:a"), Some(42));
    }

    #[test]
    fn miss_and_evicted_when_snapshot_changed() {
        let cache: SnapshotCache<u32> = SnapshotCache::new();
        cache.insert("repo1".into(), "sha256:a".into(), 42);
        assert_eq!(cache.get("repo1", "sha256:b"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn miss_when_key_absent() {
        let cache: SnapshotCache<u32> = SnapshotCache::new();
        assert_eq!(cache.get("nope", "sha256:a"), None);
    }
}

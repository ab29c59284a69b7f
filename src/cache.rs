//! In-process metadata cache for message indices
//!
//! Tracks, per time-windowed index, which metric fields have already been
//! mapped in the backend, so the store path only pushes mappings for
//! genuinely new fields. Entries are keyed by the qualified field name
//! (`{normalizedName}.{acronym}`): the same metric name reported with a
//! new type is a new field and must be pushed again.
//!
//! Mutations must only happen inside the per-index critical section
//! handed out by [`MetadataCache::index_lock`]; lock-free reads are a
//! fast path and anything acted on from them is re-validated under the
//! lock.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::Mutex;

use crate::model::MetricKind;

/// Shared per-index mapping state
#[derive(Debug, Default)]
pub struct MetadataCache {
    /// Per-index mutex shards serializing "read cache, diff, push, update"
    locks: DashMap<String, Arc<Mutex<()>>>,
    /// Qualified metric field -> kind, per index
    metrics_by_index: RwLock<HashMap<String, HashMap<String, MetricKind>>>,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The mutex guarding mapping synchronization for one index.
    ///
    /// Shards are created on demand and live for the cache's lifetime;
    /// the number of distinct indices is bounded by the rollover window.
    pub fn index_lock(&self, index: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(index.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Lock-free fast path: has this index been seen since startup?
    pub fn is_known(&self, index: &str) -> bool {
        self.metrics_by_index.read().contains_key(index)
    }

    /// Snapshot of the known metric fields for an index
    pub fn known_metrics(&self, index: &str) -> Option<HashMap<String, MetricKind>> {
        self.metrics_by_index.read().get(index).cloned()
    }

    /// Merge newly mapped fields into the cache (marks the index known
    /// even when the field set is empty).
    pub fn record(&self, index: &str, fields: &[(String, MetricKind)]) {
        let mut cache = self.metrics_by_index.write();
        let known = cache.entry(index.to_string()).or_default();
        for (field, kind) in fields {
            known.insert(field.clone(), *kind);
        }
    }

    /// Drop everything; used after bulk index deletion, when the on-disk
    /// mappings no longer match the in-memory view.
    pub fn invalidate_all(&self) {
        self.metrics_by_index.write().clear();
        self.locks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_marks_index_known() {
        let cache = MetadataCache::new();
        assert!(!cache.is_known("idx"));

        cache.record("idx", &[]);
        assert!(cache.is_known("idx"));
        assert!(cache.known_metrics("idx").unwrap().is_empty());
    }

    #[test]
    fn test_record_merges_fields() {
        let cache = MetadataCache::new();
        cache.record("idx", &[("temp.dbl".to_string(), MetricKind::Double)]);
        cache.record("idx", &[("state.str".to_string(), MetricKind::String)]);

        let known = cache.known_metrics("idx").unwrap();
        assert_eq!(known.len(), 2);
        assert_eq!(known["temp.dbl"], MetricKind::Double);
        assert_eq!(known["state.str"], MetricKind::String);
    }

    #[test]
    fn test_invalidate_all() {
        let cache = MetadataCache::new();
        cache.record("idx", &[("temp.dbl".to_string(), MetricKind::Double)]);
        cache.invalidate_all();
        assert!(!cache.is_known("idx"));
    }

    #[test]
    fn test_index_lock_is_shared_per_index() {
        let cache = MetadataCache::new();
        let a = cache.index_lock("idx");
        let b = cache.index_lock("idx");
        assert!(Arc::ptr_eq(&a, &b));
        let other = cache.index_lock("other");
        assert!(!Arc::ptr_eq(&a, &other));
    }
}

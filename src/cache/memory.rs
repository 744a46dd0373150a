//! In-memory cache tiers.
//!
//! Both use `DashMap` for thread-safe concurrent access. [`FastCache`] is the
//! in-process tier in front of every [`CacheStore`](crate::cache::CacheStore);
//! [`MemoryStore`] is a process-local [`DurableStore`] for single-instance
//! deployments and tests.

use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use crate::cache::{CacheEntry, DurableStore};
use crate::error::Result;

/// Fast in-process tier.
///
/// Expired entries are evicted lazily when read. When `max_entries` is set,
/// an insert that grows the map past it sweeps expired entries.
pub struct FastCache {
    data: DashMap<String, CacheEntry>,
    max_entries: Option<usize>,
    sweep_lock: Mutex<()>,
}

impl std::fmt::Debug for FastCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastCache")
            .field("entries", &self.data.len())
            .field("max_entries", &self.max_entries)
            .finish()
    }
}

impl Default for FastCache {
    fn default() -> Self {
        Self::new(None)
    }
}

impl FastCache {
    /// Create a fast tier with an optional sweep threshold.
    pub fn new(max_entries: Option<usize>) -> Self {
        Self {
            data: DashMap::new(),
            max_entries,
            sweep_lock: Mutex::new(()),
        }
    }

    /// Get a valid payload, evicting the entry if it has expired.
    pub fn get(&self, key: &str, now: u64) -> Option<Value> {
        if let Some(entry) = self.data.get(key) {
            if entry.is_valid_at(now) {
                return Some(entry.payload.clone());
            }
            // Entry expired, remove it
            drop(entry);
            self.data.remove_if(key, |_, entry| !entry.is_valid_at(now));
        }
        None
    }

    /// Insert or replace an entry.
    pub fn insert(&self, entry: CacheEntry, now: u64) {
        self.data.insert(entry.key.clone(), entry);

        if let Some(max) = self.max_entries {
            if self.data.len() > max {
                // Try to acquire sweep lock (non-blocking)
                if let Some(_guard) = self.sweep_lock.try_lock() {
                    let removed = self.sweep(now);
                    debug!(removed, max, "fast cache over threshold, swept expired entries");
                }
            }
        }
    }

    /// Remove an entry.
    pub fn remove(&self, key: &str) {
        self.data.remove(key);
    }

    /// Remove every expired entry, returning how many were dropped.
    pub fn sweep(&self, now: u64) -> usize {
        let before = self.data.len();
        self.data.retain(|_, entry| entry.is_valid_at(now));
        before.saturating_sub(self.data.len())
    }

    /// Get the number of entries currently stored.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the tier is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Clear all entries.
    pub fn clear(&self) {
        self.data.clear();
    }
}

/// Process-local durable tier.
///
/// Stores entries as given and leaves expiry checks to the caller; expired
/// entries linger until [`DurableStore::delete_expired`] runs.
#[cfg(feature = "memory")]
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: DashMap<String, CacheEntry>,
}

#[cfg(feature = "memory")]
impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of entries currently stored, expired or not.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(feature = "memory")]
impl DurableStore for MemoryStore {
    async fn put(&self, entry: CacheEntry) -> Result<()> {
        self.data.insert(entry.key.clone(), entry);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        Ok(self.data.get(key).map(|entry| entry.value().clone()))
    }

    async fn delete_expired(&self, now: u64) -> Result<u64> {
        let before = self.data.len();
        self.data.retain(|_, entry| entry.is_valid_at(now));
        Ok(before.saturating_sub(self.data.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;

    #[test]
    fn test_fast_cache_basic() {
        let cache = FastCache::default();
        let entry = CacheEntry::new("key1", json!("v"), 0, Duration::from_secs(60));
        cache.insert(entry, 0);

        assert_eq!(cache.get("key1", 1_000), Some(json!("v")));
        assert_eq!(cache.get("missing", 1_000), None);
    }

    #[test]
    fn test_fast_cache_lazy_eviction() {
        let cache = FastCache::default();
        cache.insert(CacheEntry::new("key1", json!(1), 0, Duration::from_millis(10)), 0);

        assert!(cache.get("key1", 10).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_fast_cache_threshold_sweep() {
        let cache = FastCache::new(Some(2));
        cache.insert(CacheEntry::new("a", json!(1), 0, Duration::from_millis(5)), 0);
        cache.insert(CacheEntry::new("b", json!(2), 0, Duration::from_millis(5)), 0);
        cache.insert(CacheEntry::new("c", json!(3), 100, Duration::from_secs(1)), 100);

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("c", 100), Some(json!(3)));
    }

    #[cfg(feature = "memory")]
    #[tokio::test]
    async fn test_memory_store_delete_expired() {
        let store = MemoryStore::new();
        store
            .put(CacheEntry::new("old", json!(1), 0, Duration::from_secs(1)))
            .await
            .unwrap();
        store
            .put(CacheEntry::new("new", json!(2), 0, Duration::from_secs(100)))
            .await
            .unwrap();

        let removed = store.delete_expired(5_000).await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.get("old").await.unwrap().is_none());
        assert!(store.get("new").await.unwrap().is_some());
    }
}

//! Two-tier response cache.
//!
//! [`CacheStore`] reads through a fast in-process tier ([`FastCache`]) and a
//! durable tier implementing [`DurableStore`]. Caching is an optimization: a
//! failing durable tier is logged and treated as a miss, never surfaced.

mod entry;
mod memory;
#[cfg(feature = "redis")]
mod redis;

pub use entry::CacheEntry;
pub use memory::FastCache;

#[cfg(feature = "memory")]
pub use memory::MemoryStore;

// RedisStore with connection pooling
#[cfg(feature = "redis")]
pub use redis::{RedisConfig, RedisStore};

use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::clock::{SharedClock, SystemClock};
use crate::error::Result;

/// Durable key-value tier.
///
/// Implementations persist whole entries; expiry is decided by the caller from
/// [`CacheEntry::expires_at`], so a store may return expired entries.
/// Implementations must be thread-safe (`Send + Sync`).
///
/// # Example
///
/// ```ignore
/// use arena_relay::cache::{CacheEntry, DurableStore};
///
/// async fn example<D: DurableStore>(store: &D, now: u64) {
///     let entry = CacheEntry::new("key", serde_json::json!(1), now, Duration::from_secs(60));
///     store.put(entry).await?;
///
///     if let Some(entry) = store.get("key").await? {
///         println!("expires at {}", entry.expires_at);
///     }
/// }
/// ```
pub trait DurableStore: Send + Sync + 'static {
    /// Store an entry, replacing any existing entry under the same key.
    fn put(&self, entry: CacheEntry) -> impl Future<Output = Result<()>> + Send;

    /// Get an entry by key.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<CacheEntry>>> + Send;

    /// Remove every entry whose `expires_at` is at or before `now`.
    ///
    /// Returns the number of entries removed.
    fn delete_expired(&self, now: u64) -> impl Future<Output = Result<u64>> + Send;
}

impl<D: DurableStore + ?Sized> DurableStore for Arc<D> {
    async fn put(&self, entry: CacheEntry) -> Result<()> {
        (**self).put(entry).await
    }

    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        (**self).get(key).await
    }

    async fn delete_expired(&self, now: u64) -> Result<u64> {
        (**self).delete_expired(now).await
    }
}

impl<D: DurableStore + ?Sized> DurableStore for Box<D> {
    async fn put(&self, entry: CacheEntry) -> Result<()> {
        (**self).put(entry).await
    }

    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        (**self).get(key).await
    }

    async fn delete_expired(&self, now: u64) -> Result<u64> {
        (**self).delete_expired(now).await
    }
}

/// Shortest interval between two background sweeps.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Cache configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Lifetime of cached player records.
    pub ttl: Duration,
    /// How often the background sweeper runs.
    pub sweep_interval: Duration,
    /// Fast-tier size that triggers an inline sweep of expired entries.
    pub fast_max_entries: Option<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(10 * 60),
            sweep_interval: Duration::from_secs(6 * 60 * 60),
            fast_max_entries: Some(10_000),
        }
    }
}

impl CacheConfig {
    /// Set the entry lifetime.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the sweep interval.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Set the fast-tier sweep threshold.
    pub fn with_fast_max_entries(mut self, max: Option<usize>) -> Self {
        self.fast_max_entries = max;
        self
    }
}

/// Read-through cache over a fast and a durable tier.
///
/// # Example
///
/// ```ignore
/// use arena_relay::cache::{CacheStore, MemoryStore};
/// use std::time::Duration;
///
/// let cache = CacheStore::new(MemoryStore::new());
/// cache.set("key", serde_json::json!({"a": 1}), Duration::from_secs(60)).await;
/// assert!(cache.get("key").await.is_some());
/// ```
pub struct CacheStore<D> {
    fast: FastCache,
    durable: D,
    clock: SharedClock,
    config: CacheConfig,
    shutdown: Arc<Notify>,
}

impl<D> std::fmt::Debug for CacheStore<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("fast", &self.fast)
            .field("config", &self.config)
            .finish()
    }
}

impl<D: DurableStore> CacheStore<D> {
    /// Create a cache with default configuration on the system clock.
    pub fn new(durable: D) -> Self {
        Self::with_config(durable, CacheConfig::default(), SystemClock::shared())
    }

    /// Create a cache with custom configuration and clock.
    pub fn with_config(durable: D, config: CacheConfig, clock: SharedClock) -> Self {
        Self {
            fast: FastCache::new(config.fast_max_entries),
            durable,
            clock,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Cache configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// The fast tier.
    pub fn fast(&self) -> &FastCache {
        &self.fast
    }

    /// The durable tier.
    pub fn durable(&self) -> &D {
        &self.durable
    }

    /// Look up a key, fast tier first.
    ///
    /// A durable-tier hit back-fills the fast tier. Returns `None` when no
    /// tier holds a valid entry or the durable tier fails.
    pub async fn get(&self, key: &str) -> Option<Value> {
        let now = self.clock.now_ms();

        if let Some(payload) = self.fast.get(key, now) {
            trace!(key, tier = "fast", "cache hit");
            return Some(payload);
        }

        match self.durable.get(key).await {
            Ok(Some(entry)) if entry.is_valid_at(now) => {
                trace!(key, tier = "durable", "cache hit");
                let payload = entry.payload.clone();
                self.fast.insert(entry, now);
                Some(payload)
            }
            Ok(_) => {
                trace!(key, "cache miss");
                None
            }
            Err(e) => {
                warn!(key, error = %e, "durable cache tier unavailable, treating as miss");
                None
            }
        }
    }

    /// Store a payload in both tiers.
    pub async fn set(&self, key: &str, payload: Value, ttl: Duration) {
        let now = self.clock.now_ms();
        let entry = CacheEntry::new(key, payload, now, ttl);

        self.fast.insert(entry.clone(), now);
        if let Err(e) = self.durable.put(entry).await {
            warn!(key, error = %e, "durable cache tier unavailable, entry kept in memory only");
        }
    }

    /// Look up and deserialize a typed payload.
    ///
    /// A payload that no longer matches `T` is treated as a miss.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let payload = self.get(key).await?;
        match serde_json::from_value(payload) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "cached payload has unexpected shape, ignoring");
                self.fast.remove(key);
                None
            }
        }
    }

    /// Serialize and store a typed payload.
    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        match serde_json::to_value(value) {
            Ok(payload) => self.set(key, payload, ttl).await,
            Err(e) => warn!(key, error = %e, "failed to serialize cache payload"),
        }
    }

    /// Drop expired entries from both tiers.
    ///
    /// Returns the number of durable entries removed.
    pub async fn sweep(&self) -> u64 {
        let now = self.clock.now_ms();
        let fast_removed = self.fast.sweep(now);

        match self.durable.delete_expired(now).await {
            Ok(removed) => {
                info!(fast_removed, durable_removed = removed, "cache sweep finished");
                removed
            }
            Err(e) => {
                warn!(error = %e, "durable cache sweep failed");
                0
            }
        }
    }

    /// Stop a sweeper started with [`spawn_sweeper`](Self::spawn_sweeper).
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }

    /// Start the periodic sweep task.
    ///
    /// The task only holds a weak reference and exits once the cache is
    /// dropped or [`shutdown`](Self::shutdown) is called.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let interval = if interval < MIN_SWEEP_INTERVAL {
            warn!(interval_ms = interval.as_millis() as u64, "sweep interval too short, using 1s");
            MIN_SWEEP_INTERVAL
        } else {
            interval
        };
        let cache: Weak<Self> = Arc::downgrade(self);
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        let Some(cache) = cache.upgrade() else {
                            break;
                        };
                        cache.sweep().await;
                    }
                    _ = shutdown.notified() => {
                        break;
                    }
                }
            }
            debug!("cache sweeper stopped");
        })
    }
}

impl<D> Drop for CacheStore<D> {
    fn drop(&mut self) {
        self.shutdown.notify_waiters();
    }
}

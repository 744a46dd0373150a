//! Redis durable tier.
//!
//! Uses connection pooling for high performance. Entries are stored as JSON
//! with a Redis expiry matching their own, so the periodic sweep only has to
//! catch entries whose embedded expiry passed before Redis evicted them.

use std::time::Duration;

use deadpool_redis::{Config, Connection, Pool, Runtime, redis::{AsyncCommands, cmd}};

use crate::cache::{CacheEntry, DurableStore};
use crate::clock::current_timestamp_ms;
use crate::error::{CacheError, Result};

/// Redis store configuration.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL (e.g., "redis://localhost:6379")
    pub url: String,
    /// Connection pool size
    pub pool_size: usize,
    /// Key prefix for cache keys
    pub key_prefix: String,
    /// Keys fetched per SCAN round during a sweep
    pub scan_count: usize,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            pool_size: 10,
            key_prefix: "arena:".to_string(),
            scan_count: 100,
        }
    }
}

impl RedisConfig {
    /// Create a new Redis configuration.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set the key prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Set the pool size.
    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }
}

/// Redis-backed durable tier.
///
/// # Example
///
/// ```ignore
/// use arena_relay::cache::{RedisStore, RedisConfig, CacheStore};
///
/// let config = RedisConfig::new("redis://localhost:6379").with_prefix("relay:");
/// let cache = CacheStore::new(RedisStore::new(config).await?);
/// ```
pub struct RedisStore {
    pool: Pool,
    key_prefix: String,
    scan_count: usize,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("key_prefix", &self.key_prefix)
            .finish()
    }
}

impl RedisStore {
    /// Create a new Redis store from configuration and check connectivity.
    pub async fn new(config: RedisConfig) -> Result<Self> {
        let mut cfg = Config::from_url(&config.url);
        cfg.pool = Some(deadpool_redis::PoolConfig::new(config.pool_size));
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;

        // Test connection
        let mut conn = pool
            .get()
            .await
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;
        let _: () = cmd("PING")
            .query_async(&mut *conn)
            .await
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;

        Ok(Self {
            pool,
            key_prefix: config.key_prefix,
            scan_count: config.scan_count,
        })
    }

    /// Create a new Redis store from a URL.
    pub async fn from_url(url: impl Into<String>) -> Result<Self> {
        Self::new(RedisConfig::new(url)).await
    }

    /// Get the full key with prefix.
    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    /// Get a connection from the pool.
    async fn get_conn(&self) -> Result<Connection> {
        self.pool
            .get()
            .await
            .map_err(|_| CacheError::PoolExhausted.into())
    }
}

fn decode(json: &str) -> Result<CacheEntry> {
    serde_json::from_str(json).map_err(|e| CacheError::Serialization(e.to_string()).into())
}

impl DurableStore for RedisStore {
    async fn put(&self, entry: CacheEntry) -> Result<()> {
        let mut conn = self.get_conn().await?;
        let full_key = self.full_key(&entry.key);

        // Redis rejects a zero expiry; keep already-expired entries for a second.
        let ttl = entry.remaining_ttl(current_timestamp_ms()).max(Duration::from_secs(1));
        let ttl_secs = ttl.as_secs();

        let json = serde_json::to_string(&entry)
            .map_err(|e| CacheError::Serialization(e.to_string()))?;

        conn.set_ex::<_, _, ()>(&full_key, json, ttl_secs)
            .await
            .map_err(|e| CacheError::operation_failed(e.to_string(), true))?;

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let mut conn = self.get_conn().await?;
        let full_key = self.full_key(key);

        let result: Option<String> = conn
            .get(&full_key)
            .await
            .map_err(|e| CacheError::operation_failed(e.to_string(), true))?;

        result.as_deref().map(decode).transpose()
    }

    async fn delete_expired(&self, now: u64) -> Result<u64> {
        let mut conn = self.get_conn().await?;
        let pattern = format!("{}*", self.key_prefix);
        let mut cursor: u64 = 0;
        let mut removed = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(self.scan_count)
                .query_async(&mut *conn)
                .await
                .map_err(|e| CacheError::operation_failed(e.to_string(), true))?;

            for key in keys {
                let value: Option<String> = conn
                    .get(&key)
                    .await
                    .map_err(|e| CacheError::operation_failed(e.to_string(), true))?;

                // Unreadable entries are dropped too; nothing can serve them.
                let expired = match value.as_deref().map(decode) {
                    Some(Ok(entry)) => !entry.is_valid_at(now),
                    Some(Err(_)) => true,
                    None => false,
                };

                if expired {
                    conn.del::<_, ()>(&key)
                        .await
                        .map_err(|e| CacheError::operation_failed(e.to_string(), true))?;
                    removed += 1;
                }
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(removed)
    }
}

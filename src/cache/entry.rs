//! Cache entry type shared by both tiers.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Entry stored in the cache tiers.
///
/// An entry is valid only while `now < expires_at`; an expired entry is never
/// returned from [`CacheStore::get`](crate::cache::CacheStore::get).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheEntry {
    /// Cache key.
    pub key: String,

    /// Cached JSON payload.
    pub payload: Value,

    /// Creation timestamp (Unix milliseconds).
    pub created_at: u64,

    /// Expiry timestamp (Unix milliseconds).
    pub expires_at: u64,
}

impl CacheEntry {
    /// Create an entry created at `now` that lives for `ttl`.
    pub fn new(key: impl Into<String>, payload: Value, now: u64, ttl: Duration) -> Self {
        Self {
            key: key.into(),
            payload,
            created_at: now,
            expires_at: now.saturating_add(ttl.as_millis() as u64),
        }
    }

    /// Whether the entry may still be served at `now`.
    pub fn is_valid_at(&self, now: u64) -> bool {
        now < self.expires_at
    }

    /// Time left before expiry, zero once expired.
    pub fn remaining_ttl(&self, now: u64) -> Duration {
        Duration::from_millis(self.expires_at.saturating_sub(now))
    }
}

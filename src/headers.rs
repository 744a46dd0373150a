//! HTTP headers used by the relay.
//!
//! Upstream request headers and the response headers the HTTP surface adds.

use std::time::Duration;

use crate::decision::LimiterInfo;

/// Header names.
pub mod names {
    /// Riot API key header sent on every upstream call.
    pub const RIOT_TOKEN: &str = "X-Riot-Token";

    /// Seconds until the client should retry (standard HTTP header).
    pub const RETRY_AFTER: &str = "Retry-After";

    /// Whether a lookup was served from the cache (`HIT` / `MISS`).
    pub const X_CACHE: &str = "X-Cache";

    /// Requests waiting in the upstream queue.
    pub const X_QUEUE_PENDING: &str = "X-Queue-Pending";

    /// Client request budget per window.
    pub const X_RATELIMIT_LIMIT: &str = "X-RateLimit-Limit";

    /// Client requests left in the current window.
    pub const X_RATELIMIT_REMAINING: &str = "X-RateLimit-Remaining";
}

/// Cache outcome reported in [`names::X_CACHE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Served from a cache tier.
    Hit,
    /// Fetched from the upstream.
    Miss,
}

impl CacheStatus {
    /// Header value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hit => "HIT",
            Self::Miss => "MISS",
        }
    }
}

impl From<bool> for CacheStatus {
    fn from(from_cache: bool) -> Self {
        if from_cache { Self::Hit } else { Self::Miss }
    }
}

/// Builder for relay response headers.
#[derive(Debug, Default)]
pub struct RelayHeaders {
    cache: Option<CacheStatus>,
    retry_after: Option<u64>,
    queue_pending: Option<usize>,
    limit: Option<(u64, u64)>,
}

impl RelayHeaders {
    /// Create a new header builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cache status header.
    pub fn cache(mut self, status: CacheStatus) -> Self {
        self.cache = Some(status);
        self
    }

    /// Set the retry-after header, rounded up to whole seconds.
    pub fn retry_after(mut self, wait: Duration) -> Self {
        let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
        self.retry_after = Some(secs.max(1));
        self
    }

    /// Set the queue depth header.
    pub fn queue_pending(mut self, pending: usize) -> Self {
        self.queue_pending = Some(pending);
        self
    }

    /// Set the client budget headers from a limiter snapshot.
    pub fn limit(mut self, info: &LimiterInfo) -> Self {
        self.limit = Some((info.limit, info.remaining()));
        self
    }

    /// Convert to a vector of (name, value) pairs.
    pub fn to_vec(&self) -> Vec<(&'static str, String)> {
        let mut headers = Vec::new();

        if let Some(status) = self.cache {
            headers.push((names::X_CACHE, status.as_str().to_string()));
        }
        if let Some(retry_after) = self.retry_after {
            headers.push((names::RETRY_AFTER, retry_after.to_string()));
        }
        if let Some(pending) = self.queue_pending {
            headers.push((names::X_QUEUE_PENDING, pending.to_string()));
        }
        if let Some((limit, remaining)) = self.limit {
            headers.push((names::X_RATELIMIT_LIMIT, limit.to_string()));
            headers.push((names::X_RATELIMIT_REMAINING, remaining.to_string()));
        }

        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_builder() {
        let headers = RelayHeaders::new()
            .cache(CacheStatus::Hit)
            .queue_pending(4)
            .to_vec();

        assert_eq!(headers.len(), 2);
        assert!(headers.iter().any(|(k, v)| *k == "X-Cache" && v == "HIT"));
        assert!(headers.iter().any(|(k, v)| *k == "X-Queue-Pending" && v == "4"));
    }

    #[test]
    fn test_limit_headers() {
        let headers = RelayHeaders::new()
            .limit(&LimiterInfo::new(20, 19, 0, 120_000))
            .to_vec();

        assert!(headers.iter().any(|(k, v)| *k == "X-RateLimit-Limit" && v == "20"));
        assert!(headers.iter().any(|(k, v)| *k == "X-RateLimit-Remaining" && v == "1"));
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let headers = RelayHeaders::new()
            .retry_after(Duration::from_millis(1_500))
            .to_vec();
        assert!(headers.iter().any(|(k, v)| *k == "Retry-After" && v == "2"));

        let headers = RelayHeaders::new().retry_after(Duration::ZERO).to_vec();
        assert!(headers.iter().any(|(k, v)| *k == "Retry-After" && v == "1"));
    }

    #[test]
    fn test_cache_status_from_flag() {
        assert_eq!(CacheStatus::from(true), CacheStatus::Hit);
        assert_eq!(CacheStatus::from(false).as_str(), "MISS");
    }
}

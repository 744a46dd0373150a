//! Relay configuration.
//!
//! Every section has working defaults; only the Riot API key is required.
//!
//! | Variable | Field |
//! |----------|-------|
//! | `RIOT_API_KEY` | `api_key` (required, `RGAPI-` prefix) |
//! | `RELAY_MAX_CALLS` | `quota.max_calls` |
//! | `RELAY_WINDOW_MS` | `quota.window` |
//! | `RELAY_MIN_SPACING_MS` | `quota.min_spacing` |
//! | `RELAY_POISON_COOLDOWN_MS` | `quota.poison_cooldown` |
//! | `RELAY_TICK_MS` | `queue.tick` |
//! | `RELAY_QUEUE_CAPACITY` | `queue.capacity` |
//! | `RELAY_MAX_ATTEMPTS` | `retry.max_attempts` |
//! | `RELAY_REQUEST_TIMEOUT_MS` | `retry.request_timeout` |
//! | `RELAY_PLAYER_TTL_SECS` | `cache.ttl` |
//! | `RELAY_SWEEP_INTERVAL_SECS` | `cache.sweep_interval` |
//! | `RELAY_UPSTREAM_HOST` | `endpoints.host_template` |
//! | `RELAY_CLIENT_MAX_CALLS` | `client_quota.max_calls` |
//! | `RELAY_CLIENT_WINDOW_MS` | `client_quota.window` |
//! | `RELAY_CLIENT_IP_HEADER` | `client_ip_header` |
//! | `REDIS_URL` | `redis_url` |

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::CacheConfig;
use crate::error::{ConfigError, Result};
use crate::player::Endpoints;
use crate::queue::QueueConfig;
use crate::quota::{RateQuota, RateQuotaBuilder};
use crate::retry::RetryPolicy;

/// Prefix of every Riot API key.
pub const API_KEY_PREFIX: &str = "RGAPI-";

/// Default inbound requests per client and window.
pub const DEFAULT_CLIENT_MAX_CALLS: u64 = 20;
/// Default inbound client window.
pub const DEFAULT_CLIENT_WINDOW: Duration = Duration::from_secs(120);

/// Inbound budget applied to each client of the `/api` routes.
pub fn default_client_quota() -> RateQuota {
    RateQuota::new(DEFAULT_CLIENT_MAX_CALLS, DEFAULT_CLIENT_WINDOW).with_min_spacing(Duration::ZERO)
}

/// Complete relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Riot API key. Never serialized.
    #[serde(skip_serializing, default)]
    pub api_key: String,
    /// Upstream call budget.
    pub quota: RateQuota,
    /// Retry behaviour.
    pub retry: RetryPolicy,
    /// Request queue.
    pub queue: QueueConfig,
    /// Response cache.
    pub cache: CacheConfig,
    /// Upstream hosts.
    pub endpoints: Endpoints,
    /// Redis URL for the durable cache tier.
    pub redis_url: Option<String>,
    /// Per-client budget on the `/api` routes.
    pub client_quota: RateQuota,
    /// Header carrying the client address when running behind a proxy,
    /// e.g. `x-forwarded-for`. The peer address is used when unset.
    pub client_ip_header: Option<String>,
}

impl RelayConfig {
    /// Create a default configuration around `api_key`.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            quota: RateQuota::default(),
            retry: RetryPolicy::default(),
            queue: QueueConfig::default(),
            cache: CacheConfig::default(),
            endpoints: Endpoints::default(),
            redis_url: None,
            client_quota: default_client_quota(),
            client_ip_header: None,
        }
    }

    /// Read the configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read the configuration through `lookup`, which maps a variable name to
    /// its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("RIOT_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingRequired("RIOT_API_KEY".to_string()))?;

        let mut config = Self::new(api_key.trim());
        config.validate_api_key()?;

        let defaults = RateQuota::default();
        config.quota = RateQuotaBuilder::new()
            .max_calls(parse(&lookup, "RELAY_MAX_CALLS")?.unwrap_or(defaults.max_calls()))
            .window(millis(&lookup, "RELAY_WINDOW_MS")?.unwrap_or(defaults.window()))
            .min_spacing(millis(&lookup, "RELAY_MIN_SPACING_MS")?.unwrap_or(defaults.min_spacing()))
            .poison_cooldown(
                millis(&lookup, "RELAY_POISON_COOLDOWN_MS")?.unwrap_or(defaults.poison_cooldown()),
            )
            .build()?;

        if let Some(tick) = millis(&lookup, "RELAY_TICK_MS")? {
            if tick.is_zero() {
                return Err(invalid("RELAY_TICK_MS", "0"));
            }
            config.queue.tick = tick;
        }
        if let Some(capacity) = parse(&lookup, "RELAY_QUEUE_CAPACITY")? {
            config.queue.capacity = capacity;
        }
        if let Some(attempts) = parse::<u32, _>(&lookup, "RELAY_MAX_ATTEMPTS")? {
            if attempts == 0 {
                return Err(invalid("RELAY_MAX_ATTEMPTS", "0"));
            }
            config.retry.max_attempts = attempts;
        }
        if let Some(timeout) = millis(&lookup, "RELAY_REQUEST_TIMEOUT_MS")? {
            config.retry.request_timeout = timeout;
        }
        if let Some(ttl) = parse(&lookup, "RELAY_PLAYER_TTL_SECS")? {
            config.cache.ttl = Duration::from_secs(ttl);
        }
        if let Some(interval) = parse::<u64, _>(&lookup, "RELAY_SWEEP_INTERVAL_SECS")? {
            if interval == 0 {
                return Err(invalid("RELAY_SWEEP_INTERVAL_SECS", "0"));
            }
            config.cache.sweep_interval = Duration::from_secs(interval);
        }
        if let Some(host) = lookup("RELAY_UPSTREAM_HOST") {
            config.endpoints = Endpoints::new(host);
        }
        config.redis_url = lookup("REDIS_URL").filter(|url| !url.trim().is_empty());

        config.client_quota = RateQuotaBuilder::new()
            .max_calls(parse(&lookup, "RELAY_CLIENT_MAX_CALLS")?.unwrap_or(DEFAULT_CLIENT_MAX_CALLS))
            .window(millis(&lookup, "RELAY_CLIENT_WINDOW_MS")?.unwrap_or(DEFAULT_CLIENT_WINDOW))
            .min_spacing(Duration::ZERO)
            .build()?;
        config.client_ip_header = lookup("RELAY_CLIENT_IP_HEADER")
            .map(|header| header.trim().to_ascii_lowercase())
            .filter(|header| !header.is_empty());

        Ok(config)
    }

    /// Check the API key format.
    pub fn validate_api_key(&self) -> Result<()> {
        if !self.api_key.starts_with(API_KEY_PREFIX) {
            return Err(ConfigError::InvalidApiKey(format!(
                "expected a key starting with {}",
                API_KEY_PREFIX
            ))
            .into());
        }
        Ok(())
    }

    /// Set the quota.
    pub fn with_quota(mut self, quota: RateQuota) -> Self {
        self.quota = quota;
        self
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the queue configuration.
    pub fn with_queue(mut self, queue: QueueConfig) -> Self {
        self.queue = queue;
        self
    }

    /// Set the cache configuration.
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Set the per-client quota.
    pub fn with_client_quota(mut self, quota: RateQuota) -> Self {
        self.client_quota = quota;
        self
    }

    /// Set the upstream endpoints.
    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }
}

fn invalid(name: &str, value: &str) -> crate::error::RelayError {
    ConfigError::InvalidValue {
        name: name.to_string(),
        value: value.to_string(),
    }
    .into()
}

fn parse<T, F>(lookup: &F, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| invalid(name, &raw)),
    }
}

fn millis<F>(lookup: &F, name: &str) -> Result<Option<Duration>>
where
    F: Fn(&str) -> Option<String>,
{
    Ok(parse::<u64, _>(lookup, name)?.map(Duration::from_millis))
}

//! Quota configuration for the upstream rate limiter.
//!
//! A `RateQuota` defines how many upstream calls are allowed per fixed window,
//! the minimum spacing between two calls, and how long the limiter stays shut
//! after the upstream answers 429 despite local admission.
//!
//! # Examples
//!
//! ```ignore
//! use arena_relay::RateQuota;
//! use std::time::Duration;
//!
//! // Conservative personal-key budget: 80 calls per 2 minutes, 3s apart
//! let quota = RateQuota::default();
//!
//! // Custom: 20 calls per second, no spacing
//! let quota = RateQuota::new(20, Duration::from_secs(1))
//!     .with_min_spacing(Duration::ZERO);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Default number of calls per window.
pub const DEFAULT_MAX_CALLS: u64 = 80;
/// Default window length.
pub const DEFAULT_WINDOW: Duration = Duration::from_millis(120_000);
/// Default minimum spacing between calls.
pub const DEFAULT_MIN_SPACING: Duration = Duration::from_millis(3_000);
/// Default cooldown after an unexpected 429.
pub const DEFAULT_POISON_COOLDOWN: Duration = Duration::from_secs(60);

/// Upstream call quota.
///
/// The defaults sit below the Riot personal key limit (100 calls per two
/// minutes) because the upstream limiter does not always agree with ours.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateQuota {
    /// Maximum number of calls in the window.
    max_calls: u64,

    /// Window duration.
    window: Duration,

    /// Minimum time between two consecutive calls.
    min_spacing: Duration,

    /// How long the limiter stays closed after being poisoned.
    poison_cooldown: Duration,
}

impl RateQuota {
    /// Create a new quota with the given maximum calls and window.
    ///
    /// Spacing and poison cooldown take their defaults.
    ///
    /// # Panics
    ///
    /// Panics if `max_calls` is 0 or `window` is zero duration.
    pub fn new(max_calls: u64, window: Duration) -> Self {
        assert!(max_calls > 0, "max_calls must be greater than 0");
        assert!(!window.is_zero(), "window must be non-zero");

        Self {
            max_calls,
            window,
            min_spacing: DEFAULT_MIN_SPACING.min(window),
            poison_cooldown: DEFAULT_POISON_COOLDOWN,
        }
    }

    /// Create a quota allowing `n` calls per second without spacing.
    pub fn per_second(n: u64) -> Self {
        Self::new(n, Duration::from_secs(1)).with_min_spacing(Duration::ZERO)
    }

    /// Set the minimum spacing between calls.
    pub fn with_min_spacing(mut self, spacing: Duration) -> Self {
        self.min_spacing = spacing;
        self
    }

    /// Set the poison cooldown.
    pub fn with_poison_cooldown(mut self, cooldown: Duration) -> Self {
        self.poison_cooldown = cooldown;
        self
    }

    /// Get the maximum calls per window.
    pub fn max_calls(&self) -> u64 {
        self.max_calls
    }

    /// Get the window duration.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Get the minimum spacing.
    pub fn min_spacing(&self) -> Duration {
        self.min_spacing
    }

    /// Get the poison cooldown.
    pub fn poison_cooldown(&self) -> Duration {
        self.poison_cooldown
    }
}

impl Default for RateQuota {
    fn default() -> Self {
        Self {
            max_calls: DEFAULT_MAX_CALLS,
            window: DEFAULT_WINDOW,
            min_spacing: DEFAULT_MIN_SPACING,
            poison_cooldown: DEFAULT_POISON_COOLDOWN,
        }
    }
}

/// Builder for quotas read from untrusted configuration.
///
/// Unlike [`RateQuota::new`], `build` reports invalid input as an error.
#[derive(Debug, Default)]
pub struct RateQuotaBuilder {
    max_calls: Option<u64>,
    window: Option<Duration>,
    min_spacing: Option<Duration>,
    poison_cooldown: Option<Duration>,
}

impl RateQuotaBuilder {
    /// Create a new quota builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum calls per window.
    pub fn max_calls(mut self, n: u64) -> Self {
        self.max_calls = Some(n);
        self
    }

    /// Set the window duration.
    pub fn window(mut self, window: Duration) -> Self {
        self.window = Some(window);
        self
    }

    /// Set the minimum spacing.
    pub fn min_spacing(mut self, spacing: Duration) -> Self {
        self.min_spacing = Some(spacing);
        self
    }

    /// Set the poison cooldown.
    pub fn poison_cooldown(mut self, cooldown: Duration) -> Self {
        self.poison_cooldown = Some(cooldown);
        self
    }

    /// Build the quota, falling back to defaults for unset fields.
    pub fn build(self) -> Result<RateQuota> {
        let max_calls = self.max_calls.unwrap_or(DEFAULT_MAX_CALLS);
        let window = self.window.unwrap_or(DEFAULT_WINDOW);
        let min_spacing = self.min_spacing.unwrap_or(DEFAULT_MIN_SPACING);
        let poison_cooldown = self.poison_cooldown.unwrap_or(DEFAULT_POISON_COOLDOWN);

        if max_calls == 0 {
            return Err(ConfigError::InvalidQuota("max_calls must be greater than 0".into()).into());
        }
        if window.is_zero() {
            return Err(ConfigError::InvalidQuota("window must be non-zero".into()).into());
        }
        if min_spacing > window {
            return Err(ConfigError::InvalidQuota(format!(
                "min_spacing ({min_spacing:?}) exceeds window ({window:?})"
            ))
            .into());
        }

        Ok(RateQuota {
            max_calls,
            window,
            min_spacing,
            poison_cooldown,
        })
    }
}

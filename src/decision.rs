//! Admission decisions.
//!
//! When the limiter is asked whether an upstream call may proceed, the answer
//! is a `Decision` carrying whether the call was admitted and a snapshot of
//! the limiter state at that moment.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The result of an admission check.
#[derive(Debug, Clone)]
pub struct Decision {
    /// Whether the call is admitted.
    allowed: bool,
    /// Limiter state.
    info: LimiterInfo,
}

impl Decision {
    /// Create a new "allowed" decision.
    pub fn allowed(info: LimiterInfo) -> Self {
        Self {
            allowed: true,
            info,
        }
    }

    /// Create a new "denied" decision.
    pub fn denied(info: LimiterInfo) -> Self {
        Self {
            allowed: false,
            info,
        }
    }

    /// Check if the call is admitted.
    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    /// Check if the call is denied.
    pub fn is_denied(&self) -> bool {
        !self.allowed
    }

    /// Get the limiter info.
    pub fn info(&self) -> &LimiterInfo {
        &self.info
    }

    /// Consume the decision and return the info.
    pub fn into_info(self) -> LimiterInfo {
        self.info
    }
}

/// Why an admission was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// `call_count` reached `max_calls` for the current window.
    WindowExhausted,
    /// The previous call was less than `min_spacing` ago.
    Spacing,
    /// The limiter was poisoned after an upstream 429.
    Poisoned,
}

impl DenyReason {
    /// Short name for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WindowExhausted => "window_exhausted",
            Self::Spacing => "spacing",
            Self::Poisoned => "poisoned",
        }
    }
}

/// Snapshot of the limiter at decision time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterInfo {
    /// Maximum calls per window.
    pub limit: u64,
    /// Calls recorded in the current window (after this decision).
    pub call_count: u64,
    /// Start of the current window (Unix milliseconds).
    pub window_start: u64,
    /// When the current window rolls over (Unix milliseconds).
    pub reset_at: u64,
    /// Earliest time the next admission can succeed (only set when denied).
    pub retry_after: Option<Duration>,
    /// Why the call was refused (only set when denied).
    pub reason: Option<DenyReason>,
}

impl LimiterInfo {
    /// Create a new limiter info.
    pub fn new(limit: u64, call_count: u64, window_start: u64, reset_at: u64) -> Self {
        Self {
            limit,
            call_count,
            window_start,
            reset_at,
            retry_after: None,
            reason: None,
        }
    }

    /// Set the retry-after duration.
    pub fn with_retry_after(mut self, duration: Duration) -> Self {
        self.retry_after = Some(duration);
        self
    }

    /// Set the denial reason.
    pub fn with_reason(mut self, reason: DenyReason) -> Self {
        self.reason = Some(reason);
        self
    }

    /// Calls still available in the current window.
    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.call_count)
    }
}

//! Fixed-window rate limiter for upstream calls.
//!
//! The limiter is owned by the request queue's drain loop and mutated through
//! `&mut self` only, so its counters need no synchronization.

use std::time::Duration;

use tracing::{debug, warn};

use crate::clock::{SharedClock, SystemClock};
use crate::decision::{Decision, DenyReason, LimiterInfo};
use crate::quota::RateQuota;

/// Rolling call budget.
#[derive(Debug, Clone, PartialEq)]
pub struct RateWindow {
    /// Start of the current window (Unix milliseconds).
    pub window_start: u64,
    /// Window length.
    pub window_length: Duration,
    /// Calls admitted in the current window.
    pub call_count: u64,
    /// Window capacity.
    pub max_calls: u64,
    /// Time of the last admitted call (Unix milliseconds).
    pub last_call_at: Option<u64>,
    /// Minimum time between two admitted calls.
    pub min_spacing: Duration,
}

impl RateWindow {
    fn new(quota: &RateQuota, now: u64) -> Self {
        Self {
            window_start: now,
            window_length: quota.window(),
            call_count: 0,
            max_calls: quota.max_calls(),
            last_call_at: None,
            min_spacing: quota.min_spacing(),
        }
    }

    fn window_ms(&self) -> u64 {
        self.window_length.as_millis() as u64
    }

    fn reset_at(&self) -> u64 {
        self.window_start + self.window_ms()
    }
}

/// Admission control for upstream calls.
///
/// A call is admitted when the window still has capacity and the previous
/// call is at least `min_spacing` old. The window restarts at the time of the
/// first check made after it expired, whether or not that check succeeds.
///
/// # Example
///
/// ```ignore
/// use arena_relay::{RateLimiter, RateQuota};
///
/// let mut limiter = RateLimiter::new(&RateQuota::default());
/// if limiter.try_consume() {
///     // call the upstream
/// }
/// ```
pub struct RateLimiter {
    window: RateWindow,
    poison_cooldown: Duration,
    poisoned_until: Option<u64>,
    clock: SharedClock,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("window", &self.window)
            .field("poisoned_until", &self.poisoned_until)
            .finish()
    }
}

impl RateLimiter {
    /// Create a limiter on the system clock.
    pub fn new(quota: &RateQuota) -> Self {
        Self::with_clock(quota, SystemClock::shared())
    }

    /// Create a limiter on a custom clock.
    pub fn with_clock(quota: &RateQuota, clock: SharedClock) -> Self {
        let now = clock.now_ms();
        Self {
            window: RateWindow::new(quota, now),
            poison_cooldown: quota.poison_cooldown(),
            poisoned_until: None,
            clock,
        }
    }

    /// Current window state.
    pub fn window(&self) -> &RateWindow {
        &self.window
    }

    /// Whether the limiter is currently poisoned.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned_until
            .is_some_and(|until| self.clock.now_ms() < until)
    }

    /// Whether the limiter holds no state worth keeping: not poisoned and
    /// its window has run out.
    pub fn is_idle(&self) -> bool {
        let now = self.clock.now_ms();
        let poisoned = self.poisoned_until.is_some_and(|until| now < until);
        !poisoned && now.saturating_sub(self.window.window_start) >= self.window.window_ms()
    }

    /// Admit a call if possible.
    ///
    /// Returns `true` and records the call when both the window capacity and
    /// the spacing allow it; returns `false` without recording otherwise.
    pub fn try_consume(&mut self) -> bool {
        self.check().is_allowed()
    }

    /// Admit a call if possible, describing the outcome.
    pub fn check(&mut self) -> Decision {
        let now = self.clock.now_ms();
        self.roll(now);

        if let Some(until) = self.poisoned_until {
            return Decision::denied(
                self.info()
                    .with_reason(DenyReason::Poisoned)
                    .with_retry_after(Duration::from_millis(until - now)),
            );
        }

        if self.window.call_count >= self.window.max_calls {
            let wait = self.window.reset_at().saturating_sub(now);
            return Decision::denied(
                self.info()
                    .with_reason(DenyReason::WindowExhausted)
                    .with_retry_after(Duration::from_millis(wait)),
            );
        }

        if let Some(last) = self.window.last_call_at {
            let since = now.saturating_sub(last);
            let spacing = self.window.min_spacing.as_millis() as u64;
            if since < spacing {
                return Decision::denied(
                    self.info()
                        .with_reason(DenyReason::Spacing)
                        .with_retry_after(Duration::from_millis(spacing - since)),
                );
            }
        }

        self.window.call_count += 1;
        self.window.last_call_at = Some(now);
        debug!(
            call_count = self.window.call_count,
            max_calls = self.window.max_calls,
            "call admitted"
        );

        Decision::allowed(self.info())
    }

    /// Close the limiter for the configured cooldown.
    pub fn poison(&mut self) {
        self.poison_for(self.poison_cooldown);
    }

    /// Close the limiter for `cooldown`.
    ///
    /// The window is marked full and no admission succeeds until the cooldown
    /// elapses, after which the window restarts empty. Poisoning an already
    /// poisoned limiter only ever extends the cooldown.
    pub fn poison_for(&mut self, cooldown: Duration) {
        let now = self.clock.now_ms();
        let until = now + cooldown.as_millis() as u64;
        self.window.call_count = self.window.max_calls;
        self.poisoned_until = Some(self.poisoned_until.map_or(until, |prev| prev.max(until)));
        warn!(cooldown_ms = cooldown.as_millis() as u64, "rate limiter poisoned");
    }

    /// Advance the window and lift an elapsed poison.
    fn roll(&mut self, now: u64) {
        if let Some(until) = self.poisoned_until {
            if now < until {
                return;
            }
            debug!("rate limiter cooldown elapsed");
            self.poisoned_until = None;
            self.window.call_count = 0;
            self.window.window_start = now;
            return;
        }

        if now.saturating_sub(self.window.window_start) >= self.window.window_ms() {
            self.window.call_count = 0;
            self.window.window_start = now;
        }
    }

    fn info(&self) -> LimiterInfo {
        LimiterInfo::new(
            self.window.max_calls,
            self.window.call_count,
            self.window.window_start,
            self.window.reset_at(),
        )
    }
}

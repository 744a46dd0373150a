//! Time sources.
//!
//! Every timestamp in the relay is milliseconds since the Unix epoch, read
//! through a [`Clock`] so that rate limiting and cache expiry can be simulated.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A millisecond time source.
pub trait Clock: Send + Sync + 'static {
    /// Current time in milliseconds since the Unix epoch.
    fn now_ms(&self) -> u64;
}

/// Shared, type-erased clock handle.
pub type SharedClock = Arc<dyn Clock>;

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}

/// Get the current wall-clock timestamp in milliseconds since Unix epoch.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Wall clock anchored to tokio's monotonic clock.
///
/// The Unix timestamp is captured once; afterwards time advances with
/// [`tokio::time::Instant`], so a paused tokio runtime drives this clock
/// together with every `tokio::time::sleep` in the relay.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: tokio::time::Instant,
    origin_ms: u64,
}

impl SystemClock {
    /// Create a clock anchored at the current instant.
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
            origin_ms: current_timestamp_ms(),
        }
    }

    /// Create a shared handle to a new system clock.
    pub fn shared() -> SharedClock {
        Arc::new(Self::new())
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.origin_ms + self.origin.elapsed().as_millis() as u64
    }
}

/// Manually driven clock for tests.
///
/// Clones share the same underlying time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a clock frozen at `start_ms`.
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    /// Set the clock to an absolute value.
    pub fn set(&self, now_ms: u64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_shared() {
        let clock = ManualClock::new(1_000);
        let other = clock.clone();

        clock.advance(Duration::from_millis(250));
        assert_eq!(other.now_ms(), 1_250);

        other.set(5);
        assert_eq!(clock.now_ms(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_system_clock_follows_tokio_time() {
        let clock = SystemClock::new();
        let start = clock.now_ms();

        tokio::time::advance(Duration::from_secs(90)).await;

        assert_eq!(clock.now_ms() - start, 90_000);
    }
}

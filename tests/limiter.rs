//! Integration tests for the upstream rate limiter.

use std::sync::Arc;
use std::time::Duration;

use arena_relay::{DenyReason, ManualClock, RateLimiter, RateQuota};

fn limiter(quota: RateQuota) -> (RateLimiter, ManualClock) {
    let clock = ManualClock::new(0);
    let limiter = RateLimiter::with_clock(&quota, Arc::new(clock.clone()));
    (limiter, clock)
}

#[test]
fn test_window_rollover() {
    let (mut limiter, clock) =
        limiter(RateQuota::new(2, Duration::from_secs(10)).with_min_spacing(Duration::ZERO));

    assert!(limiter.try_consume());
    assert!(limiter.try_consume());
    assert!(!limiter.try_consume(), "window should be exhausted");

    clock.advance(Duration::from_millis(9_999));
    assert!(!limiter.try_consume(), "window has not rolled yet");

    clock.advance(Duration::from_millis(1));
    assert!(limiter.try_consume(), "window should have rolled");
    assert_eq!(limiter.window().window_start, 10_000);
    assert_eq!(limiter.window().call_count, 1);
}

#[test]
fn test_min_spacing() {
    let (mut limiter, clock) = limiter(RateQuota::default());

    assert!(limiter.try_consume());

    clock.advance(Duration::from_millis(2_999));
    let decision = limiter.check();
    assert!(decision.is_denied());
    assert_eq!(decision.info().reason, Some(DenyReason::Spacing));
    assert_eq!(decision.info().retry_after, Some(Duration::from_millis(1)));

    clock.advance(Duration::from_millis(1));
    assert!(limiter.try_consume());
    assert_eq!(limiter.window().call_count, 2);
}

#[test]
fn test_failed_check_still_rolls_window() {
    let (mut limiter, clock) =
        limiter(RateQuota::new(5, Duration::from_secs(10)).with_min_spacing(Duration::from_secs(8)));

    clock.advance(Duration::from_secs(7));
    assert!(limiter.try_consume());

    clock.advance(Duration::from_secs(4));
    assert!(!limiter.try_consume(), "spacing should deny");
    assert_eq!(limiter.window().window_start, 11_000);
    assert_eq!(limiter.window().call_count, 0);
}

#[test]
fn test_poison_cooldown() {
    let (mut limiter, clock) = limiter(
        RateQuota::new(80, Duration::from_secs(120))
            .with_min_spacing(Duration::ZERO)
            .with_poison_cooldown(Duration::from_secs(60)),
    );

    assert!(limiter.try_consume());
    limiter.poison();
    assert_eq!(limiter.window().call_count, 80);

    clock.advance(Duration::from_secs(59));
    let decision = limiter.check();
    assert!(decision.is_denied());
    assert_eq!(decision.info().reason, Some(DenyReason::Poisoned));

    clock.advance(Duration::from_secs(1));
    assert!(limiter.try_consume(), "cooldown elapsed");
    assert!(!limiter.is_poisoned());
    assert_eq!(limiter.window().window_start, 60_000);
    assert_eq!(limiter.window().call_count, 1);
}

#[test]
fn test_poison_outlasts_window() {
    let (mut limiter, clock) = limiter(
        RateQuota::new(10, Duration::from_secs(5)).with_min_spacing(Duration::ZERO),
    );

    limiter.poison_for(Duration::from_secs(30));

    clock.advance(Duration::from_secs(10));
    assert!(!limiter.try_consume(), "a rolled window must not lift the poison");

    clock.advance(Duration::from_secs(20));
    assert!(limiter.try_consume());
}

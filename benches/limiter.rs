//! Benchmarks for the upstream rate limiter.

use std::sync::Arc;
use std::time::Duration;

use arena_relay::{ManualClock, RateLimiter, RateQuota};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn bench_admission(c: &mut Criterion) {
    let mut group = c.benchmark_group("limiter");

    group.bench_function("admit", |b| {
        let clock = ManualClock::new(0);
        let quota = RateQuota::new(u64::MAX, Duration::from_secs(3600)).with_min_spacing(Duration::ZERO);
        let mut limiter = RateLimiter::with_clock(&quota, Arc::new(clock));
        b.iter(|| black_box(limiter.try_consume()))
    });

    group.bench_function("deny_spacing", |b| {
        let clock = ManualClock::new(0);
        let mut limiter = RateLimiter::with_clock(&RateQuota::default(), Arc::new(clock));
        limiter.try_consume();
        b.iter(|| black_box(limiter.check()))
    });

    group.bench_function("deny_poisoned", |b| {
        let clock = ManualClock::new(0);
        let mut limiter = RateLimiter::with_clock(&RateQuota::default(), Arc::new(clock));
        limiter.poison_for(Duration::from_secs(3600));
        b.iter(|| black_box(limiter.check()))
    });

    group.finish();
}

fn bench_window_rollover(c: &mut Criterion) {
    let mut group = c.benchmark_group("limiter_rollover");

    for window_ms in [1u64, 100, 10_000].iter() {
        group.bench_with_input(BenchmarkId::new("advance", window_ms), window_ms, |b, &window_ms| {
            let clock = ManualClock::new(0);
            let quota = RateQuota::new(10, Duration::from_millis(window_ms)).with_min_spacing(Duration::ZERO);
            let mut limiter = RateLimiter::with_clock(&quota, Arc::new(clock.clone()));
            b.iter(|| {
                clock.advance(Duration::from_millis(1));
                black_box(limiter.try_consume())
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_admission, bench_window_rollover);
criterion_main!(benches);

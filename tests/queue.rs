//! Integration tests for the request queue.
//!
//! All tests run on a paused tokio clock, so backoffs, ticks and cooldowns
//! complete instantly while keeping their ordering.

mod common;

use std::sync::Arc;
use std::time::Duration;

use arena_relay::{
    QueueConfig, RateLimiter, RateQuota, RelayError, RequestQueue, RetryPolicy, RetryingClient,
    UpstreamRequest,
};
use tokio::time::Instant;
use tokio_test::{assert_err, assert_ok};

use common::{MockTransport, ok, rate_limited, status};

const HOST: &str = "https://euw1.api.riotgames.com";

fn request(path: &str) -> UpstreamRequest {
    UpstreamRequest::get(format!("{HOST}{path}"))
}

fn spawn_queue(transport: &Arc<MockTransport>, config: QueueConfig) -> RequestQueue {
    let client = RetryingClient::new(transport.clone(), RetryPolicy::default());
    RequestQueue::spawn(client, RateLimiter::new(&RateQuota::default()), config)
}

#[tokio::test(start_paused = true)]
async fn test_fifo_without_contention() {
    let transport = Arc::new(
        MockTransport::new()
            .json("/a", "1")
            .json("/b", "2")
            .json("/c", "3"),
    );
    let queue = spawn_queue(&transport, QueueConfig::default());

    let start = Instant::now();
    let (a, b, c) = tokio::join!(
        queue.enqueue(request("/a")),
        queue.enqueue(request("/b")),
        queue.enqueue(request("/c")),
    );

    assert_eq!(a.unwrap().body, "1");
    assert_eq!(b.unwrap().body, "2");
    assert_eq!(c.unwrap().body, "3");
    assert_eq!(
        transport.calls(),
        vec![format!("{HOST}/a"), format!("{HOST}/b"), format!("{HOST}/c")]
    );
    // Three calls need at least two spacing intervals.
    assert!(start.elapsed() >= Duration::from_secs(6));
    assert_eq!(queue.pending(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_request_keeps_its_place() {
    let transport = Arc::new(
        MockTransport::new()
            .route("/r1", vec![rate_limited(5), rate_limited(5), ok("\"r1\"")])
            .json("/r2", "\"r2\""),
    );
    let queue = spawn_queue(&transport, QueueConfig::default());

    let first = {
        let queue = queue.clone();
        tokio::spawn(async move { queue.enqueue(request("/r1")).await })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;
    let second = {
        let queue = queue.clone();
        tokio::spawn(async move { queue.enqueue(request("/r2")).await })
    };

    assert_eq!(first.await.unwrap().unwrap().body, "\"r1\"");
    assert_eq!(second.await.unwrap().unwrap().body, "\"r2\"");

    let calls: Vec<String> = transport
        .calls()
        .into_iter()
        .map(|url| url.trim_start_matches(HOST).to_string())
        .collect();
    assert_eq!(calls, vec!["/r1", "/r1", "/r1", "/r2"]);
}

#[tokio::test(start_paused = true)]
async fn test_requeue_limit() {
    let transport = Arc::new(MockTransport::new().route("/busy", vec![rate_limited(1)]));
    let queue = spawn_queue(&transport, QueueConfig::default().with_max_requeues(1));

    let err = assert_err!(queue.enqueue(request("/busy")).await);

    assert!(matches!(err, RelayError::RateLimited { .. }));
    assert_eq!(err.retry_after(), Some(Duration::from_secs(1)));
    // Two dispatches, each absorbing one 429 before giving up.
    assert_eq!(transport.call_count(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_retry_exhaustion() {
    let transport = Arc::new(MockTransport::new().route("/down", vec![status(503)]));
    let queue = spawn_queue(&transport, QueueConfig::default());

    let err = assert_err!(queue.enqueue(request("/down")).await);

    assert_eq!(err.kind(), "upstream_unavailable");
    assert_eq!(transport.call_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_not_found_single_attempt() {
    let transport = Arc::new(MockTransport::new());
    let queue = spawn_queue(&transport, QueueConfig::default());

    let err = assert_err!(queue.enqueue(request("/nobody")).await);

    assert!(matches!(err, RelayError::NotFound(ref url) if url.ends_with("/nobody")));
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_backpressure_at_capacity() {
    let transport = Arc::new(MockTransport::new().route("/slow", vec![status(503), ok("{}")]));
    let queue = spawn_queue(&transport, QueueConfig::default().with_capacity(1));

    let in_flight = {
        let queue = queue.clone();
        tokio::spawn(async move { queue.enqueue(request("/slow")).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(queue.pending(), 1);

    let err = queue.enqueue(request("/other")).await.unwrap_err();
    match err {
        RelayError::Backpressure {
            capacity,
            retry_after,
        } => {
            assert_eq!(capacity, 1);
            assert_eq!(retry_after, Duration::from_secs(3));
        }
        other => panic!("expected backpressure, got {other:?}"),
    }

    assert_ok!(in_flight.await.unwrap());
    assert_eq!(queue.pending(), 0);
    assert_eq!(transport.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_caller_does_not_cancel() {
    let transport = Arc::new(MockTransport::new().json("/first", "1").json("/second", "2"));
    let queue = spawn_queue(&transport, QueueConfig::default());

    assert_ok!(queue.enqueue(request("/first")).await);

    let gave_up = tokio::time::timeout(Duration::from_millis(10), queue.enqueue(request("/second"))).await;
    assert!(gave_up.is_err(), "spacing should hold the second request");
    assert_eq!(queue.pending(), 1);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(transport.call_count(), 2);
    assert_eq!(queue.pending(), 0);
}

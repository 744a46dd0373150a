//! Serialized request queue in front of the upstream.
//!
//! Every upstream call goes through one drain loop task that owns the
//! [`RateLimiter`], the [`RetryingClient`] and the FIFO of waiting requests.
//! Callers talk to it through cheap, cloneable [`RequestQueue`] handles.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::clock::{SharedClock, SystemClock};
use crate::error::{RelayError, Result, UpstreamError};
use crate::limiter::RateLimiter;
use crate::retry::RetryingClient;
use crate::upstream::{HttpTransport, UpstreamRequest, UpstreamResponse};

/// Shortest drain loop tick; a zero tick is raised to this.
pub const MIN_TICK: Duration = Duration::from_millis(1);

/// Queue configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum pending requests, the in-flight one included.
    pub capacity: usize,
    /// Drain loop wake-up interval.
    pub tick: Duration,
    /// Times a rate-limited request is put back before it is rejected.
    pub max_requeues: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            tick: Duration::from_secs(3),
            max_requeues: 3,
        }
    }
}

impl QueueConfig {
    /// Set the capacity.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the tick interval.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Set the requeue limit.
    pub fn with_max_requeues(mut self, max: u32) -> Self {
        self.max_requeues = max;
        self
    }
}

/// A request waiting for the drain loop.
struct QueuedRequest {
    id: u64,
    request: UpstreamRequest,
    enqueued_at: u64,
    attempt_count: u32,
    responder: oneshot::Sender<Result<UpstreamResponse>>,
}

/// Handle to a running request queue.
///
/// # Example
///
/// ```ignore
/// use arena_relay::prelude::*;
///
/// let client = RetryingClient::new(ReqwestTransport::new(api_key)?, RetryPolicy::default());
/// let limiter = RateLimiter::new(&RateQuota::default());
/// let queue = RequestQueue::spawn(client, limiter, QueueConfig::default());
///
/// let response = queue.enqueue(UpstreamRequest::get(url)).await?;
/// ```
#[derive(Clone)]
pub struct RequestQueue {
    tx: mpsc::UnboundedSender<QueuedRequest>,
    pending: Arc<AtomicUsize>,
    next_id: Arc<AtomicU64>,
    capacity: usize,
    tick: Duration,
    clock: SharedClock,
}

impl std::fmt::Debug for RequestQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestQueue")
            .field("pending", &self.pending())
            .field("capacity", &self.capacity)
            .field("tick", &self.tick)
            .finish()
    }
}

impl RequestQueue {
    /// Start the drain loop on the current tokio runtime.
    ///
    /// The loop runs until every handle has been dropped and the requests
    /// already accepted have been resolved.
    pub fn spawn<T: HttpTransport>(
        client: RetryingClient<T>,
        limiter: RateLimiter,
        config: QueueConfig,
    ) -> Self {
        let tick = if config.tick < MIN_TICK {
            warn!(tick_ms = config.tick.as_millis() as u64, "queue tick too short, using 1ms");
            MIN_TICK
        } else {
            config.tick
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let clock = SystemClock::shared();

        let drain = DrainLoop {
            rx,
            queue: VecDeque::new(),
            limiter,
            client,
            pending: pending.clone(),
            max_requeues: config.max_requeues,
            clock: clock.clone(),
        };
        tokio::spawn(drain.run(tick));

        info!(capacity = config.capacity, tick_ms = tick.as_millis() as u64, "request queue started");

        Self {
            tx,
            pending,
            next_id: Arc::new(AtomicU64::new(1)),
            capacity: config.capacity,
            tick,
            clock,
        }
    }

    /// Queue `request` and wait for its outcome.
    ///
    /// Fails immediately with [`RelayError::Backpressure`] when the queue is
    /// full. Dropping the returned future does not cancel the upstream call.
    pub async fn enqueue(&self, request: UpstreamRequest) -> Result<UpstreamResponse> {
        let capacity = self.capacity;
        let reserved = self
            .pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < capacity).then_some(n + 1)
            });

        if let Err(pending) = reserved {
            let retry_after = self.tick.saturating_mul(pending.min(u32::MAX as usize) as u32);
            warn!(pending, capacity, url = %request.url, "request queue full");
            return Err(RelayError::Backpressure {
                capacity,
                retry_after,
            });
        }

        let (responder, response) = oneshot::channel();
        let item = QueuedRequest {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            request,
            enqueued_at: self.clock.now_ms(),
            attempt_count: 0,
            responder,
        };

        if self.tx.send(item).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(RelayError::QueueClosed);
        }

        response.await.map_err(|_| RelayError::QueueClosed)?
    }

    /// Requests accepted and not yet resolved.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// The single consumer of the queue.
struct DrainLoop<T> {
    rx: mpsc::UnboundedReceiver<QueuedRequest>,
    queue: VecDeque<QueuedRequest>,
    limiter: RateLimiter,
    client: RetryingClient<T>,
    pending: Arc<AtomicUsize>,
    max_requeues: u32,
    clock: SharedClock,
}

impl<T: HttpTransport> DrainLoop<T> {
    async fn run(mut self, tick: Duration) {
        let mut ticker = tokio::time::interval(tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        let mut open = true;
        loop {
            tokio::select! {
                received = self.rx.recv(), if open => match received {
                    Some(item) => self.queue.push_back(item),
                    None => {
                        open = false;
                        debug!(remaining = self.queue.len(), "all queue handles dropped, draining");
                    }
                },
                _ = ticker.tick() => {}
            }

            if !open && self.queue.is_empty() {
                break;
            }
            self.step().await;
        }

        info!("request queue stopped");
    }

    /// Dispatch at most one request.
    async fn step(&mut self) {
        if self.queue.is_empty() {
            return;
        }

        let decision = self.limiter.check();
        if decision.is_denied() {
            let info = decision.info();
            debug!(
                reason = info.reason.map(|r| r.as_str()),
                retry_after_ms = info.retry_after.map(|d| d.as_millis() as u64),
                waiting = self.queue.len(),
                "upstream call deferred"
            );
            return;
        }

        let Some(mut item) = self.queue.pop_front() else {
            return;
        };
        item.attempt_count += 1;
        debug!(
            id = item.id,
            attempt = item.attempt_count,
            waited_ms = self.clock.now_ms().saturating_sub(item.enqueued_at),
            url = %item.request.url,
            "dispatching upstream request"
        );

        match self.client.call(&item.request, &mut self.limiter).await {
            Ok(response) => self.resolve(item, Ok(response)),
            Err(UpstreamError::RateLimited { retry_after }) if item.attempt_count <= self.max_requeues => {
                warn!(
                    id = item.id,
                    requeues = item.attempt_count,
                    retry_after_secs = retry_after.as_secs(),
                    "request rate limited, requeued at front"
                );
                self.limiter.poison();
                self.queue.push_front(item);
            }
            Err(err) => {
                if !matches!(err, UpstreamError::NotFound { .. }) {
                    error!(id = item.id, url = %item.request.url, error = %err, "upstream request failed");
                }
                self.resolve(item, Err(err.into()));
            }
        }
    }

    fn resolve(&self, item: QueuedRequest, result: Result<UpstreamResponse>) {
        self.pending.fetch_sub(1, Ordering::SeqCst);
        if item.responder.send(result).is_err() {
            debug!(id = item.id, "caller stopped waiting, response dropped");
        }
    }
}

//! Bounded retries around a single upstream call.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::UpstreamError;
use crate::limiter::RateLimiter;
use crate::upstream::{HttpTransport, UpstreamRequest, UpstreamResponse};

/// Retry behaviour of [`RetryingClient`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Attempts allowed for transient failures, the first one included.
    pub max_attempts: u32,
    /// Backoff before the second attempt; doubled for every later attempt.
    pub base_delay: Duration,
    /// Upper bound on a single backoff.
    pub max_backoff: Duration,
    /// Wait used on 429 when `Retry-After` is absent or unparsable.
    pub default_retry_after: Duration,
    /// 429 retries allowed per call before giving up.
    pub rate_limit_retries: u32,
    /// Timeout applied to every attempt.
    pub request_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            default_retry_after: Duration::from_secs(60),
            rate_limit_retries: 1,
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Set the attempt budget.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set the base backoff delay.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the backoff ceiling.
    pub fn with_max_backoff(mut self, max: Duration) -> Self {
        self.max_backoff = max;
        self
    }

    /// Set the fallback 429 wait.
    pub fn with_default_retry_after(mut self, wait: Duration) -> Self {
        self.default_retry_after = wait;
        self
    }

    /// Set how many 429s a call may absorb.
    pub fn with_rate_limit_retries(mut self, retries: u32) -> Self {
        self.rate_limit_retries = retries;
        self
    }

    /// Set the per-attempt timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Backoff after failed attempt number `attempt` (1-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_backoff)
    }
}

/// Upstream client applying a [`RetryPolicy`].
///
/// | Outcome | Action |
/// |---------|--------|
/// | 2xx | return the response |
/// | 404 | `NotFound`, no retry |
/// | 429 | poison the limiter, wait `Retry-After`, retry without using an attempt |
/// | 5xx, timeout, connection error | exponential backoff, up to `max_attempts` |
/// | other status | `Rejected`, no retry |
#[derive(Debug, Clone)]
pub struct RetryingClient<T> {
    transport: T,
    policy: RetryPolicy,
}

impl<T: HttpTransport> RetryingClient<T> {
    /// Create a client.
    pub fn new(transport: T, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    /// Retry policy in use.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Perform `request`, retrying as the policy allows.
    pub async fn call(
        &self,
        request: &UpstreamRequest,
        limiter: &mut RateLimiter,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let url = request.url.as_str();
        let mut attempt = 1;
        let mut rate_limit_retries = 0;

        loop {
            debug!(url, attempt, "upstream attempt");

            let failure = match self.transport.get(request, self.policy.request_timeout).await {
                Ok(response) if response.is_success() => return Ok(response),
                Ok(response) if response.status == 404 => {
                    debug!(url, "upstream resource not found");
                    return Err(UpstreamError::NotFound {
                        url: url.to_string(),
                    });
                }
                Ok(response) if response.status == 429 => {
                    let retry_after = response
                        .retry_after
                        .unwrap_or(self.policy.default_retry_after);
                    limiter.poison_for(retry_after);

                    if rate_limit_retries >= self.policy.rate_limit_retries {
                        warn!(url, retry_after_secs = retry_after.as_secs(), "upstream rate limit persisted");
                        return Err(UpstreamError::RateLimited { retry_after });
                    }
                    rate_limit_retries += 1;

                    warn!(url, retry_after_secs = retry_after.as_secs(), "upstream rate limited, waiting");
                    tokio::time::sleep(retry_after).await;
                    continue;
                }
                Ok(response) if response.status >= 500 => format!("status {}", response.status),
                Ok(response) => {
                    let message = response.error_message();
                    error!(url, status = response.status, %message, "upstream rejected request");
                    return Err(UpstreamError::Rejected {
                        status: response.status,
                        message,
                    });
                }
                Err(e) => e.to_string(),
            };

            if attempt >= max_attempts {
                error!(url, attempts = attempt, last = %failure, "upstream unavailable");
                return Err(UpstreamError::Unavailable {
                    attempts: attempt,
                    last: failure,
                });
            }

            let delay = self.policy.backoff_delay(attempt);
            warn!(
                url,
                attempt,
                error = %failure,
                backoff_ms = delay.as_millis() as u64,
                "transient upstream failure, backing off"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use parking_lot::Mutex;

    use super::*;
    use crate::error::TransportError;
    use crate::quota::RateQuota;

    type Reply = Result<UpstreamResponse, TransportError>;

    struct Scripted {
        replies: Mutex<VecDeque<Reply>>,
        calls: Mutex<u32>,
    }

    impl Scripted {
        fn new(replies: Vec<Reply>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock()
        }
    }

    impl HttpTransport for Scripted {
        async fn get(&self, _request: &UpstreamRequest, _timeout: Duration) -> Reply {
            *self.calls.lock() += 1;
            let mut replies = self.replies.lock();
            if replies.len() > 1 {
                replies.pop_front().unwrap()
            } else {
                replies.front().cloned().unwrap()
            }
        }
    }

    fn client(replies: Vec<Reply>) -> RetryingClient<Scripted> {
        RetryingClient::new(Scripted::new(replies), RetryPolicy::default())
    }

    fn request() -> UpstreamRequest {
        UpstreamRequest::get("https://euw1.api.riotgames.com/test")
    }

    #[test]
    fn test_backoff_delay() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_delay(1), Duration::from_secs(1));
        assert_eq!(policy.backoff_delay(2), Duration::from_secs(2));
        assert_eq!(policy.backoff_delay(3), Duration::from_secs(4));
        assert_eq!(policy.backoff_delay(10), Duration::from_secs(30));
        assert_eq!(policy.backoff_delay(64), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_then_success() {
        let client = client(vec![
            Ok(UpstreamResponse::new(503, "")),
            Err(TransportError::Timeout(Duration::from_secs(10))),
            Ok(UpstreamResponse::new(200, "{}")),
        ]);
        let mut limiter = RateLimiter::new(&RateQuota::default());

        let start = tokio::time::Instant::now();
        let response = client.call(&request(), &mut limiter).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(client.transport().calls(), 3);
        // 1s + 2s of backoff
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_is_not_retried() {
        let client = client(vec![Ok(UpstreamResponse::new(
            400,
            r#"{"status":{"message":"Bad Request - Exception decrypting","status_code":400}}"#,
        ))]);
        let mut limiter = RateLimiter::new(&RateQuota::default());

        let err = client.call(&request(), &mut limiter).await.unwrap_err();
        assert_eq!(
            err,
            UpstreamError::Rejected {
                status: 400,
                message: "Bad Request - Exception decrypting".into()
            }
        );
        assert_eq!(client.transport().calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_waits_retry_after() {
        let client = client(vec![
            Ok(UpstreamResponse::new(429, "").with_retry_after(Duration::from_secs(7))),
            Ok(UpstreamResponse::new(200, "[]")),
        ]);
        let mut limiter = RateLimiter::new(&RateQuota::default());

        let start = tokio::time::Instant::now();
        client.call(&request(), &mut limiter).await.unwrap();

        assert_eq!(start.elapsed(), Duration::from_secs(7));
        assert_eq!(client.transport().calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_without_header_uses_default() {
        let client = client(vec![Ok(UpstreamResponse::new(429, ""))]);
        let mut limiter = RateLimiter::new(&RateQuota::default());

        let start = tokio::time::Instant::now();
        let err = client.call(&request(), &mut limiter).await.unwrap_err();

        assert_eq!(
            err,
            UpstreamError::RateLimited {
                retry_after: Duration::from_secs(60)
            }
        );
        assert_eq!(start.elapsed(), Duration::from_secs(60));
        assert_eq!(client.transport().calls(), 2);
        assert!(limiter.is_poisoned());
    }
}

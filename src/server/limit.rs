//! Per-client admission on the `/api` routes.
//!
//! Each client gets its own fixed-window [`RateLimiter`], keyed by address.
//! Denied requests never reach the handler, so they cost no upstream call.

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::response::{IntoResponse, Response};
use dashmap::DashMap;
use http::Request;
use parking_lot::Mutex;
use tower::{Layer, Service};
use tracing::{debug, warn};

use crate::clock::{SharedClock, SystemClock};
use crate::decision::Decision;
use crate::error::RelayError;
use crate::headers::RelayHeaders;
use crate::limiter::RateLimiter;
use crate::quota::RateQuota;

use super::with_headers;

/// Tracked clients above which idle limiters are dropped.
const PRUNE_THRESHOLD: usize = 10_000;

/// Derives the client key of a request.
///
/// With a header configured, the first address it lists wins; otherwise the
/// peer address from [`ConnectInfo`] is used. Requests with neither share the
/// `ip:unknown` budget.
#[derive(Debug, Clone, Default)]
pub struct ClientKey {
    ip_header: Option<String>,
}

impl ClientKey {
    /// Key by peer address.
    pub fn new() -> Self {
        Self::default()
    }

    /// Key by the first address in `header`, e.g. `x-forwarded-for`.
    pub fn with_header(header: impl Into<String>) -> Self {
        Self {
            ip_header: Some(header.into()),
        }
    }

    /// Key for `request`.
    pub fn extract<B>(&self, request: &Request<B>) -> String {
        let forwarded = self.ip_header.as_deref().and_then(|header| {
            request
                .headers()
                .get(header)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.split(',').next())
                .map(str::trim)
                .filter(|ip| !ip.is_empty())
        });
        if let Some(ip) = forwarded {
            return format!("ip:{ip}");
        }

        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| format!("ip:{}", addr.ip()))
            .unwrap_or_else(|| "ip:unknown".to_string())
    }
}

/// One [`RateLimiter`] per client.
pub struct ClientLimiter {
    quota: RateQuota,
    clients: DashMap<String, RateLimiter>,
    prune_lock: Mutex<()>,
    clock: SharedClock,
}

impl std::fmt::Debug for ClientLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientLimiter")
            .field("quota", &self.quota)
            .field("clients", &self.clients.len())
            .finish()
    }
}

impl ClientLimiter {
    /// Create a client limiter on the system clock.
    pub fn new(quota: RateQuota) -> Self {
        Self::with_clock(quota, SystemClock::shared())
    }

    /// Create a client limiter on a custom clock.
    pub fn with_clock(quota: RateQuota, clock: SharedClock) -> Self {
        Self {
            quota,
            clients: DashMap::new(),
            prune_lock: Mutex::new(()),
            clock,
        }
    }

    /// Admit one request from `client` if its budget allows.
    pub fn check(&self, client: &str) -> Decision {
        if self.clients.len() >= PRUNE_THRESHOLD {
            self.prune();
        }

        let mut limiter = self
            .clients
            .entry(client.to_string())
            .or_insert_with(|| RateLimiter::with_clock(&self.quota, self.clock.clone()));
        limiter.check()
    }

    /// Drop limiters whose window has run out. Returns how many were removed.
    ///
    /// Only one caller prunes at a time; concurrent callers return 0.
    pub fn prune(&self) -> usize {
        let Some(_guard) = self.prune_lock.try_lock() else {
            return 0;
        };

        let before = self.clients.len();
        self.clients.retain(|_, limiter| !limiter.is_idle());
        let removed = before.saturating_sub(self.clients.len());
        debug!(removed, remaining = self.clients.len(), "idle client limiters pruned");
        removed
    }

    /// Clients currently tracked.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether no client is tracked.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// The per-client quota.
    pub fn quota(&self) -> &RateQuota {
        &self.quota
    }
}

/// Tower layer applying a [`ClientLimiter`].
///
/// # Example
///
/// ```ignore
/// use arena_relay::server::{ClientKey, ClientLimitLayer};
///
/// let layer = ClientLimitLayer::new(default_client_quota())
///     .with_key(ClientKey::with_header("x-forwarded-for"));
/// let api = Router::new().route("/api/ping", get(ping)).route_layer(layer);
/// ```
#[derive(Debug, Clone)]
pub struct ClientLimitLayer {
    limiter: Arc<ClientLimiter>,
    key: ClientKey,
}

impl ClientLimitLayer {
    /// Create a layer keyed by peer address.
    pub fn new(quota: RateQuota) -> Self {
        Self::from_limiter(Arc::new(ClientLimiter::new(quota)))
    }

    /// Create a layer around an existing limiter.
    pub fn from_limiter(limiter: Arc<ClientLimiter>) -> Self {
        Self {
            limiter,
            key: ClientKey::new(),
        }
    }

    /// Set how clients are identified.
    pub fn with_key(mut self, key: ClientKey) -> Self {
        self.key = key;
        self
    }

    /// The shared limiter.
    pub fn limiter(&self) -> &Arc<ClientLimiter> {
        &self.limiter
    }
}

impl<S> Layer<S> for ClientLimitLayer {
    type Service = ClientLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ClientLimitService {
            inner,
            limiter: self.limiter.clone(),
            key: self.key.clone(),
        }
    }
}

/// Service produced by [`ClientLimitLayer`].
#[derive(Debug, Clone)]
pub struct ClientLimitService<S> {
    inner: S,
    limiter: Arc<ClientLimiter>,
    key: ClientKey,
}

impl<S> Service<Request<Body>> for ClientLimitService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let client = self.key.extract(&request);
        let decision = self.limiter.check(&client);
        let headers = RelayHeaders::new().limit(decision.info());

        if decision.is_denied() {
            let retry_after = decision
                .info()
                .retry_after
                .unwrap_or_else(|| self.limiter.quota().window());
            warn!(
                %client,
                path = %request.uri().path(),
                retry_after_secs = retry_after.as_secs(),
                "client request budget exhausted"
            );
            let response = RelayError::TooManyRequests { retry_after }.into_response();
            return Box::pin(async move { Ok(with_headers(response, headers)) });
        }

        // The clone may not be ready; keep the one poll_ready was called on.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        Box::pin(async move {
            let response = inner.call(request).await?;
            Ok(with_headers(response, headers))
        })
    }
}

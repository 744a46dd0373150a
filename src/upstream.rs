//! HTTP transport to the Riot API.
//!
//! [`HttpTransport`] performs exactly one GET and reports what came back. It
//! never retries and never interprets status codes; that is the job of
//! [`RetryingClient`](crate::retry::RetryingClient).

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::trace;

use crate::error::{ConfigError, Result, TransportError, UpstreamError};
use crate::headers::names;

/// Outbound GET request.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamRequest {
    /// Absolute URL.
    pub url: String,
    /// Extra request headers.
    pub headers: Vec<(String, String)>,
}

impl UpstreamRequest {
    /// Create a GET request for `url`.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }

    /// Add a request header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Response received from the upstream, whatever its status.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamResponse {
    /// HTTP status code.
    pub status: u16,
    /// Parsed `Retry-After` header.
    pub retry_after: Option<Duration>,
    /// Raw response body.
    pub body: String,
}

impl UpstreamResponse {
    /// Create a response without a retry hint.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            retry_after: None,
            body: body.into(),
        }
    }

    /// Attach a retry hint.
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> std::result::Result<T, UpstreamError> {
        serde_json::from_str(&self.body).map_err(|e| UpstreamError::InvalidResponse(e.to_string()))
    }

    /// Human-readable reason for a failed response.
    ///
    /// Riot error bodies look like `{"status": {"message": "...", "status_code": 403}}`;
    /// anything else falls back to the canonical reason phrase.
    pub fn error_message(&self) -> String {
        #[derive(Deserialize)]
        struct ErrorBody {
            status: ErrorStatus,
        }

        #[derive(Deserialize)]
        struct ErrorStatus {
            message: String,
        }

        if let Ok(body) = serde_json::from_str::<ErrorBody>(&self.body) {
            return body.status.message;
        }

        StatusCode::from_u16(self.status)
            .ok()
            .and_then(|status| status.canonical_reason())
            .unwrap_or("Unknown status")
            .to_string()
    }
}

/// A single-shot HTTP GET.
///
/// Implementations must be thread-safe (`Send + Sync`). A response with any
/// status is `Ok`; `Err` means no response was received at all.
pub trait HttpTransport: Send + Sync + 'static {
    /// Perform one GET, giving up after `timeout`.
    fn get(
        &self,
        request: &UpstreamRequest,
        timeout: Duration,
    ) -> impl Future<Output = std::result::Result<UpstreamResponse, TransportError>> + Send;
}

impl<T: HttpTransport + ?Sized> HttpTransport for Arc<T> {
    async fn get(
        &self,
        request: &UpstreamRequest,
        timeout: Duration,
    ) -> std::result::Result<UpstreamResponse, TransportError> {
        (**self).get(request, timeout).await
    }
}

/// Production transport backed by `reqwest`.
///
/// Sends the API key in the `X-Riot-Token` header of every request.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
    api_key: String,
}

impl std::fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestTransport").finish_non_exhaustive()
    }
}

impl ReqwestTransport {
    /// Create a transport authenticating with `api_key`.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("arena-relay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                name: "http_client".to_string(),
                value: e.to_string(),
            })?;

        Ok(Self::with_client(client, api_key))
    }

    /// Create a transport around an existing client.
    pub fn with_client(client: Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
        }
    }
}

fn classify(err: reqwest::Error, timeout: Duration) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(timeout)
    } else {
        TransportError::Connection(err.to_string())
    }
}

impl HttpTransport for ReqwestTransport {
    async fn get(
        &self,
        request: &UpstreamRequest,
        timeout: Duration,
    ) -> std::result::Result<UpstreamResponse, TransportError> {
        let mut builder = self
            .client
            .get(&request.url)
            .timeout(timeout)
            .header(names::RIOT_TOKEN, &self.api_key);

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(|e| classify(e, timeout))?;

        let status = response.status().as_u16();
        let retry_after = parse_retry_after(
            response
                .headers()
                .get(names::RETRY_AFTER)
                .and_then(|v| v.to_str().ok()),
        );
        let body = response.text().await.map_err(|e| classify(e, timeout))?;

        trace!(url = %request.url, status, "upstream responded");

        Ok(UpstreamResponse {
            status,
            retry_after,
            body,
        })
    }
}

/// Parse a `Retry-After` header value (seconds).
///
/// Returns `None` when the header is missing or not a whole number of seconds.
pub fn parse_retry_after(header_value: Option<&str>) -> Option<Duration> {
    let value = header_value?;
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

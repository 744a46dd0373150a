//! Error types for relay operations.
//!
//! Errors are layered: [`TransportError`] describes a single failed HTTP
//! exchange, [`UpstreamError`] is the retry layer's classification of a whole
//! call, and [`RelayError`] is what callers of the queue and the player lookup
//! see. Cache failures ([`CacheError`]) are absorbed by the cache and only
//! surface from the durable store implementations themselves.

use std::time::Duration;
use thiserror::Error;

/// Result type for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Main error type surfaced to callers.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The upstream resource does not exist (HTTP 404). Never retried.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Transport failures or 5xx responses persisted after every retry.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The upstream kept answering 429.
    #[error("Rate limited by upstream, retry after {retry_after:?}")]
    RateLimited {
        /// How long the upstream asked us to wait.
        retry_after: Duration,
    },

    /// The local request queue is full.
    #[error("Request queue is full ({capacity} pending), retry after {retry_after:?}")]
    Backpressure {
        /// Configured queue capacity.
        capacity: usize,
        /// Rough estimate of when a slot frees up.
        retry_after: Duration,
    },

    /// The upstream refused the request (400, 401, 403, ...).
    #[error("Upstream rejected request with status {status}: {message}")]
    Rejected {
        /// HTTP status code returned by the upstream.
        status: u16,
        /// Message extracted from the upstream error body.
        message: String,
    },

    /// The upstream answered 2xx with a body we could not decode.
    #[error("Invalid upstream response: {0}")]
    InvalidResponse(String),

    /// Unknown platform region code.
    #[error("Unknown region: {0}")]
    InvalidRegion(String),

    /// A client exceeded its inbound request budget.
    #[error("Too many requests, retry after {retry_after:?}")]
    TooManyRequests {
        /// Time until the client's window reopens.
        retry_after: Duration,
    },

    /// No route matches the requested path.
    #[error("Endpoint not found: {0}")]
    UnknownEndpoint(String),

    /// The queue's drain loop has stopped.
    #[error("Request queue is closed")]
    QueueClosed,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Durable cache tier error.
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

impl RelayError {
    /// Stable snake_case name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::UpstreamUnavailable(_) => "upstream_unavailable",
            Self::RateLimited { .. } => "rate_limited",
            Self::Backpressure { .. } => "backpressure",
            Self::Rejected { .. } => "rejected",
            Self::InvalidResponse(_) => "invalid_response",
            Self::InvalidRegion(_) => "invalid_region",
            Self::TooManyRequests { .. } => "too_many_requests",
            Self::UnknownEndpoint(_) => "unknown_endpoint",
            Self::QueueClosed => "queue_closed",
            Self::Config(_) => "config",
            Self::Cache(_) => "cache",
        }
    }

    /// Retry hint for errors the caller may retry later.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => Some(*retry_after),
            Self::Backpressure { retry_after, .. } => Some(*retry_after),
            Self::TooManyRequests { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

/// Classification of a failed upstream call, produced by the retry layer.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum UpstreamError {
    /// HTTP 404.
    #[error("Resource not found: {url}")]
    NotFound {
        /// The URL that was requested.
        url: String,
    },

    /// Non-retryable 4xx other than 404 and 429.
    #[error("Upstream rejected request with status {status}: {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Upstream error message, or the canonical reason phrase.
        message: String,
    },

    /// HTTP 429 persisted after the explicit-delay retries.
    #[error("Upstream rate limit hit, retry after {retry_after:?}")]
    RateLimited {
        /// Last retry hint observed.
        retry_after: Duration,
    },

    /// Every attempt failed transiently.
    #[error("Upstream unavailable after {attempts} attempt(s): {last}")]
    Unavailable {
        /// Attempts made.
        attempts: u32,
        /// Last observed failure.
        last: String,
    },

    /// A 2xx body that could not be decoded.
    #[error("Invalid upstream response: {0}")]
    InvalidResponse(String),
}

impl From<UpstreamError> for RelayError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::NotFound { url } => Self::NotFound(url),
            UpstreamError::Rejected { status, message } => Self::Rejected { status, message },
            UpstreamError::RateLimited { retry_after } => Self::RateLimited { retry_after },
            err @ UpstreamError::Unavailable { .. } => Self::UpstreamUnavailable(err.to_string()),
            UpstreamError::InvalidResponse(message) => Self::InvalidResponse(message),
        }
    }
}

/// A single HTTP exchange that produced no response.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    /// The request exceeded its timeout.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Connection, TLS or body read failure.
    #[error("Connection failed: {0}")]
    Connection(String),
}

/// Durable cache tier errors.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Generic store operation failed.
    #[error("{message}")]
    OperationFailed {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Connection pool exhausted.
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// The store could not be reached at all.
    #[error("Cache store unavailable: {0}")]
    Unavailable(String),
}

impl CacheError {
    /// Create a new operation failed error.
    pub fn operation_failed(message: impl Into<String>, retryable: bool) -> Self {
        Self::OperationFailed {
            message: message.into(),
            retryable,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::OperationFailed { retryable, .. } => *retryable,
            Self::PoolExhausted => true,
            _ => false,
        }
    }
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid quota configuration.
    #[error("Invalid quota: {0}")]
    InvalidQuota(String),

    /// Missing required configuration.
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    /// A value could not be parsed.
    #[error("Invalid value for {name}: {value:?}")]
    InvalidValue {
        /// Variable or field name.
        name: String,
        /// Offending value.
        value: String,
    },

    /// The Riot API key is malformed.
    #[error("Invalid API key: {0}")]
    InvalidApiKey(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_error_retryable() {
        let err = CacheError::operation_failed("test", true);
        assert!(err.is_retryable());

        let err = CacheError::operation_failed("test", false);
        assert!(!err.is_retryable());

        assert!(CacheError::PoolExhausted.is_retryable());
        assert!(!CacheError::Serialization("bad".into()).is_retryable());
    }

    #[test]
    fn test_upstream_error_classification() {
        let err: RelayError = UpstreamError::NotFound {
            url: "https://example/x".into(),
        }
        .into();
        assert_eq!(err.kind(), "not_found");

        let err: RelayError = UpstreamError::Unavailable {
            attempts: 3,
            last: "status 503".into(),
        }
        .into();
        assert_eq!(err.kind(), "upstream_unavailable");
        assert!(err.to_string().contains("3 attempt(s)"));

        let err: RelayError = UpstreamError::RateLimited {
            retry_after: Duration::from_secs(7),
        }
        .into();
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
    }

    #[test]
    fn test_error_display() {
        let err = RelayError::Backpressure {
            capacity: 100,
            retry_after: Duration::from_secs(300),
        };
        assert!(err.to_string().contains("100 pending"));
        assert_eq!(err.kind(), "backpressure");

        let err = RelayError::InvalidRegion("mars1".into());
        assert_eq!(err.to_string(), "Unknown region: mars1");
        assert!(err.retry_after().is_none());
    }
}

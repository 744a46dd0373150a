//! Axum HTTP surface.
//!
//! | Route | Response |
//! |-------|----------|
//! | `GET /` | API description |
//! | `GET /api/player/{game_name}/{tag_line}/{region}` | [`PlayerRecord`] with `X-Cache` |
//! | `GET /api/account/{game_name}/{tag_line}/{region}` | [`Account`](crate::player::Account) with `X-Cache` |
//! | `GET /health` | `{ status, queue_pending, timestamp }` |
//!
//! The `/api` routes sit behind a per-client budget ([`ClientLimitLayer`]).
//! Every response carries permissive CORS headers, and unknown paths get a
//! JSON 404.
//!
//! # Example
//!
//! ```ignore
//! use arena_relay::server::router;
//!
//! let app = router(Arc::new(lookup))
//!     .into_make_service_with_connect_info::<SocketAddr>();
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, app).await?;
//! ```

mod limit;

pub use limit::{ClientKey, ClientLimitLayer, ClientLimitService, ClientLimiter};

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use http::{HeaderValue, StatusCode, Uri};
use serde::Serialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::warn;

use crate::cache::DurableStore;
use crate::config::{RelayConfig, default_client_quota};
use crate::error::RelayError;
use crate::headers::{CacheStatus, RelayHeaders};
use crate::player::{Lookup, Platform, PlayerLookup, PlayerRecord};

/// Build the relay router with the default per-client budget.
pub fn router<D: DurableStore>(lookup: Arc<PlayerLookup<D>>) -> Router {
    router_with(lookup, ClientLimitLayer::new(default_client_quota()))
}

/// Build the relay router with the client budget from `config`.
pub fn router_from_config<D: DurableStore>(
    lookup: Arc<PlayerLookup<D>>,
    config: &RelayConfig,
) -> Router {
    let key = match &config.client_ip_header {
        Some(header) => ClientKey::with_header(header.clone()),
        None => ClientKey::new(),
    };
    router_with(
        lookup,
        ClientLimitLayer::new(config.client_quota.clone()).with_key(key),
    )
}

/// Build the relay router around a custom client limit layer.
pub fn router_with<D: DurableStore>(
    lookup: Arc<PlayerLookup<D>>,
    client_limit: ClientLimitLayer,
) -> Router {
    let api = Router::new()
        .route("/api/player/{game_name}/{tag_line}/{region}", get(player::<D>))
        .route("/api/account/{game_name}/{tag_line}/{region}", get(account::<D>))
        .route_layer(client_limit);

    Router::new()
        .route("/", get(index))
        .route("/health", get(health::<D>))
        .merge(api)
        .fallback(unknown_endpoint)
        .layer(CorsLayer::permissive())
        .with_state(lookup)
}

type RiotIdPath = Path<(String, String, String)>;

async fn player<D: DurableStore>(
    State(lookup): State<Arc<PlayerLookup<D>>>,
    Path((game_name, tag_line, region)): RiotIdPath,
) -> Result<Response, RelayError> {
    let result: Lookup<PlayerRecord> = lookup.lookup(&game_name, &tag_line, &region).await?;
    Ok(with_headers(
        Json(result.value).into_response(),
        RelayHeaders::new()
            .cache(CacheStatus::from(result.from_cache))
            .queue_pending(lookup.queue().pending()),
    ))
}

async fn account<D: DurableStore>(
    State(lookup): State<Arc<PlayerLookup<D>>>,
    Path((game_name, tag_line, region)): RiotIdPath,
) -> Result<Response, RelayError> {
    let result = lookup.account(&game_name, &tag_line, &region).await?;
    Ok(with_headers(
        Json(result.value).into_response(),
        RelayHeaders::new()
            .cache(CacheStatus::from(result.from_cache))
            .queue_pending(lookup.queue().pending()),
    ))
}

async fn index() -> Json<serde_json::Value> {
    let regions: Vec<&str> = Platform::ALL.iter().map(|p| p.code()).collect();
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "GET /api/player/{game_name}/{tag_line}/{region}": "account, profile and masteries",
            "GET /api/account/{game_name}/{tag_line}/{region}": "account by Riot ID",
            "GET /health": "relay status",
        },
        "examples": {
            "player": "/api/player/Hide%20on%20bush/KR1/kr",
            "account": "/api/account/Faker/KR1/kr",
        },
        "regions": regions,
    }))
}

async fn unknown_endpoint(uri: Uri) -> RelayError {
    RelayError::UnknownEndpoint(uri.path().to_string())
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    queue_pending: usize,
    timestamp: String,
}

async fn health<D: DurableStore>(State(lookup): State<Arc<PlayerLookup<D>>>) -> Json<Health> {
    Json(Health {
        status: "ok",
        queue_pending: lookup.queue().pending(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

pub(crate) fn with_headers(mut response: Response, headers: RelayHeaders) -> Response {
    for (name, value) in headers.to_vec() {
        if let Ok(value) = HeaderValue::from_str(&value) {
            response.headers_mut().insert(name, value);
        }
    }
    response
}

/// HTTP status for an error.
///
/// A 401 from the upstream means our own key is bad, so it is reported as a
/// server error rather than passed through.
pub fn status_for(err: &RelayError) -> StatusCode {
    match err {
        RelayError::NotFound(_) | RelayError::UnknownEndpoint(_) => StatusCode::NOT_FOUND,
        RelayError::InvalidRegion(_) => StatusCode::BAD_REQUEST,
        RelayError::Rejected { status: 401, .. } => StatusCode::INTERNAL_SERVER_ERROR,
        RelayError::Rejected { status, .. } => {
            StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
        }
        RelayError::RateLimited { .. } | RelayError::TooManyRequests { .. } => {
            StatusCode::TOO_MANY_REQUESTS
        }
        RelayError::Backpressure { .. } => StatusCode::SERVICE_UNAVAILABLE,
        RelayError::UpstreamUnavailable(_)
        | RelayError::InvalidResponse(_)
        | RelayError::QueueClosed => StatusCode::BAD_GATEWAY,
        RelayError::Config(_) | RelayError::Cache(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        if status.is_server_error() {
            warn!(kind = self.kind(), error = %self, "request failed");
        }

        let mut headers = RelayHeaders::new();
        if let Some(retry_after) = self.retry_after() {
            headers = headers.retry_after(retry_after);
        }

        let body = Json(json!({
            "error": self.to_string(),
            "kind": self.kind(),
        }));
        with_headers((status, body).into_response(), headers)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (RelayError::NotFound("x".into()), 404),
            (RelayError::InvalidRegion("mars1".into()), 400),
            (RelayError::Rejected { status: 400, message: "bad".into() }, 400),
            (RelayError::Rejected { status: 401, message: "key".into() }, 500),
            (RelayError::Rejected { status: 403, message: "forbidden".into() }, 403),
            (RelayError::RateLimited { retry_after: Duration::from_secs(5) }, 429),
            (
                RelayError::Backpressure { capacity: 100, retry_after: Duration::from_secs(9) },
                503,
            ),
            (RelayError::UpstreamUnavailable("down".into()), 502),
            (RelayError::InvalidResponse("eof".into()), 502),
            (RelayError::QueueClosed, 502),
            (RelayError::TooManyRequests { retry_after: Duration::from_secs(60) }, 429),
            (RelayError::UnknownEndpoint("/nope".into()), 404),
        ];

        for (err, expected) in cases {
            assert_eq!(status_for(&err).as_u16(), expected, "{err}");
        }
    }

    #[test]
    fn test_error_response_headers() {
        let response = RelayError::RateLimited {
            retry_after: Duration::from_secs(5),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get("retry-after").unwrap(), "5");

        let response = RelayError::NotFound("x".into()).into_response();
        assert!(response.headers().get("retry-after").is_none());
    }
}

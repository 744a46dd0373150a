//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::time::Duration;

use arena_relay::cache::{CacheEntry, DurableStore};
use arena_relay::error::{CacheError, Result, TransportError};
use arena_relay::upstream::{HttpTransport, UpstreamRequest, UpstreamResponse};
use parking_lot::Mutex;

pub type Reply = std::result::Result<UpstreamResponse, TransportError>;

/// Transport answering from per-URL scripts.
///
/// A route matches when its pattern is a substring of the URL; the first
/// matching route wins. Each route plays its replies in order and repeats the
/// last one. Unmatched URLs get a 404.
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<Vec<(String, VecDeque<Reply>)>>,
    calls: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, pattern: &str, replies: Vec<Reply>) -> Self {
        assert!(!replies.is_empty(), "route {pattern} needs at least one reply");
        self.routes
            .lock()
            .push((pattern.to_string(), replies.into_iter().collect()));
        self
    }

    pub fn json(self, pattern: &str, body: &str) -> Self {
        self.route(pattern, vec![ok(body)])
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

impl HttpTransport for MockTransport {
    async fn get(&self, request: &UpstreamRequest, _timeout: Duration) -> Reply {
        self.calls.lock().push(request.url.clone());

        let mut routes = self.routes.lock();
        let Some((_, replies)) = routes
            .iter_mut()
            .find(|(pattern, _)| request.url.contains(pattern.as_str()))
        else {
            return Ok(UpstreamResponse::new(404, r#"{"status":{"message":"Data not found","status_code":404}}"#));
        };

        if replies.len() > 1 {
            replies.pop_front().expect("non-empty script")
        } else {
            replies.front().cloned().expect("non-empty script")
        }
    }
}

pub fn ok(body: &str) -> Reply {
    Ok(UpstreamResponse::new(200, body))
}

pub fn status(code: u16) -> Reply {
    Ok(UpstreamResponse::new(code, ""))
}

pub fn rate_limited(retry_after_secs: u64) -> Reply {
    Ok(UpstreamResponse::new(429, "").with_retry_after(Duration::from_secs(retry_after_secs)))
}

/// Durable tier that fails every operation.
#[derive(Debug, Default)]
pub struct FailingStore;

impl DurableStore for FailingStore {
    async fn put(&self, _entry: CacheEntry) -> Result<()> {
        Err(CacheError::Unavailable("connection refused".into()).into())
    }

    async fn get(&self, _key: &str) -> Result<Option<CacheEntry>> {
        Err(CacheError::Unavailable("connection refused".into()).into())
    }

    async fn delete_expired(&self, _now: u64) -> Result<u64> {
        Err(CacheError::PoolExhausted.into())
    }
}

pub const ACCOUNT: &str = r#"{"puuid":"puuid-ana","gameName":"Ana","tagLine":"EUW"}"#;

pub const SUMMONER: &str =
    r#"{"puuid":"puuid-ana","profileIconId":4568,"revisionDate":1700000000000,"summonerLevel":312}"#;

pub const MASTERIES: &str = r#"[
    {"puuid":"puuid-ana","championId":157,"championLevel":7,"championPoints":250000,"lastPlayTime":1700000000000,"championPointsSinceLastLevel":1000,"championPointsUntilNextLevel":0,"tokensEarned":0},
    {"puuid":"puuid-ana","championId":103,"championLevel":5,"championPoints":30000,"lastPlayTime":1690000000000,"championPointsSinceLastLevel":8400,"championPointsUntilNextLevel":0,"tokensEarned":1},
    {"puuid":"puuid-ana","championId":64,"championLevel":2,"championPoints":2500,"lastPlayTime":1680000000000,"championPointsSinceLastLevel":700,"championPointsUntilNextLevel":3500,"tokensEarned":0}
]"#;

/// Transport serving the three lookups for Ana#EUW.
pub fn riot_fixture() -> MockTransport {
    MockTransport::new()
        .json("/riot/account/v1/accounts/by-riot-id/Ana/EUW", ACCOUNT)
        .json("/lol/summoner/v4/summoners/by-puuid/puuid-ana", SUMMONER)
        .json("/lol/champion-mastery/v4/champion-masteries/by-puuid/puuid-ana", MASTERIES)
}

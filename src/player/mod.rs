//! Player lookups.
//!
//! [`PlayerLookup`] composes the account, profile and mastery calls into one
//! cached operation. All upstream traffic goes through the shared
//! [`RequestQueue`].

mod model;
mod region;

pub use model::{Account, Mastery, PlayerRecord, Profile};
pub use region::{Endpoints, Platform, RegionalRoute};

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::cache::{CacheStore, DurableStore};
use crate::config::RelayConfig;
use crate::error::Result;
use crate::limiter::RateLimiter;
use crate::queue::RequestQueue;
use crate::retry::RetryingClient;
use crate::upstream::{HttpTransport, UpstreamRequest};

use model::{MasteryDto, SummonerDto};

/// A lookup result and where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Lookup<T> {
    /// The looked-up value.
    pub value: T,
    /// Whether it was served from the cache.
    pub from_cache: bool,
}

impl<T> Lookup<T> {
    fn cached(value: T) -> Self {
        Self {
            value,
            from_cache: true,
        }
    }

    fn fresh(value: T) -> Self {
        Self {
            value,
            from_cache: false,
        }
    }

    /// Unwrap the value.
    pub fn into_value(self) -> T {
        self.value
    }
}

/// Cache key of a player record.
///
/// Riot IDs are case-insensitive, so both parts are lower-cased.
pub fn player_key(platform: Platform, game_name: &str, tag_line: &str) -> String {
    format!(
        "player:{}:{}#{}",
        platform.code(),
        game_name.to_lowercase(),
        tag_line.to_lowercase()
    )
}

/// Cache key of an account.
pub fn account_key(route: RegionalRoute, game_name: &str, tag_line: &str) -> String {
    format!(
        "account:{}:{}#{}",
        route.code(),
        game_name.to_lowercase(),
        tag_line.to_lowercase()
    )
}

/// Cached, queued player lookups.
///
/// # Example
///
/// ```ignore
/// use arena_relay::prelude::*;
///
/// let config = RelayConfig::from_env()?;
/// let transport = ReqwestTransport::new(config.api_key.clone())?;
/// let lookup = PlayerLookup::from_config(&config, transport, MemoryStore::new());
///
/// let player = lookup.lookup("Ana", "EUW", "euw1").await?;
/// println!("level {}", player.value.profile.level);
/// ```
pub struct PlayerLookup<D> {
    queue: RequestQueue,
    cache: Arc<CacheStore<D>>,
    endpoints: Endpoints,
    ttl: Duration,
}

impl<D> std::fmt::Debug for PlayerLookup<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerLookup")
            .field("queue", &self.queue)
            .field("endpoints", &self.endpoints)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl<D: DurableStore> PlayerLookup<D> {
    /// Create a lookup over an existing queue and cache.
    pub fn new(
        queue: RequestQueue,
        cache: Arc<CacheStore<D>>,
        endpoints: Endpoints,
        ttl: Duration,
    ) -> Self {
        Self {
            queue,
            cache,
            endpoints,
            ttl,
        }
    }

    /// Build the whole stack from configuration.
    ///
    /// Spawns the queue's drain loop, so it must be called inside a tokio
    /// runtime. The cache sweeper is not started; see
    /// [`CacheStore::spawn_sweeper`].
    pub fn from_config<T: HttpTransport>(config: &RelayConfig, transport: T, store: D) -> Self {
        let client = RetryingClient::new(transport, config.retry.clone());
        let limiter = RateLimiter::new(&config.quota);
        let queue = RequestQueue::spawn(client, limiter, config.queue.clone());
        let cache = CacheStore::with_config(
            store,
            config.cache.clone(),
            crate::clock::SystemClock::shared(),
        );

        Self::new(queue, Arc::new(cache), config.endpoints.clone(), config.cache.ttl)
    }

    /// The shared request queue.
    pub fn queue(&self) -> &RequestQueue {
        &self.queue
    }

    /// The response cache.
    pub fn cache(&self) -> &Arc<CacheStore<D>> {
        &self.cache
    }

    /// Look up a player by Riot ID on `region`.
    ///
    /// A miss costs three upstream calls: account, profile, masteries. Any
    /// failure aborts the lookup and nothing is cached, the account included.
    pub async fn lookup(
        &self,
        game_name: &str,
        tag_line: &str,
        region: &str,
    ) -> Result<Lookup<PlayerRecord>> {
        let platform: Platform = region.parse()?;
        let key = player_key(platform, game_name, tag_line);

        if let Some(record) = self.cache.get_json::<PlayerRecord>(&key).await {
            info!(%key, "player served from cache");
            return Ok(Lookup::cached(record));
        }

        info!(%key, "loading player from upstream");
        let route = platform.regional();
        let account = self.fetch_account(route, game_name, tag_line).await?;

        let summoner: SummonerDto = self
            .fetch_json(self.endpoints.profile_url(platform, &account.puuid))
            .await?;
        let masteries: Vec<MasteryDto> = self
            .fetch_json(self.endpoints.mastery_url(platform, &account.puuid))
            .await?;

        let record = PlayerRecord {
            account,
            profile: summoner.into(),
            masteries: masteries.into_iter().map(Into::into).collect(),
            region: platform,
            loaded_at: Utc::now(),
        };

        self.cache.set_json(&key, &record, self.ttl).await;
        self.cache
            .set_json(&account_key(route, game_name, tag_line), &record.account, self.ttl)
            .await;
        info!(
            %key,
            level = record.profile.level,
            masteries = record.masteries.len(),
            "player loaded"
        );

        Ok(Lookup::fresh(record))
    }

    /// Look up only the account behind a Riot ID.
    pub async fn account(
        &self,
        game_name: &str,
        tag_line: &str,
        region: &str,
    ) -> Result<Lookup<Account>> {
        let platform: Platform = region.parse()?;
        let route = platform.regional();
        let key = account_key(route, game_name, tag_line);

        if let Some(account) = self.cache.get_json::<Account>(&key).await {
            debug!(%key, "account served from cache");
            return Ok(Lookup::cached(account));
        }

        let account = self.fetch_account(route, game_name, tag_line).await?;
        self.cache.set_json(&key, &account, self.ttl).await;
        Ok(Lookup::fresh(account))
    }

    async fn fetch_account(
        &self,
        route: RegionalRoute,
        game_name: &str,
        tag_line: &str,
    ) -> Result<Account> {
        let account: Account = self
            .fetch_json(self.endpoints.account_url(route, game_name, tag_line))
            .await?;
        debug!(puuid = %account.puuid, "account resolved");

        Ok(account)
    }

    async fn fetch_json<T: DeserializeOwned>(&self, url: String) -> Result<T> {
        let response = self.queue.enqueue(UpstreamRequest::get(url)).await?;
        Ok(response.json()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_keys_ignore_case() {
        assert_eq!(
            player_key(Platform::Euw1, "Ana", "EUW"),
            player_key(Platform::Euw1, "ana", "euw")
        );
        assert_eq!(player_key(Platform::Kr, "Hide", "KR1"), "player:kr:hide#kr1");
        assert_eq!(
            account_key(RegionalRoute::Europe, "Ana", "EUW"),
            "account:europe:ana#euw"
        );
    }

    #[test]
    fn test_lookup_flags() {
        assert!(Lookup::cached(1).from_cache);
        assert_eq!(Lookup::fresh(2).into_value(), 2);
    }
}

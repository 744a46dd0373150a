//! Rate-limited, caching relay for League of Legends player data.
//!
//! `arena_relay` sits between clients and the Riot API:
//!
//! - **Rate limiting**: a fixed call budget per window plus a minimum spacing,
//!   closed for a cooldown when the upstream still answers 429
//! - **Request queue**: every upstream call is serialized through one drain
//!   loop; callers `enqueue` and await the result
//! - **Retries**: exponential backoff on transient failures, `Retry-After`
//!   aware handling of 429
//! - **Two-tier cache**: in-process fast tier over a durable tier (in-memory
//!   or Redis), with periodic sweeping of expired entries
//! - **Player lookups**: account, profile and masteries assembled into one
//!   cached record
//!
//! # Quick Start
//!
//! ```ignore
//! use arena_relay::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = RelayConfig::from_env()?;
//!     let transport = ReqwestTransport::new(config.api_key.clone())?;
//!     let lookup = PlayerLookup::from_config(&config, transport, MemoryStore::new());
//!
//!     let player = lookup.lookup("Ana", "EUW", "euw1").await?;
//!     println!(
//!         "{} is level {} ({} champions)",
//!         player.value.account.riot_id(),
//!         player.value.profile.level,
//!         player.value.masteries.len()
//!     );
//!     Ok(())
//! }
//! ```
//!
//! # Feature Flags
//!
//! - `memory` (default): in-process durable cache tier
//! - `redis`: Redis durable cache tier
//! - `server`: Axum router and the `arena-relay` binary

pub mod cache;
pub mod clock;
pub mod config;
pub mod decision;
pub mod error;
pub mod headers;
pub mod limiter;
pub mod player;
pub mod queue;
pub mod quota;
pub mod retry;
pub mod upstream;

#[cfg(feature = "server")]
pub mod server;

// Re-export main types
pub use cache::{CacheConfig, CacheEntry, CacheStore, DurableStore};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::RelayConfig;
pub use decision::{Decision, DenyReason, LimiterInfo};
pub use error::{CacheError, ConfigError, RelayError, Result, TransportError, UpstreamError};
pub use limiter::{RateLimiter, RateWindow};
pub use player::{Account, Endpoints, Lookup, Mastery, Platform, PlayerLookup, PlayerRecord, Profile};
pub use queue::{QueueConfig, RequestQueue};
pub use quota::{RateQuota, RateQuotaBuilder};
pub use retry::{RetryPolicy, RetryingClient};
pub use upstream::{HttpTransport, ReqwestTransport, UpstreamRequest, UpstreamResponse};

#[cfg(feature = "memory")]
pub use cache::MemoryStore;

#[cfg(feature = "redis")]
pub use cache::{RedisConfig, RedisStore};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::cache::{CacheConfig, CacheStore, DurableStore};
    pub use crate::config::RelayConfig;
    pub use crate::error::{RelayError, Result};
    pub use crate::limiter::RateLimiter;
    pub use crate::player::{Lookup, Platform, PlayerLookup, PlayerRecord};
    pub use crate::queue::{QueueConfig, RequestQueue};
    pub use crate::quota::RateQuota;
    pub use crate::retry::{RetryPolicy, RetryingClient};
    pub use crate::upstream::{HttpTransport, ReqwestTransport, UpstreamRequest};

    #[cfg(feature = "memory")]
    pub use crate::cache::MemoryStore;

    #[cfg(feature = "redis")]
    pub use crate::cache::{RedisConfig, RedisStore};
}

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use arena_relay::cache::{DurableStore, MemoryStore};
use arena_relay::player::PlayerLookup;
use arena_relay::server::router_from_config;
use arena_relay::{RelayConfig, ReqwestTransport};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before anything else)
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "arena_relay=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = RelayConfig::from_env().context("invalid relay configuration")?;
    let port: u16 = match std::env::var("PORT") {
        Ok(raw) => raw.parse().with_context(|| format!("invalid PORT {raw:?}"))?,
        Err(_) => 3000,
    };
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    #[cfg(feature = "redis")]
    {
        use arena_relay::cache::{RedisConfig, RedisStore};

        if let Some(url) = config.redis_url.clone() {
            let store = RedisStore::new(RedisConfig::new(url))
                .await
                .context("failed to connect to redis")?;
            info!("using redis durable cache tier");
            return serve(config, store, addr).await;
        }
    }

    info!("using in-memory durable cache tier");
    serve(config, MemoryStore::new(), addr).await
}

async fn serve<D: DurableStore>(
    config: RelayConfig,
    store: D,
    addr: SocketAddr,
) -> anyhow::Result<()> {
    let transport = ReqwestTransport::new(config.api_key.clone())?;
    let lookup = Arc::new(PlayerLookup::from_config(&config, transport, store));
    let _sweeper = lookup.cache().spawn_sweeper(config.cache.sweep_interval);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "arena relay listening");

    let app = router_from_config(lookup, &config);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

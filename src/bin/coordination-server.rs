//! Probe server: serves the coordination layer's health and cache-status
//! endpoints over the configured bind address.

use anyhow::Context;

use wayfarer_runtime::cache::{CacheBackend, CacheClient};
use wayfarer_runtime::config::{CacheBackendKind, RuntimeConfig};
use wayfarer_runtime::coordinator::RuntimeCoordinator;
use wayfarer_runtime::{database, logging, web};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_structured_logging();

    let config = RuntimeConfig::from_env().context("Loading runtime configuration")?;

    let pool = database::connect(&config.database_url, config.database_max_connections)
        .await
        .context("Connecting to the durable store")?;
    database::migrate(&pool).await.context("Applying coordination migrations")?;

    let cache = match config.cache_backend {
        CacheBackendKind::Memory => CacheClient::memory(),
        CacheBackendKind::Redis => CacheClient::new(
            CacheBackend::new_redis(&config.redis_url).context("Building the Redis cache pool")?,
        ),
    };

    let bind_address = config.bind_address.clone();
    let coordinator = RuntimeCoordinator::new(pool, cache, config);
    let app = web::probe_router(coordinator);

    let listener = tokio::net::TcpListener::bind(bind_address.as_str())
        .await
        .with_context(|| format!("Binding {bind_address}"))?;
    tracing::info!(address = %bind_address, "Coordination probe server listening");
    axum::serve(listener, app).await.context("Serving probe endpoints")?;

    Ok(())
}

// =============================================================================
// KRISHILINK SERVICE - Main Entry Point
// =============================================================================
// Crop marketplace backend: farmers list crops, buyers send interests, and
// owners accept or reject them against the remaining stock.
//
// Startup order:
// 1. .env + logging
// 2. configuration
// 3. metrics recorder
// 4. catalog store (PostgreSQL or in-memory)
// 5. Redis crop cache (optional)
// 6. HTTP server
// =============================================================================

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use krishilink_service::app::{router, AppState};
use krishilink_service::cache::CropCache;
use krishilink_service::config::{CatalogBackend, Config};
use krishilink_service::db::Database;
use krishilink_service::metrics::setup_metrics;
use krishilink_service::store::{CatalogStore, MemoryCatalogStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional
    dotenvy::dotenv().ok();

    // RUST_LOG controls log levels, e.g. RUST_LOG=info,krishilink_service=debug
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,krishilink_service=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting KrishiLink Service...");

    let config = Config::from_env()?;
    info!(
        port = config.port,
        backend = ?config.backend,
        policy = %config.oversubscription_policy,
        max_conflict_retries = config.max_conflict_retries,
        "Configuration loaded"
    );

    let metrics_handle = setup_metrics()?;
    info!("Prometheus metrics initialized");

    let catalog: Arc<dyn CatalogStore> = match (config.backend, config.database_url.as_deref()) {
        (CatalogBackend::Postgres, Some(url)) => {
            let db = Database::connect(url).await?;
            info!("Connected to PostgreSQL");

            db.run_migrations().await?;
            info!("Database migrations completed");
            Arc::new(db)
        }
        (CatalogBackend::Postgres, None) => {
            anyhow::bail!("DATABASE_URL environment variable is required for the postgres backend")
        }
        (CatalogBackend::Memory, _) => {
            tracing::warn!("Using in-memory catalog store; data is lost on restart");
            Arc::new(MemoryCatalogStore::new())
        }
    };

    let cache = match config.redis_url.as_deref() {
        Some(url) => {
            let cache = CropCache::connect(url, config.crop_cache_ttl_secs).await?;
            info!(ttl_secs = config.crop_cache_ttl_secs, "Connected to Redis");
            cache
        }
        None => {
            info!("REDIS_URL not set; crop cache disabled");
            CropCache::disabled()
        }
    };

    let state = Arc::new(AppState::new(
        catalog,
        cache,
        metrics_handle,
        config.oversubscription_policy,
        config.max_conflict_retries,
    ));
    let app = router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "KrishiLink Service is listening");

    axum::serve(listener, app).await?;

    Ok(())
}

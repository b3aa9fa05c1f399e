//! Tagcache server
//!
//! Runs the tag cache and the budget monitor behind the operational HTTP API.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tagcache::backend::{KvBackend, MemoryBackend};
use tagcache::budget::{BudgetMonitor, MemoryUsageStore, UsageStore};
use tagcache::cache::{TagCache, TagCacheConfig};
use tagcache::{create_router, spawn_budget_sweep, spawn_cleanup_task, AppState, Config};

#[cfg(feature = "postgres")]
const DB_MAX_CONNECTIONS: u32 = 5;

/// Main entry point.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Connect the key-value backend (Redis or in-memory)
/// 4. Connect the usage store (Postgres or in-memory)
/// 5. Start the expiry cleanup and budget sweep tasks
/// 6. Serve the HTTP API until SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tagcache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting tagcache server");

    let config = Config::from_env();
    info!(
        "Configuration loaded: default_ttl={}s, max_ttl={}s, port={}, budget_sweep_interval={}s",
        config.default_ttl, config.max_ttl, config.server_port, config.budget_sweep_interval
    );

    let (backend, memory) = connect_backend(&config).await?;
    info!(backend = backend.name(), "Cache backend ready");
    let cache = Arc::new(TagCache::new(backend, TagCacheConfig::from(&config)));

    let store = connect_store(&config).await?;
    let monitor = Arc::new(
        BudgetMonitor::new(store, cache.clone()).with_services(config.monitored_services.clone()),
    );

    let mut tasks = Vec::new();
    if let Some(memory) = memory {
        tasks.push(spawn_cleanup_task(memory, config.cleanup_interval));
        info!("Background cleanup task started");
    }
    tasks.push(spawn_budget_sweep(monitor.clone(), config.budget_sweep_interval));
    info!("Budget sweep task started");

    let app = create_router(AppState::new(cache, monitor));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(tasks))
        .await
        .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Redis when `REDIS_URL` is set, otherwise the in-memory backend. The
/// in-memory backend is also returned by type so its cleanup task can run.
async fn connect_backend(
    config: &Config,
) -> anyhow::Result<(Arc<dyn KvBackend>, Option<Arc<MemoryBackend>>)> {
    #[cfg(feature = "redis")]
    if let Some(url) = &config.redis_url {
        let redis = tagcache::backend::RedisBackend::connect(url)
            .await
            .context("failed to connect to Redis")?;
        return Ok((Arc::new(redis), None));
    }

    #[cfg(not(feature = "redis"))]
    if config.redis_url.is_some() {
        warn!("REDIS_URL is set but the redis feature is disabled, using in-memory backend");
    }

    let memory = Arc::new(MemoryBackend::new(config.max_entries));
    let backend: Arc<dyn KvBackend> = memory.clone();
    Ok((backend, Some(memory)))
}

/// Postgres when `DATABASE_URL` is set, otherwise the in-memory store.
async fn connect_store(config: &Config) -> anyhow::Result<Arc<dyn UsageStore>> {
    #[cfg(feature = "postgres")]
    if let Some(url) = &config.database_url {
        let store = tagcache::budget::PgUsageStore::connect(url, DB_MAX_CONNECTIONS)
            .await
            .context("failed to connect to Postgres")?;
        info!("Usage store: postgres");
        return Ok(Arc::new(store));
    }

    #[cfg(not(feature = "postgres"))]
    if config.database_url.is_some() {
        warn!("DATABASE_URL is set but the postgres feature is disabled, using in-memory store");
    }

    info!("Usage store: memory (usage is lost on restart)");
    Ok(Arc::new(MemoryUsageStore::new()))
}

/// Waits for Ctrl+C or SIGTERM, then aborts the background tasks.
async fn shutdown_signal(tasks: Vec<JoinHandle<()>>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    for task in &tasks {
        task.abort();
    }
    warn!("Background tasks aborted");
}

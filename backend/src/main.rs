use std::sync::Arc;

use anyhow::{Context, Result};
use backend::{build_router, AppState, DocumentStore, RedisPersistence, ServerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "backend=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env().context("Invalid server configuration")?;

    let store = match &config.redis_url {
        Some(redis_url) => {
            tracing::info!(%redis_url, "persisting tasks to redis");
            let persistence = RedisPersistence::open(redis_url)
                .await
                .context("Failed to connect to Redis")?;
            DocumentStore::with_redis(persistence)
                .await
                .context("Failed to load tasks from Redis")?
        }
        None => {
            tracing::warn!("REDIS_URL not set, tasks are kept in memory only");
            DocumentStore::in_memory()
        }
    };

    let state = Arc::new(AppState::new(store, config.keepalive));
    let app = build_router(state.clone());

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;
    tracing::info!(addr = %listener.local_addr()?, "task backend listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await
        .context("Server error")?;

    tracing::info!("server shut down");
    Ok(())
}

async fn shutdown_signal(state: Arc<AppState>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested, closing live queries");
    state.shutdown();
}

//! Goalpool - Settlement & Ranking Engine for match-prediction pools
//! Mission: settle fixtures, score every guess, keep pool standings exact

use anyhow::{Context, Result};
use axum::middleware;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use goalpool_backend::api::create_router;
use goalpool_backend::middleware::request_logging;
use goalpool_backend::models::Config;
use goalpool_backend::store::SqliteStore;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = Config::from_env()?;

    info!("🚀 Goalpool settlement engine starting");

    let store = Arc::new(SqliteStore::new(&config.database_path)?);

    let app = create_router(store)
        .layer(middleware::from_fn(request_logging))
        .layer(CorsLayer::permissive());

    let addr = format!("{}:{}", config.bind_addr, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("🎯 API server listening on {}", addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

/// Initialize tracing with env-filter overrides
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "goalpool_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

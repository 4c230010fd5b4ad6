//! mljob Coordinator
//!
//! Holds the canonical job and worker state. Workers poll it for pending
//! jobs, claim them, and report progress, logs and artifacts back.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod api;
pub mod config;
pub mod db;
pub mod events;
pub mod repository;
pub mod service;

use crate::api::AppState;
use crate::config::Config;
use crate::events::EventBus;
use crate::repository::{MemoryStore, PgStore, Store};
use crate::service::storage::FileStorage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mljob_coordinator=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting mljob coordinator...");

    let config = Config::from_env()?;
    if config.uses_default_token() {
        tracing::warn!("WORKER_SHARED_TOKEN is not set, using the default token");
    }

    let store: Arc<dyn Store> = match &config.database_url {
        Some(database_url) => {
            tracing::info!("Connecting to database...");

            let pool = db::create_pool(database_url)
                .await
                .context("Failed to create database pool")?;

            tracing::info!("Database connection pool created");

            db::run_migrations(&pool)
                .await
                .context("Failed to run database migrations")?;

            Arc::new(PgStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL is not set, state is kept in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    let storage = FileStorage::new(config.bundles_dir.clone(), config.artifacts_dir.clone());
    storage
        .init()
        .await
        .context("Failed to create storage directories")?;

    let events = EventBus::default();
    tokio::spawn(events::trace_events(events.subscribe()));

    // Build router with all API endpoints
    let app = api::create_router(AppState {
        store,
        storage: Arc::new(storage),
        events,
        token: Arc::from(config.worker_token.as_str()),
        max_upload_bytes: config.max_upload_bytes,
    });

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Coordinator stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

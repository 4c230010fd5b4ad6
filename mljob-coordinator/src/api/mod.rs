//! API Module
//!
//! HTTP API layer for the coordinator.
//! Each submodule handles endpoints for a specific domain.

pub mod auth;
pub mod error;
pub mod health;
pub mod job;
pub mod worker;

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::events::EventBus;
use crate::repository::Store;
use crate::service::storage::FileStorage;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub storage: Arc<FileStorage>,
    pub events: EventBus,
    pub token: Arc<str>,
    pub max_upload_bytes: usize,
}

/// Create the main router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        // Worker endpoints
        .route("/workers", get(worker::list_workers))
        .route("/workers/register", post(worker::register_worker))
        // Job endpoints
        .route("/jobs", get(job::list_jobs).post(job::create_job))
        .route("/jobs/pending", get(job::list_pending_jobs))
        .route("/jobs/{id}", get(job::get_job))
        .route("/jobs/{id}/accept", post(job::accept_job))
        .route("/jobs/{id}/status", post(job::update_status))
        .route("/jobs/{id}/cancel", post(job::cancel_job))
        .route(
            "/jobs/{id}/logs",
            get(job::get_job_logs).post(job::add_job_logs),
        )
        .route("/jobs/{id}/download", get(job::download_bundle))
        .route("/jobs/{id}/upload_model", post(job::upload_artifact))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer_token,
        ));

    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .nest("/api", api)
        // Add state and middleware
        .layer(DefaultBodyLimit::max(state.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

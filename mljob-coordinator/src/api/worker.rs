//! Worker API Handlers
//!
//! HTTP endpoints for worker registration and listing.

use axum::{Json, extract::State};
use mljob_core::domain::worker::Worker;
use mljob_core::dto::worker::{RegisterWorker, WorkerRegistered};

use crate::api::AppState;
use crate::api::error::ApiResult;
use crate::service::worker_service;

/// POST /api/workers/register
/// Register a worker, or refresh `last_seen` of a known name
pub async fn register_worker(
    State(state): State<AppState>,
    Json(req): Json<RegisterWorker>,
) -> ApiResult<Json<WorkerRegistered>> {
    let worker = worker_service::register_worker(state.store.as_ref(), &req.name).await?;

    Ok(Json(WorkerRegistered {
        worker_id: worker.id,
    }))
}

/// GET /api/workers
/// List all workers
pub async fn list_workers(State(state): State<AppState>) -> ApiResult<Json<Vec<Worker>>> {
    tracing::debug!("Listing workers");

    let workers = worker_service::list_workers(state.store.as_ref()).await?;

    Ok(Json(workers))
}

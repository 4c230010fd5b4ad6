//! Worker Service
//!
//! Business logic for worker registration.

use mljob_core::domain::worker::Worker;

use crate::repository::{Store, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Register a worker or refresh the one with the same name
pub async fn register_worker(store: &dyn Store, name: &str) -> Result<Worker, WorkerError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(WorkerError::Validation(
            "Worker name cannot be empty".to_string(),
        ));
    }

    let worker = store.register_worker(name).await?;
    tracing::info!(worker = %worker.name, worker_id = %worker.id, "Worker registered");

    Ok(worker)
}

/// List all workers
pub async fn list_workers(store: &dyn Store) -> Result<Vec<Worker>, WorkerError> {
    Ok(store.list_workers().await?)
}

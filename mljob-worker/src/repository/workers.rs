//! Workers repository

use async_trait::async_trait;
use mljob_client::{CoordinatorClient, Result};
use mljob_core::dto::worker::WorkerRegistered;

#[async_trait]
pub trait WorkerRepository: Send + Sync {
    /// Registers (or refreshes) this worker's identity
    async fn register(&self, name: &str) -> Result<WorkerRegistered>;
}

#[async_trait]
impl WorkerRepository for CoordinatorClient {
    async fn register(&self, name: &str) -> Result<WorkerRegistered> {
        self.register_worker(name).await
    }
}

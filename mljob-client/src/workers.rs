//! Worker-related API endpoints

use mljob_core::domain::worker::Worker;
use mljob_core::dto::worker::{RegisterWorker, WorkerRegistered};
use reqwest::Method;

use crate::error::Result;
use crate::{CoordinatorClient, GET_TIMEOUT, POST_TIMEOUT};

impl CoordinatorClient {
    // =============================================================================
    // Worker Registration
    // =============================================================================

    /// Register a worker with the coordinator
    ///
    /// Registering an already known name refreshes its `last_seen` and
    /// returns the same id.
    ///
    /// # Example
    /// ```no_run
    /// # use mljob_client::CoordinatorClient;
    /// # async fn example() -> anyhow::Result<()> {
    /// let client = CoordinatorClient::new("http://localhost:8080").with_token("t");
    /// let registered = client.register_worker("gpu-box-1").await?;
    /// println!("worker id {}", registered.worker_id);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn register_worker(&self, name: &str) -> Result<WorkerRegistered> {
        let response = self
            .request(Method::POST, "/workers/register", POST_TIMEOUT)
            .json(&RegisterWorker {
                name: name.to_string(),
            })
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// List all known workers
    pub async fn list_workers(&self) -> Result<Vec<Worker>> {
        let response = self
            .request(Method::GET, "/workers", GET_TIMEOUT)
            .send()
            .await?;

        self.handle_response(response).await
    }
}

//! Logs repository
//!
//! Sends raw log lines to the coordinator. Batching lives in
//! `service::relay`.

use async_trait::async_trait;
use mljob_client::{CoordinatorClient, Result};
use uuid::Uuid;

#[async_trait]
pub trait LogRepository: Send + Sync {
    /// Appends `lines` to the job's log, in order
    async fn send_lines(&self, job_id: Uuid, lines: Vec<String>) -> Result<()>;
}

#[async_trait]
impl LogRepository for CoordinatorClient {
    async fn send_lines(&self, job_id: Uuid, lines: Vec<String>) -> Result<()> {
        if lines.is_empty() {
            return Ok(());
        }

        self.append_logs(job_id, lines).await?;
        Ok(())
    }
}

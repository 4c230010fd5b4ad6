//! Jobs repository
//!
//! Worker side of the job lifecycle:
//! - Listing pending jobs
//! - Accepting a job
//! - Reporting status
//! - Moving bundles and artifacts

use std::path::Path;

use async_trait::async_trait;
use mljob_client::{CoordinatorClient, Result};
use mljob_core::domain::job::JobStatus;
use mljob_core::dto::artifact::UploadedArtifact;
use mljob_core::dto::job::{AcceptedJob, JobDescriptor};
use uuid::Uuid;

#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Pending jobs, oldest first
    async fn list_pending(&self) -> Result<Vec<JobDescriptor>>;

    /// Claims a pending job
    ///
    /// Fails with a 409 `ClientError` when another worker got there first.
    async fn accept(&self, job_id: Uuid, worker_name: &str) -> Result<AcceptedJob>;

    /// Reports a status change narrated by `note`
    async fn update_status(&self, job_id: Uuid, status: JobStatus, note: &str) -> Result<()>;

    /// Streams the job archive into `dest`, returning the byte count
    async fn download_bundle(&self, job_id: Uuid, dest: &Path) -> Result<u64>;

    /// Uploads one output file
    async fn upload_artifact(&self, job_id: Uuid, path: &Path) -> Result<UploadedArtifact>;
}

#[async_trait]
impl JobRepository for CoordinatorClient {
    async fn list_pending(&self) -> Result<Vec<JobDescriptor>> {
        self.list_pending_jobs().await
    }

    async fn accept(&self, job_id: Uuid, worker_name: &str) -> Result<AcceptedJob> {
        self.accept_job(job_id, worker_name).await
    }

    async fn update_status(&self, job_id: Uuid, status: JobStatus, note: &str) -> Result<()> {
        CoordinatorClient::update_status(self, job_id, status, Some(note)).await
    }

    async fn download_bundle(&self, job_id: Uuid, dest: &Path) -> Result<u64> {
        CoordinatorClient::download_bundle(self, job_id, dest).await
    }

    async fn upload_artifact(&self, job_id: Uuid, path: &Path) -> Result<UploadedArtifact> {
        CoordinatorClient::upload_artifact(self, job_id, path).await
    }
}

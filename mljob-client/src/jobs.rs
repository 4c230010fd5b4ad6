//! Job-related API endpoints

use std::path::Path;

use mljob_core::domain::job::{Job, JobStatus};
use mljob_core::domain::log::LogEntry;
use mljob_core::dto::artifact::UploadedArtifact;
use mljob_core::dto::job::{AcceptJob, AcceptedJob, JobDescriptor, StatusUpdate};
use mljob_core::dto::log::{AppendLogs, LogsAppended};
use reqwest::Method;
use reqwest::multipart::{Form, Part};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::{ClientError, Result};
use crate::{CoordinatorClient, DOWNLOAD_TIMEOUT, GET_TIMEOUT, POST_TIMEOUT, UPLOAD_TIMEOUT};

/// Fields of a job submission besides the archive itself
#[derive(Debug, Clone, Default)]
pub struct JobSubmission {
    pub name: String,
    pub main_entry: Option<String>,
    pub requirements_file: Option<String>,
}

impl CoordinatorClient {
    // =============================================================================
    // Job Execution (Worker-specific)
    // =============================================================================

    /// List pending jobs, oldest first
    pub async fn list_pending_jobs(&self) -> Result<Vec<JobDescriptor>> {
        let response = self
            .request(Method::GET, "/jobs/pending", GET_TIMEOUT)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Claim a pending job
    ///
    /// Fails with a 409 [`ClientError::ApiError`] (see
    /// [`ClientError::is_conflict`]) when another worker got there first.
    ///
    /// # Example
    /// ```no_run
    /// # use mljob_client::CoordinatorClient;
    /// # use uuid::Uuid;
    /// # async fn example(job_id: Uuid) -> anyhow::Result<()> {
    /// let client = CoordinatorClient::new("http://localhost:8080").with_token("t");
    /// match client.accept_job(job_id, "gpu-box-1").await {
    ///     Ok(accepted) => println!("build {}", accepted.image_tag),
    ///     Err(e) if e.is_conflict() => println!("already taken"),
    ///     Err(e) => return Err(e.into()),
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn accept_job(&self, job_id: Uuid, worker_name: &str) -> Result<AcceptedJob> {
        let response = self
            .request(Method::POST, &format!("/jobs/{}/accept", job_id), POST_TIMEOUT)
            .json(&AcceptJob {
                worker_name: worker_name.to_string(),
            })
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Report a status change, optionally narrated by a note
    pub async fn update_status(
        &self,
        job_id: Uuid,
        status: JobStatus,
        note: Option<&str>,
    ) -> Result<()> {
        let response = self
            .request(Method::POST, &format!("/jobs/{}/status", job_id), POST_TIMEOUT)
            .json(&StatusUpdate {
                status,
                note: note.map(str::to_string),
            })
            .send()
            .await?;

        self.handle_empty_response(response).await
    }

    /// Append raw lines to a job's log
    pub async fn append_logs(&self, job_id: Uuid, lines: Vec<String>) -> Result<LogsAppended> {
        let response = self
            .request(Method::POST, &format!("/jobs/{}/logs", job_id), POST_TIMEOUT)
            .json(&AppendLogs { lines })
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Stream a job's bundle archive into `dest`
    ///
    /// # Returns
    /// The number of bytes written
    pub async fn download_bundle(&self, job_id: Uuid, dest: &Path) -> Result<u64> {
        let response = self
            .request(
                Method::GET,
                &format!("/jobs/{}/download", job_id),
                DOWNLOAD_TIMEOUT,
            )
            .send()
            .await?;
        let mut response = Self::check_status(response).await?;

        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        Ok(written)
    }

    /// Upload one produced file as a job artifact
    pub async fn upload_artifact(&self, job_id: Uuid, path: &Path) -> Result<UploadedArtifact> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                ClientError::InvalidRequest(format!("Not a file path: {}", path.display()))
            })?
            .to_string();
        let data = tokio::fs::read(path).await?;

        let form = Form::new().part("file", Part::bytes(data).file_name(filename));
        let response = self
            .request(
                Method::POST,
                &format!("/jobs/{}/upload_model", job_id),
                UPLOAD_TIMEOUT,
            )
            .multipart(form)
            .send()
            .await?;

        self.handle_response(response).await
    }

    // =============================================================================
    // Job Management (Operator)
    // =============================================================================

    /// Submit a new job from a local zip archive
    pub async fn create_job(&self, submission: JobSubmission, bundle: &Path) -> Result<Job> {
        let filename = bundle
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("bundle.zip")
            .to_string();
        let data = tokio::fs::read(bundle).await?;

        let mut form = Form::new().text("name", submission.name);
        if let Some(main_entry) = submission.main_entry {
            form = form.text("main_entry", main_entry);
        }
        if let Some(requirements_file) = submission.requirements_file {
            form = form.text("requirements_file", requirements_file);
        }
        let form = form.part("file", Part::bytes(data).file_name(filename));

        let response = self
            .request(Method::POST, "/jobs", UPLOAD_TIMEOUT)
            .multipart(form)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// List all jobs, newest first
    pub async fn list_jobs(&self) -> Result<Vec<Job>> {
        let response = self
            .request(Method::GET, "/jobs", GET_TIMEOUT)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Get a job by ID
    pub async fn get_job(&self, job_id: Uuid) -> Result<Job> {
        let response = self
            .request(Method::GET, &format!("/jobs/{}", job_id), GET_TIMEOUT)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Get all log entries of a job in display order
    pub async fn get_job_logs(&self, job_id: Uuid) -> Result<Vec<LogEntry>> {
        let response = self
            .request(Method::GET, &format!("/jobs/{}/logs", job_id), GET_TIMEOUT)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Cancel a job that has not finished yet
    pub async fn cancel_job(&self, job_id: Uuid) -> Result<Job> {
        let response = self
            .request(Method::POST, &format!("/jobs/{}/cancel", job_id), POST_TIMEOUT)
            .send()
            .await?;

        self.handle_response(response).await
    }
}

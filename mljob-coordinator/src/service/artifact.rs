//! Artifact Service
//!
//! Stores files produced by job executions.

use mljob_core::domain::log::LogLevel;
use mljob_core::dto::artifact::UploadedArtifact;
use uuid::Uuid;

use crate::repository::Store;
use crate::service::job::{JobError, get_job};
use crate::service::storage::{FileStorage, sanitize_filename};

/// Store an uploaded artifact for an existing job
pub async fn upload_artifact(
    store: &dyn Store,
    storage: &FileStorage,
    job_id: Uuid,
    filename: &str,
    data: &[u8],
) -> Result<UploadedArtifact, JobError> {
    get_job(store, job_id).await?;

    let filename = sanitize_filename(filename)
        .ok_or_else(|| JobError::Validation("Invalid artifact file name".to_string()))?;

    let uploaded = storage.save_artifact(job_id, &filename, data).await?;

    tracing::info!(
        job_id = %job_id,
        "Artifact uploaded: {} ({} bytes)",
        uploaded.filename,
        uploaded.size
    );
    if let Err(e) = store
        .append_logs(
            job_id,
            LogLevel::Info,
            &[format!("Artifact uploaded: {}", uploaded.filename)],
        )
        .await
    {
        tracing::warn!(job_id = %job_id, "Failed to log artifact upload: {}", e);
    }

    Ok(uploaded)
}

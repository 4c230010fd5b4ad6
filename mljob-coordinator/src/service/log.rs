//! Log Service
//!
//! Business logic for job log management.

use mljob_core::domain::log::{LogEntry, LogLevel};
use uuid::Uuid;

use crate::events::{EventBus, JobEvent};
use crate::repository::{Store, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("Job {0} not found")]
    JobNotFound(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Append raw lines shipped by a worker
///
/// Trailing line terminators are stripped; an empty batch stores nothing.
pub async fn append_lines(
    store: &dyn Store,
    events: &EventBus,
    job_id: Uuid,
    lines: Vec<String>,
) -> Result<usize, LogError> {
    store
        .find_job(job_id)
        .await?
        .ok_or(LogError::JobNotFound(job_id))?;

    if lines.is_empty() {
        return Ok(0);
    }

    let lines: Vec<String> = lines
        .into_iter()
        .map(|l| l.trim_end_matches(['\r', '\n']).to_string())
        .collect();

    let entries = store.append_logs(job_id, LogLevel::Info, &lines).await?;

    tracing::debug!(job_id = %job_id, "Appended {} log lines", entries.len());
    events.publish(JobEvent::LogsAppended {
        job_id,
        count: entries.len(),
    });

    Ok(entries.len())
}

/// Get all log entries for a job in display order
pub async fn get_logs(store: &dyn Store, job_id: Uuid) -> Result<Vec<LogEntry>, LogError> {
    store
        .find_job(job_id)
        .await?
        .ok_or(LogError::JobNotFound(job_id))?;

    Ok(store.list_logs(job_id).await?)
}

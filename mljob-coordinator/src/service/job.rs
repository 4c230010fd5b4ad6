//! Job Service
//!
//! The job state machine. Every status change goes through
//! [`Store::transition_job`] with the legal predecessors of the target state
//! as guard, so the check and the write can never interleave with another
//! request.

use std::io::Cursor;

use mljob_core::domain::job::{DEFAULT_MAIN_ENTRY, DEFAULT_REQUIREMENTS_FILE, Job, JobStatus};
use mljob_core::domain::log::LogLevel;
use mljob_core::dto::job::JobDescriptor;
use uuid::Uuid;

use crate::events::{EventBus, JobEvent};
use crate::repository::{Store, StoreError};
use crate::service::storage::FileStorage;

/// Service error type
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Job {0} not found")]
    NotFound(Uuid),

    #[error("Job {job_id} is {status}, not pending")]
    Conflict { job_id: Uuid, status: JobStatus },

    #[error("Job {job_id} cannot move from {from} to {to}")]
    InvalidTransition {
        job_id: Uuid,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),
}

/// A job submission after the multipart form has been read
#[derive(Debug, Clone)]
pub struct NewJob {
    pub name: String,
    pub main_entry: Option<String>,
    pub requirements_file: Option<String>,
    pub filename: String,
    pub archive: Vec<u8>,
}

// =============================================================================
// Submission & Queries
// =============================================================================

/// Validate, store the archive and create a pending job
pub async fn create_job(
    store: &dyn Store,
    storage: &FileStorage,
    events: &EventBus,
    req: NewJob,
) -> Result<Job, JobError> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(JobError::Validation("Job name cannot be empty".to_string()));
    }

    if !req.filename.to_ascii_lowercase().ends_with(".zip") {
        return Err(JobError::Validation(
            "Only .zip bundles are accepted".to_string(),
        ));
    }

    if zip::ZipArchive::new(Cursor::new(req.archive.as_slice())).is_err() {
        return Err(JobError::Validation(
            "Uploaded file is not a valid zip archive".to_string(),
        ));
    }

    let main_entry = bundle_path_field("main_entry", req.main_entry, DEFAULT_MAIN_ENTRY)?;
    let requirements_file = bundle_path_field(
        "requirements_file",
        req.requirements_file,
        DEFAULT_REQUIREMENTS_FILE,
    )?;

    let id = Uuid::new_v4();
    let reference = storage.save_bundle(id, &req.archive).await?;
    let job = Job::with_id(id, name, reference, main_entry, requirements_file);

    store.insert_job(&job).await?;

    tracing::info!(job_id = %job.id, "Job created: {}", job.name);
    events.publish(JobEvent::StatusChanged {
        job_id: job.id,
        status: job.status,
    });

    Ok(job)
}

/// Get a job by ID
pub async fn get_job(store: &dyn Store, id: Uuid) -> Result<Job, JobError> {
    store.find_job(id).await?.ok_or(JobError::NotFound(id))
}

/// List all jobs, newest first
pub async fn list_jobs(store: &dyn Store) -> Result<Vec<Job>, JobError> {
    Ok(store.list_jobs().await?)
}

/// Pending jobs as advertised to workers, oldest first
pub async fn list_pending_jobs(store: &dyn Store) -> Result<Vec<JobDescriptor>, JobError> {
    let jobs = store.list_jobs_by_status(JobStatus::Pending).await?;
    Ok(jobs.into_iter().map(JobDescriptor::from).collect())
}

/// Load the archive of a job
pub async fn read_bundle(
    store: &dyn Store,
    storage: &FileStorage,
    id: Uuid,
) -> Result<Vec<u8>, JobError> {
    let job = get_job(store, id).await?;
    Ok(storage.read_bundle(&job.bundle_reference).await?)
}

// =============================================================================
// Transitions
// =============================================================================

/// Claim a pending job for a worker
///
/// At most one caller wins; everyone else gets [`JobError::Conflict`] and
/// the job is left untouched.
pub async fn accept_job(
    store: &dyn Store,
    events: &EventBus,
    id: Uuid,
    worker_name: &str,
) -> Result<Job, JobError> {
    let worker_name = worker_name.trim();
    if worker_name.is_empty() {
        return Err(JobError::Validation(
            "worker_name cannot be empty".to_string(),
        ));
    }

    // Unknown ids must not leave a worker row behind
    get_job(store, id).await?;
    let worker = store.find_or_create_worker(worker_name).await?;

    let Some(job) = store
        .transition_job(id, &[JobStatus::Pending], JobStatus::Accepted, Some(worker.id))
        .await?
    else {
        let current = get_job(store, id).await?;
        return Err(JobError::Conflict {
            job_id: id,
            status: current.status,
        });
    };

    tracing::info!(job_id = %id, worker = %worker_name, "Job accepted");
    narrate(
        store,
        id,
        LogLevel::Info,
        format!("Worker '{}' accepted job.", worker_name),
    )
    .await;
    events.publish(JobEvent::StatusChanged {
        job_id: id,
        status: job.status,
    });

    Ok(job)
}

/// Apply a worker-reported status
pub async fn update_status(
    store: &dyn Store,
    events: &EventBus,
    id: Uuid,
    status: JobStatus,
    note: Option<&str>,
) -> Result<Job, JobError> {
    if !status.is_worker_reportable() {
        return Err(JobError::Validation(format!(
            "Workers cannot report status '{}'",
            status
        )));
    }

    let job = transition(store, id, status).await?;

    tracing::info!(job_id = %id, status = %status, "Job status updated");
    if let Some(note) = note.map(str::trim).filter(|n| !n.is_empty()) {
        let level = if status == JobStatus::Failed {
            LogLevel::Error
        } else {
            LogLevel::Info
        };
        narrate(store, id, level, format!("[STATUS] {}", note)).await;
    }
    events.publish(JobEvent::StatusChanged {
        job_id: id,
        status: job.status,
    });

    Ok(job)
}

/// Operator cancellation of an unfinished job
pub async fn cancel_job(store: &dyn Store, events: &EventBus, id: Uuid) -> Result<Job, JobError> {
    let job = transition(store, id, JobStatus::Canceled).await?;

    tracing::info!(job_id = %id, "Job canceled");
    narrate(
        store,
        id,
        LogLevel::Warning,
        "[STATUS] Job canceled by operator".to_string(),
    )
    .await;
    events.publish(JobEvent::StatusChanged {
        job_id: id,
        status: job.status,
    });

    Ok(job)
}

async fn transition(store: &dyn Store, id: Uuid, to: JobStatus) -> Result<Job, JobError> {
    let from = JobStatus::predecessors(to);

    match store.transition_job(id, &from, to, None).await? {
        Some(job) => Ok(job),
        None => {
            let current = get_job(store, id).await?;
            Err(JobError::InvalidTransition {
                job_id: id,
                from: current.status,
                to,
            })
        }
    }
}

/// Append a narration line; the transition is already committed, so a
/// failure here is only logged
async fn narrate(store: &dyn Store, id: Uuid, level: LogLevel, message: String) {
    if let Err(e) = store.append_logs(id, level, &[message]).await {
        tracing::warn!(job_id = %id, "Failed to append job narration: {}", e);
    }
}

/// Entry and requirements names are paths inside the bundle
fn bundle_path_field(
    field: &str,
    value: Option<String>,
    default: &str,
) -> Result<String, JobError> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string());

    let escapes = value.starts_with('/')
        || value.starts_with('\\')
        || value.split(['/', '\\']).any(|part| part == "..");
    if escapes {
        return Err(JobError::Validation(format!(
            "{} must be a relative path inside the bundle",
            field
        )));
    }

    Ok(value)
}

//! Job DTOs for inter-service communication

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::job::{Job, JobStatus};

/// Pending job as advertised to workers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub id: Uuid,
    pub name: String,
    pub bundle_reference: String,
    pub main_entry: String,
    pub requirements_file: String,
    pub image_tag: String,
    pub created_at: DateTime<Utc>,
}

impl From<Job> for JobDescriptor {
    fn from(job: Job) -> Self {
        JobDescriptor {
            id: job.id,
            name: job.name,
            bundle_reference: job.bundle_reference,
            main_entry: job.main_entry,
            requirements_file: job.requirements_file,
            image_tag: job.image_tag,
            created_at: job.created_at,
        }
    }
}

/// Request from a worker to claim a pending job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptJob {
    pub worker_name: String,
}

/// Successful claim, carries the tag the worker must build
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptedJob {
    pub image_tag: String,
}

/// Job status update from worker to coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl StatusUpdate {
    pub fn new(status: JobStatus, note: impl Into<String>) -> Self {
        Self {
            status,
            note: Some(note.into()),
        }
    }
}

/// Generic acknowledgement body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ack {
    pub message: String,
}

//! Job domain types
//!
//! A job is one submitted code bundle plus the instructions needed to build
//! and run it. The coordinator owns the canonical status; workers move it
//! forward through the edges encoded in [`JobStatus::can_transition_to`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default entry file executed inside the container
pub const DEFAULT_MAIN_ENTRY: &str = "main.py";

/// Default dependency declaration file looked up in the bundle
pub const DEFAULT_REQUIREMENTS_FILE: &str = "requirements.txt";

/// Job record
///
/// Structure shared between coordinator (persists) and worker (executes).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub name: String,
    pub status: JobStatus,
    /// Opaque handle to the stored code archive
    pub bundle_reference: String,
    pub main_entry: String,
    pub requirements_file: String,
    /// Worker id, set once on the pending -> accepted edge
    pub accepted_by: Option<Uuid>,
    pub image_tag: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a new pending job
    pub fn new(
        name: impl Into<String>,
        bundle_reference: impl Into<String>,
        main_entry: impl Into<String>,
        requirements_file: impl Into<String>,
    ) -> Self {
        Self::with_id(
            Uuid::new_v4(),
            name,
            bundle_reference,
            main_entry,
            requirements_file,
        )
    }

    /// Create a new pending job with a caller-chosen id
    ///
    /// The submission path picks the id first so the stored bundle can be
    /// named after it.
    pub fn with_id(
        id: Uuid,
        name: impl Into<String>,
        bundle_reference: impl Into<String>,
        main_entry: impl Into<String>,
        requirements_file: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            status: JobStatus::Pending,
            bundle_reference: bundle_reference.into(),
            main_entry: main_entry.into(),
            requirements_file: requirements_file.into(),
            accepted_by: None,
            image_tag: image_tag_for(id),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Deterministic container image tag for a job
pub fn image_tag_for(job_id: Uuid) -> String {
    format!("mljob-{}:latest", job_id)
}

/// Job lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Accepted,
    Running,
    Completed,
    Failed,
    Canceled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 6] = [
        JobStatus::Pending,
        JobStatus::Accepted,
        JobStatus::Running,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Canceled,
    ];

    /// Whether `self -> next` is an edge of the lifecycle graph
    ///
    /// `Running -> Running` is allowed so workers can narrate stage changes
    /// ("Starting container", "Streaming logs") without moving the status.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Accepted)
                | (Accepted, Running)
                | (Running, Running)
                | (Running, Completed)
                | (Accepted, Failed)
                | (Running, Failed)
                | (Pending, Canceled)
                | (Accepted, Canceled)
                | (Running, Canceled)
        )
    }

    /// All states from which `next` can be reached in one step
    pub fn predecessors(next: JobStatus) -> Vec<JobStatus> {
        Self::ALL
            .into_iter()
            .filter(|s| s.can_transition_to(next))
            .collect()
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Canceled
        )
    }

    /// Statuses a worker may report through the status endpoint
    pub fn is_worker_reportable(self) -> bool {
        matches!(
            self,
            JobStatus::Running | JobStatus::Completed | JobStatus::Failed
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Accepted => "accepted",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Canceled => "canceled",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "accepted" => Ok(JobStatus::Accepted),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "canceled" | "cancelled" => Ok(JobStatus::Canceled),
            other => Err(format!("unknown job status: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_job_is_pending_with_derived_tag() {
        let job = Job::new("train", "bundle.zip", "main.py", "requirements.txt");
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.accepted_by.is_none());
        assert_eq!(job.image_tag, format!("mljob-{}:latest", job.id));
    }

    #[test]
    fn test_legal_edges() {
        use JobStatus::*;
        assert!(Pending.can_transition_to(Accepted));
        assert!(Accepted.can_transition_to(Running));
        assert!(Running.can_transition_to(Completed));
        assert!(Running.can_transition_to(Failed));
        assert!(Accepted.can_transition_to(Failed));
        assert!(Running.can_transition_to(Running));
        for s in [Pending, Accepted, Running] {
            assert!(s.can_transition_to(Canceled));
        }
    }

    #[test]
    fn test_no_skipping_predecessors() {
        use JobStatus::*;
        assert!(!Pending.can_transition_to(Running));
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Accepted.can_transition_to(Completed));
        assert!(!Accepted.can_transition_to(Accepted));
        assert!(!Running.can_transition_to(Accepted));
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for from in JobStatus::ALL.into_iter().filter(|s| s.is_terminal()) {
            for to in JobStatus::ALL {
                assert!(!from.can_transition_to(to), "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn test_predecessors() {
        use JobStatus::*;
        assert_eq!(JobStatus::predecessors(Accepted), vec![Pending]);
        assert_eq!(JobStatus::predecessors(Failed), vec![Accepted, Running]);
        assert_eq!(
            JobStatus::predecessors(Canceled),
            vec![Pending, Accepted, Running]
        );
        assert!(JobStatus::predecessors(Pending).is_empty());
    }

    #[test]
    fn test_status_serde_is_lowercase() {
        let json = serde_json::to_string(&JobStatus::Completed).unwrap();
        assert_eq!(json, "\"completed\"");
        let parsed: JobStatus = serde_json::from_str("\"canceled\"").unwrap();
        assert_eq!(parsed, JobStatus::Canceled);
    }

    #[test]
    fn test_status_from_str() {
        assert_eq!("Running".parse::<JobStatus>().unwrap(), JobStatus::Running);
        assert!("bogus".parse::<JobStatus>().is_err());
    }
}

//! Worker domain model
//!
//! Represents a worker agent that claims and executes jobs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered worker agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    /// Unique identifier for the worker
    pub id: Uuid,

    /// Display name, also the key for idempotent re-registration
    pub name: String,

    /// Current status of the worker
    pub status: WorkerStatus,

    /// Refreshed on every registration call
    pub last_seen: DateTime<Utc>,

    /// When this worker was first seen
    pub registered_at: DateTime<Utc>,
}

impl Worker {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            status: WorkerStatus::Idle,
            last_seen: now,
            registered_at: now,
        }
    }
}

/// Status of a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    /// Waiting for work
    #[default]
    Idle,

    /// Executing a job
    Busy,

    /// Not seen recently
    Offline,
}

impl WorkerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkerStatus::Idle => "idle",
            WorkerStatus::Busy => "busy",
            WorkerStatus::Offline => "offline",
        }
    }
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WorkerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(WorkerStatus::Idle),
            "busy" => Ok(WorkerStatus::Busy),
            "offline" => Ok(WorkerStatus::Offline),
            other => Err(format!("unknown worker status: {}", other)),
        }
    }
}

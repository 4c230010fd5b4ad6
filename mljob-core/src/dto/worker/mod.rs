//! Worker DTOs
//!
//! Data transfer objects for worker-related operations.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request to register a worker with the coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterWorker {
    /// Display name, re-registering with the same name is idempotent
    pub name: String,
}

/// Registration result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRegistered {
    pub worker_id: Uuid,
}

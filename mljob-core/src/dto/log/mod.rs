//! Log DTOs for inter-service communication

use serde::{Deserialize, Serialize};

/// Batch of raw lines appended to a job's log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendLogs {
    pub lines: Vec<String>,
}

/// Number of entries stored from an [`AppendLogs`] batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogsAppended {
    pub count: usize,
}

//! Repository Module
//!
//! Data access layer for the coordinator.
//!
//! Services talk to storage through the [`Store`] trait so the same state
//! machine runs against Postgres in production and against [`MemoryStore`]
//! in tests or single-node setups. The per-entity modules hold the Postgres
//! queries; [`PgStore`] wires them behind the trait.

pub mod job;
pub mod log;
pub mod memory;
pub mod postgres;
pub mod worker;

use async_trait::async_trait;
use mljob_core::domain::job::{Job, JobStatus};
use mljob_core::domain::log::{LogEntry, LogLevel};
use mljob_core::domain::worker::Worker;
use uuid::Uuid;

pub use memory::MemoryStore;
pub use postgres::PgStore;

// Re-export for convenience
pub use job as job_repository;
pub use log as log_repository;
pub use worker as worker_repository;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Storage backend for jobs, workers and logs
#[async_trait]
pub trait Store: Send + Sync {
    // =============================================================================
    // Jobs
    // =============================================================================

    async fn insert_job(&self, job: &Job) -> StoreResult<()>;

    async fn find_job(&self, id: Uuid) -> StoreResult<Option<Job>>;

    /// All jobs, newest first
    async fn list_jobs(&self) -> StoreResult<Vec<Job>>;

    /// Jobs in one status, oldest first
    async fn list_jobs_by_status(&self, status: JobStatus) -> StoreResult<Vec<Job>>;

    /// Atomically move a job to `to` if its current status is in `from`
    ///
    /// `accepted_by` is only written when the column is still empty. Returns
    /// `None` when the job does not exist or the guard did not match; the
    /// caller tells the two apart.
    async fn transition_job(
        &self,
        id: Uuid,
        from: &[JobStatus],
        to: JobStatus,
        accepted_by: Option<Uuid>,
    ) -> StoreResult<Option<Job>>;

    // =============================================================================
    // Workers
    // =============================================================================

    /// Insert a worker or refresh `last_seen` of the one with this name
    async fn register_worker(&self, name: &str) -> StoreResult<Worker>;

    /// Find a worker by name, creating it without touching `last_seen` of
    /// an existing row
    async fn find_or_create_worker(&self, name: &str) -> StoreResult<Worker>;

    async fn list_workers(&self) -> StoreResult<Vec<Worker>>;

    // =============================================================================
    // Logs
    // =============================================================================

    /// Append messages in order
    ///
    /// Every entry of a batch gets the same `ts`, never earlier than the
    /// newest entry already stored for the job.
    async fn append_logs(
        &self,
        job_id: Uuid,
        level: LogLevel,
        messages: &[String],
    ) -> StoreResult<Vec<LogEntry>>;

    /// Entries of a job ordered by `ts`, then insertion order
    async fn list_logs(&self, job_id: Uuid) -> StoreResult<Vec<LogEntry>>;
}

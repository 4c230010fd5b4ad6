//! Postgres-backed [`Store`]

use async_trait::async_trait;
use mljob_core::domain::job::{Job, JobStatus};
use mljob_core::domain::log::{LogEntry, LogLevel};
use mljob_core::domain::worker::Worker;
use sqlx::PgPool;
use uuid::Uuid;

use super::{Store, StoreResult, job_repository, log_repository, worker_repository};

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_job(&self, job: &Job) -> StoreResult<()> {
        job_repository::create(&self.pool, job).await?;
        Ok(())
    }

    async fn find_job(&self, id: Uuid) -> StoreResult<Option<Job>> {
        job_repository::find_by_id(&self.pool, id).await
    }

    async fn list_jobs(&self) -> StoreResult<Vec<Job>> {
        job_repository::list_all(&self.pool).await
    }

    async fn list_jobs_by_status(&self, status: JobStatus) -> StoreResult<Vec<Job>> {
        job_repository::find_by_status(&self.pool, status).await
    }

    async fn transition_job(
        &self,
        id: Uuid,
        from: &[JobStatus],
        to: JobStatus,
        accepted_by: Option<Uuid>,
    ) -> StoreResult<Option<Job>> {
        job_repository::transition(&self.pool, id, from, to, accepted_by).await
    }

    async fn register_worker(&self, name: &str) -> StoreResult<Worker> {
        worker_repository::upsert(&self.pool, name).await
    }

    async fn find_or_create_worker(&self, name: &str) -> StoreResult<Worker> {
        worker_repository::find_or_create(&self.pool, name).await
    }

    async fn list_workers(&self) -> StoreResult<Vec<Worker>> {
        worker_repository::list_all(&self.pool).await
    }

    async fn append_logs(
        &self,
        job_id: Uuid,
        level: LogLevel,
        messages: &[String],
    ) -> StoreResult<Vec<LogEntry>> {
        log_repository::add_entries(&self.pool, job_id, level, messages).await
    }

    async fn list_logs(&self, job_id: Uuid) -> StoreResult<Vec<LogEntry>> {
        log_repository::find_by_job(&self.pool, job_id).await
    }
}

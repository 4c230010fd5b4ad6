//! In-memory [`Store`]
//!
//! One mutex guards all state, which makes every trait call a critical
//! section. Used by tests and by single-node deployments without Postgres.

use async_trait::async_trait;
use chrono::Utc;
use mljob_core::domain::job::{Job, JobStatus};
use mljob_core::domain::log::{LogEntry, LogLevel};
use mljob_core::domain::worker::Worker;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{Store, StoreResult};

#[derive(Default)]
struct State {
    // Insertion order doubles as the tie breaker for equal timestamps
    jobs: Vec<Job>,
    workers: Vec<Worker>,
    logs: Vec<LogEntry>,
    next_log_id: i64,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_job(&self, job: &Job) -> StoreResult<()> {
        self.state.lock().await.jobs.push(job.clone());
        Ok(())
    }

    async fn find_job(&self, id: Uuid) -> StoreResult<Option<Job>> {
        let state = self.state.lock().await;
        Ok(state.jobs.iter().find(|j| j.id == id).cloned())
    }

    async fn list_jobs(&self) -> StoreResult<Vec<Job>> {
        let state = self.state.lock().await;
        let mut jobs: Vec<Job> = state.jobs.iter().rev().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }

    async fn list_jobs_by_status(&self, status: JobStatus) -> StoreResult<Vec<Job>> {
        let state = self.state.lock().await;
        let mut jobs: Vec<Job> = state
            .jobs
            .iter()
            .filter(|j| j.status == status)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }

    async fn transition_job(
        &self,
        id: Uuid,
        from: &[JobStatus],
        to: JobStatus,
        accepted_by: Option<Uuid>,
    ) -> StoreResult<Option<Job>> {
        let mut state = self.state.lock().await;
        let Some(job) = state.jobs.iter_mut().find(|j| j.id == id) else {
            return Ok(None);
        };

        if !from.contains(&job.status) {
            return Ok(None);
        }

        job.status = to;
        job.updated_at = Utc::now();
        if job.accepted_by.is_none() {
            job.accepted_by = accepted_by;
        }

        Ok(Some(job.clone()))
    }

    async fn register_worker(&self, name: &str) -> StoreResult<Worker> {
        let mut state = self.state.lock().await;
        if let Some(worker) = state.workers.iter_mut().find(|w| w.name == name) {
            worker.last_seen = Utc::now();
            return Ok(worker.clone());
        }

        let worker = Worker::new(name);
        state.workers.push(worker.clone());
        Ok(worker)
    }

    async fn find_or_create_worker(&self, name: &str) -> StoreResult<Worker> {
        let mut state = self.state.lock().await;
        if let Some(worker) = state.workers.iter().find(|w| w.name == name) {
            return Ok(worker.clone());
        }

        let worker = Worker::new(name);
        state.workers.push(worker.clone());
        Ok(worker)
    }

    async fn list_workers(&self) -> StoreResult<Vec<Worker>> {
        Ok(self.state.lock().await.workers.clone())
    }

    async fn append_logs(
        &self,
        job_id: Uuid,
        level: LogLevel,
        messages: &[String],
    ) -> StoreResult<Vec<LogEntry>> {
        let mut state = self.state.lock().await;

        let now = Utc::now();
        let ts = state
            .logs
            .iter()
            .filter(|e| e.job_id == job_id)
            .map(|e| e.ts)
            .max()
            .map_or(now, |last| last.max(now));

        let mut entries = Vec::with_capacity(messages.len());
        for message in messages {
            state.next_log_id += 1;
            let entry = LogEntry {
                id: state.next_log_id,
                job_id,
                ts,
                level,
                message: message.clone(),
            };
            state.logs.push(entry.clone());
            entries.push(entry);
        }

        Ok(entries)
    }

    async fn list_logs(&self, job_id: Uuid) -> StoreResult<Vec<LogEntry>> {
        let state = self.state.lock().await;
        let mut entries: Vec<LogEntry> = state
            .logs
            .iter()
            .filter(|e| e.job_id == job_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.ts.cmp(&b.ts).then(a.id.cmp(&b.id)));
        Ok(entries)
    }
}

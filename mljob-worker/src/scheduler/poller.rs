//! Worker agent loop
//!
//! Registers once, then polls the coordinator for pending jobs and runs
//! them one at a time, oldest first. The loop only sleeps when there was
//! nothing to do: no pending job, a poll error, a declined job, or a job
//! lost to another worker.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use mljob_core::dto::job::{AcceptedJob, JobDescriptor};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{PipelineError, PipelineResult};
use crate::repository::{JobRepository, WorkerRepository};
use crate::service::{AcceptDecision, ExecutionService, JobOutcome};

/// Result of a single poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Idle,
    Declined(Uuid),
    Conflict(Uuid),
    Executed { job_id: Uuid, outcome: JobOutcome },
}

pub struct WorkerAgent {
    config: Config,
    jobs: Arc<dyn JobRepository>,
    workers: Arc<dyn WorkerRepository>,
    decision: Box<dyn AcceptDecision>,
    executor: Arc<dyn ExecutionService>,
    declined: HashSet<Uuid>,
}

impl WorkerAgent {
    pub fn new(
        config: Config,
        jobs: Arc<dyn JobRepository>,
        workers: Arc<dyn WorkerRepository>,
        decision: Box<dyn AcceptDecision>,
        executor: Arc<dyn ExecutionService>,
    ) -> Self {
        Self {
            config,
            jobs,
            workers,
            decision,
            executor,
            declined: HashSet::new(),
        }
    }

    /// Runs until `shutdown` is cancelled; a job in progress is finished first
    pub async fn run(&mut self, shutdown: CancellationToken) {
        info!(
            worker = %self.config.worker_name,
            "Starting worker agent (poll interval: {:?})",
            self.config.poll_interval()
        );

        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = self.register() => {}
        }

        while !shutdown.is_cancelled() {
            let pause = match self.poll_once().await {
                Ok(PollOutcome::Executed { job_id, outcome }) => {
                    debug!(job_id = %job_id, "Job done: {:?}", outcome);
                    false
                }
                Ok(PollOutcome::Idle) => {
                    debug!("No pending jobs");
                    true
                }
                Ok(PollOutcome::Declined(_) | PollOutcome::Conflict(_)) => true,
                Err(e) => {
                    warn!("Poll failed: {}", e);
                    true
                }
            };

            if pause {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.config.poll_interval()) => {}
                }
            }
        }

        info!("Worker agent stopped");
    }

    /// Lists pending jobs and handles at most one of them
    pub async fn poll_once(&mut self) -> PipelineResult<PollOutcome> {
        let pending = self.jobs.list_pending().await?;

        // Forget declined jobs that are no longer pending
        self.declined
            .retain(|id| pending.iter().any(|job| job.id == *id));

        let Some(job) = select_job(&pending, &self.declined) else {
            return Ok(PollOutcome::Idle);
        };

        if !self.decision.should_accept(&job).await {
            info!(job_id = %job.id, "Declined job '{}'", job.name);
            self.declined.insert(job.id);
            return Ok(PollOutcome::Declined(job.id));
        }

        let accepted = match self.accept(&job).await {
            Ok(accepted) => accepted,
            Err(PipelineError::Conflict) => {
                info!(job_id = %job.id, "Job was accepted by another worker");
                return Ok(PollOutcome::Conflict(job.id));
            }
            Err(e) => return Err(e),
        };

        info!(job_id = %job.id, "Accepted job '{}'", job.name);
        let outcome = self.executor.execute(&job, &accepted.image_tag).await;

        Ok(PollOutcome::Executed {
            job_id: job.id,
            outcome,
        })
    }

    async fn accept(&self, job: &JobDescriptor) -> PipelineResult<AcceptedJob> {
        self.jobs
            .accept(job.id, &self.config.worker_name)
            .await
            .map_err(|e| {
                if e.is_conflict() {
                    PipelineError::Conflict
                } else {
                    PipelineError::Transport(e)
                }
            })
    }

    /// Registers this worker, retrying with exponential backoff
    ///
    /// Registration is informational; giving up only logs a warning.
    async fn register(&self) {
        const MAX_RETRIES: u32 = 5;
        const INITIAL_DELAY_MS: u64 = 500;
        const MAX_DELAY_MS: u64 = 8_000;

        let mut delay_ms = INITIAL_DELAY_MS;

        for attempt in 1..=MAX_RETRIES {
            match self.workers.register(&self.config.worker_name).await {
                Ok(registered) => {
                    info!(
                        worker = %self.config.worker_name,
                        "Registered with coordinator as {}",
                        registered.worker_id
                    );
                    return;
                }
                Err(e) if e.is_unauthorized() => {
                    warn!("Coordinator rejected the worker token, check `token` in the config");
                    return;
                }
                Err(e) if e.is_client_error() => {
                    warn!("Worker registration rejected: {}", e);
                    return;
                }
                Err(e) => {
                    warn!(
                        "Failed to register with coordinator (attempt {}/{}): {}",
                        attempt, MAX_RETRIES, e
                    );
                }
            }

            if attempt < MAX_RETRIES {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                delay_ms = (delay_ms * 2).min(MAX_DELAY_MS);
            }
        }

        warn!("Continuing without registration");
    }
}

/// Oldest pending job this worker has not declined
fn select_job(pending: &[JobDescriptor], declined: &HashSet<Uuid>) -> Option<JobDescriptor> {
    pending
        .iter()
        .filter(|job| !declined.contains(&job.id))
        .min_by_key(|job| job.created_at)
        .cloned()
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, Utc};
    use mljob_client::{ClientError, Result as ClientResult};
    use mljob_core::domain::job::JobStatus;
    use mljob_core::dto::artifact::UploadedArtifact;
    use mljob_core::dto::worker::WorkerRegistered;

    use super::*;
    use crate::service::decision::AutoAccept;
    use crate::service::harvest::HarvestReport;

    fn descriptor(name: &str, age_secs: i64) -> JobDescriptor {
        let id = Uuid::new_v4();
        JobDescriptor {
            id,
            name: name.to_string(),
            bundle_reference: format!("{}.zip", id),
            main_entry: "main.py".to_string(),
            requirements_file: "requirements.txt".to_string(),
            image_tag: format!("mljob-{}:latest", id),
            created_at: Utc::now() - ChronoDuration::seconds(age_secs),
        }
    }

    #[derive(Default)]
    struct FakeCoordinator {
        pending: Mutex<Vec<JobDescriptor>>,
        taken: Mutex<HashSet<Uuid>>,
        unreachable: bool,
        reject_token: bool,
        registrations: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl JobRepository for FakeCoordinator {
        async fn list_pending(&self) -> ClientResult<Vec<JobDescriptor>> {
            if self.unreachable {
                return Err(ClientError::api_error(502, "bad gateway"));
            }
            Ok(self.pending.lock().unwrap().clone())
        }

        async fn accept(&self, job_id: Uuid, _: &str) -> ClientResult<AcceptedJob> {
            if !self.taken.lock().unwrap().insert(job_id) {
                return Err(ClientError::api_error(409, r#"{"error":"not pending"}"#));
            }
            self.pending.lock().unwrap().retain(|job| job.id != job_id);
            Ok(AcceptedJob {
                image_tag: format!("mljob-{}:latest", job_id),
            })
        }

        async fn update_status(&self, _: Uuid, _: JobStatus, _: &str) -> ClientResult<()> {
            Ok(())
        }

        async fn download_bundle(&self, _: Uuid, _: &Path) -> ClientResult<u64> {
            unreachable!()
        }

        async fn upload_artifact(&self, _: Uuid, _: &Path) -> ClientResult<UploadedArtifact> {
            unreachable!()
        }
    }

    #[async_trait]
    impl WorkerRepository for FakeCoordinator {
        async fn register(&self, name: &str) -> ClientResult<WorkerRegistered> {
            self.registrations.lock().unwrap().push(name.to_string());
            if self.reject_token {
                return Err(ClientError::api_error(401, r#"{"error":"Unauthorized"}"#));
            }
            Ok(WorkerRegistered {
                worker_id: Uuid::new_v4(),
            })
        }
    }

    #[derive(Default)]
    struct FakeExecutor {
        executed: Mutex<Vec<(Uuid, String)>>,
    }

    #[async_trait]
    impl ExecutionService for FakeExecutor {
        async fn execute(&self, job: &JobDescriptor, image_tag: &str) -> JobOutcome {
            self.executed
                .lock()
                .unwrap()
                .push((job.id, image_tag.to_string()));
            JobOutcome::Completed(HarvestReport::default())
        }
    }

    /// Declines jobs by name
    struct DeclineNamed(&'static str);

    #[async_trait]
    impl AcceptDecision for DeclineNamed {
        async fn should_accept(&self, job: &JobDescriptor) -> bool {
            job.name != self.0
        }
    }

    fn agent(
        coordinator: Arc<FakeCoordinator>,
        executor: Arc<FakeExecutor>,
        decision: Box<dyn AcceptDecision>,
    ) -> WorkerAgent {
        let config = Config {
            worker_name: "gpu-1".to_string(),
            poll_interval_sec: 1,
            ..Config::default()
        };
        WorkerAgent::new(config, coordinator.clone(), coordinator, decision, executor)
    }

    #[test]
    fn test_select_job_is_fifo_and_skips_declined() {
        let newest = descriptor("newest", 1);
        let oldest = descriptor("oldest", 30);
        let middle = descriptor("middle", 10);
        let pending = vec![newest.clone(), oldest.clone(), middle.clone()];

        let mut declined = HashSet::new();
        assert_eq!(select_job(&pending, &declined).unwrap().id, oldest.id);

        declined.insert(oldest.id);
        assert_eq!(select_job(&pending, &declined).unwrap().id, middle.id);

        assert!(select_job(&[], &declined).is_none());
    }

    #[tokio::test]
    async fn test_poll_once_idle() {
        let coordinator = Arc::new(FakeCoordinator::default());
        let executor = Arc::new(FakeExecutor::default());
        let mut agent = agent(coordinator, executor, Box::new(AutoAccept));

        assert_eq!(agent.poll_once().await.unwrap(), PollOutcome::Idle);
    }

    #[tokio::test]
    async fn test_poll_once_accepts_and_executes() {
        let job = descriptor("train", 5);
        let coordinator = Arc::new(FakeCoordinator::default());
        coordinator.pending.lock().unwrap().push(job.clone());
        let executor = Arc::new(FakeExecutor::default());
        let mut agent = agent(coordinator.clone(), executor.clone(), Box::new(AutoAccept));

        let outcome = agent.poll_once().await.unwrap();

        assert!(matches!(outcome, PollOutcome::Executed { job_id, .. } if job_id == job.id));
        assert_eq!(
            *executor.executed.lock().unwrap(),
            vec![(job.id, format!("mljob-{}:latest", job.id))]
        );
    }

    #[tokio::test]
    async fn test_declined_job_is_skipped_next_time() {
        let skipped = descriptor("skip-me", 60);
        let wanted = descriptor("train", 5);
        let coordinator = Arc::new(FakeCoordinator::default());
        coordinator
            .pending
            .lock()
            .unwrap()
            .extend([skipped.clone(), wanted.clone()]);
        let executor = Arc::new(FakeExecutor::default());
        let mut agent = agent(
            coordinator.clone(),
            executor.clone(),
            Box::new(DeclineNamed("skip-me")),
        );

        assert_eq!(
            agent.poll_once().await.unwrap(),
            PollOutcome::Declined(skipped.id)
        );
        assert!(matches!(
            agent.poll_once().await.unwrap(),
            PollOutcome::Executed { job_id, .. } if job_id == wanted.id
        ));
        assert_eq!(agent.poll_once().await.unwrap(), PollOutcome::Idle);
        assert_eq!(executor.executed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_conflict_abandons_job() {
        let job = descriptor("train", 5);
        let coordinator = Arc::new(FakeCoordinator::default());
        coordinator.pending.lock().unwrap().push(job.clone());
        coordinator.taken.lock().unwrap().insert(job.id);
        let executor = Arc::new(FakeExecutor::default());
        let mut agent = agent(coordinator, executor.clone(), Box::new(AutoAccept));

        assert_eq!(
            agent.poll_once().await.unwrap(),
            PollOutcome::Conflict(job.id)
        );
        assert!(executor.executed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transport_error_surfaces() {
        let coordinator = Arc::new(FakeCoordinator {
            unreachable: true,
            ..Default::default()
        });
        let executor = Arc::new(FakeExecutor::default());
        let mut agent = agent(coordinator, executor, Box::new(AutoAccept));

        let err = agent.poll_once().await.unwrap_err();
        assert!(matches!(err, PipelineError::Transport(_)));
    }

    #[tokio::test]
    async fn test_run_registers_and_stops_on_shutdown() {
        let coordinator = Arc::new(FakeCoordinator::default());
        let executor = Arc::new(FakeExecutor::default());
        let mut agent = agent(coordinator.clone(), executor, Box::new(AutoAccept));

        let shutdown = CancellationToken::new();
        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        tokio::time::timeout(Duration::from_secs(5), agent.run(shutdown))
            .await
            .unwrap();

        assert_eq!(*coordinator.registrations.lock().unwrap(), vec!["gpu-1"]);
    }

    #[tokio::test]
    async fn test_rejected_token_is_not_retried() {
        let coordinator = Arc::new(FakeCoordinator {
            reject_token: true,
            ..Default::default()
        });
        let executor = Arc::new(FakeExecutor::default());
        let agent = agent(coordinator.clone(), executor, Box::new(AutoAccept));

        tokio::time::timeout(Duration::from_secs(1), agent.register())
            .await
            .unwrap();

        assert_eq!(coordinator.registrations.lock().unwrap().len(), 1);
    }
}

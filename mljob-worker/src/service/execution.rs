//! Execution service
//!
//! Runs one accepted job end to end:
//! - Fetch, extract and prepare the bundle
//! - Build the image
//! - Run the container with the job's output directory mounted
//! - Relay its output, wait for exit, harvest artifacts
//!
//! Every stage error ends up as a `failed` report whose note is the error
//! text, preceded by a `[WORKER ERROR]` log line.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use mljob_core::domain::job::JobStatus;
use mljob_core::dto::job::JobDescriptor;
use tokio::time::timeout;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::context::JobWorkspace;
use crate::error::{PipelineError, PipelineResult};
use crate::repository::{JobRepository, LogRepository};
use crate::runtime::{
    CONTAINER_OUTPUTS_DIR, ContainerHandle, ContainerRuntime, RunSpec, VolumeBinding,
};
use crate::service::bundle::{self, DockerfileSource, DockerfileSpec};
use crate::service::harvest::{self, HarvestReport};
use crate::service::relay::LogRelay;

/// How a job ended, as reported to the coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed(HarvestReport),
    Failed(String),
}

#[async_trait]
pub trait ExecutionService: Send + Sync {
    /// Runs an accepted job and reports its final status
    async fn execute(&self, job: &JobDescriptor, image_tag: &str) -> JobOutcome;
}

pub struct ContainerExecutionService {
    config: Config,
    jobs: Arc<dyn JobRepository>,
    logs: Arc<dyn LogRepository>,
    runtime: Arc<dyn ContainerRuntime>,
}

impl ContainerExecutionService {
    pub fn new(
        config: Config,
        jobs: Arc<dyn JobRepository>,
        logs: Arc<dyn LogRepository>,
        runtime: Arc<dyn ContainerRuntime>,
    ) -> Self {
        Self {
            config,
            jobs,
            logs,
            runtime,
        }
    }

    /// Best-effort status report
    async fn report(&self, job_id: Uuid, status: JobStatus, note: &str) {
        if let Err(e) = self.jobs.update_status(job_id, status, note).await {
            warn!(job_id = %job_id, "Failed to report status {} ({}): {}", status, note, e);
        }
    }

    async fn run_pipeline(
        &self,
        job: &JobDescriptor,
        image_tag: &str,
        workspace: &JobWorkspace,
        relay: &LogRelay,
    ) -> PipelineResult<HarvestReport> {
        let config = &self.config;
        let context_dir = workspace.context_dir();

        bundle::fetch(
            self.jobs.as_ref(),
            job.id,
            &workspace.zip_path(),
            config.download_retries,
            config.retry_delay(),
        )
        .await?;

        let files = bundle::extract(&workspace.zip_path(), &context_dir).await?;
        info!(job_id = %job.id, "Extracted {} file(s)", files);

        let source = bundle::ensure_dockerfile(
            &context_dir,
            &DockerfileSpec {
                base_image: &config.base_image,
                main_entry: &job.main_entry,
                requirements_file: &job.requirements_file,
                entry_command: &config.entry_command,
            },
        )
        .await?;
        if let DockerfileSource::Generated {
            installs_requirements,
        } = source
        {
            info!(
                job_id = %job.id,
                "Generated Dockerfile from {} (installs requirements: {})",
                config.base_image,
                installs_requirements
            );
        }

        self.report(job.id, JobStatus::Running, "Building Docker image").await;
        let built = timeout(
            config.build_timeout(),
            self.runtime.build(&context_dir, image_tag),
        )
        .await
        .map_err(|_| PipelineError::Timeout {
            stage: "image build",
            secs: config.build_timeout_secs,
        })??;
        relay.send_all(built.output_lines);

        self.report(job.id, JobStatus::Running, "Starting container").await;
        let spec = RunSpec {
            command: Vec::new(),
            env: config.docker_run_env.clone(),
            network: config.docker_network.clone(),
            binds: vec![VolumeBinding::new(
                workspace.outputs_dir(),
                CONTAINER_OUTPUTS_DIR,
            )],
            name: Some(format!("mljob-{}", job.id)),
        };
        let handle = self.runtime.run(&built.image, &spec).await?;
        info!(job_id = %job.id, "Started container {}", handle.short_id());

        self.report(job.id, JobStatus::Running, "Streaming logs").await;
        let exit = timeout(config.run_timeout(), self.follow(&handle, relay)).await;

        if exit.is_err() {
            warn!(job_id = %job.id, "Run timeout reached, stopping container");
            if let Err(e) = self.runtime.stop(&handle).await {
                warn!(job_id = %job.id, "Failed to stop container: {}", e);
            }
        }
        self.remove_container(&handle).await;

        let exit_code = exit.map_err(|_| PipelineError::Timeout {
            stage: "container run",
            secs: config.run_timeout_secs,
        })??;

        if exit_code != 0 {
            return Err(PipelineError::NonZeroExit(exit_code));
        }

        Ok(harvest::harvest(self.jobs.as_ref(), job.id, workspace.outputs_dir()).await?)
    }

    /// Relays container output until it stops, then collects the exit code
    async fn follow(&self, handle: &ContainerHandle, relay: &LogRelay) -> PipelineResult<i64> {
        let mut lines = self.runtime.stream_logs(handle).await?;

        while let Some(line) = lines.next().await {
            match line {
                Ok(line) => relay.send(line),
                // A bad chunk costs that chunk only
                Err(e) => {
                    warn!("Skipping unreadable output of {}: {}", handle.short_id(), e);
                }
            }
        }

        Ok(self.runtime.wait(handle).await?)
    }

    async fn remove_container(&self, handle: &ContainerHandle) {
        if let Err(e) = self.runtime.remove(handle).await {
            warn!("Failed to remove container {}: {}", handle.short_id(), e);
        }
    }
}

#[async_trait]
impl ExecutionService for ContainerExecutionService {
    async fn execute(&self, job: &JobDescriptor, image_tag: &str) -> JobOutcome {
        info!(job_id = %job.id, "Executing job '{}'", job.name);

        let relay = LogRelay::start(
            job.id,
            Arc::clone(&self.logs),
            self.config.log_flush_interval(),
            self.config.log_batch_size,
        );

        let result = match JobWorkspace::create(
            job.id,
            &self.config.work_root(),
            &self.config.outputs_root,
        ) {
            Ok(workspace) => {
                let result = self.run_pipeline(job, image_tag, &workspace, &relay).await;
                if let Err(e) = workspace.cleanup() {
                    warn!(job_id = %job.id, "Failed to clean up workspace: {}", e);
                }
                result
            }
            Err(e) => Err(PipelineError::Workspace(e)),
        };

        let (status, note, outcome) = match result {
            Ok(report) => {
                let note = format!("Container finished; {}", report.summary());
                (JobStatus::Completed, note, JobOutcome::Completed(report))
            }
            Err(e) => {
                error!(job_id = %job.id, "Job failed: {}", e);
                relay.send_all(e.output_lines().iter().cloned());
                relay.send(format!("[WORKER ERROR] {}", e));
                let note = e.to_string();
                (JobStatus::Failed, note.clone(), JobOutcome::Failed(note))
            }
        };

        relay.finish().await;
        self.report(job.id, status, &note).await;

        info!(job_id = %job.id, "Job finished: {}", note);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use std::time::Duration;

    use chrono::Utc;
    use futures_util::stream;
    use mljob_client::{ClientError, Result as ClientResult};
    use mljob_core::dto::artifact::UploadedArtifact;
    use mljob_core::dto::job::AcceptedJob;
    use zip::write::SimpleFileOptions;

    use super::*;
    use crate::runtime::{BuildOutput, LogStream, RuntimeError};
    use crate::service::bundle::BundleError;

    fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        for (name, content) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    struct FakeJobs {
        bundle: Vec<u8>,
        statuses: Mutex<Vec<(JobStatus, String)>>,
        uploads: Mutex<Vec<String>>,
    }

    impl FakeJobs {
        fn new(bundle: Vec<u8>) -> Arc<Self> {
            Arc::new(Self {
                bundle,
                statuses: Mutex::new(Vec::new()),
                uploads: Mutex::new(Vec::new()),
            })
        }

        fn statuses(&self) -> Vec<(JobStatus, String)> {
            self.statuses.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl JobRepository for FakeJobs {
        async fn list_pending(&self) -> ClientResult<Vec<JobDescriptor>> {
            Ok(Vec::new())
        }

        async fn accept(&self, _: Uuid, _: &str) -> ClientResult<AcceptedJob> {
            Err(ClientError::api_error(409, "taken"))
        }

        async fn update_status(&self, _: Uuid, status: JobStatus, note: &str) -> ClientResult<()> {
            self.statuses
                .lock()
                .unwrap()
                .push((status, note.to_string()));
            Ok(())
        }

        async fn download_bundle(&self, _: Uuid, dest: &Path) -> ClientResult<u64> {
            std::fs::write(dest, &self.bundle)?;
            Ok(self.bundle.len() as u64)
        }

        async fn upload_artifact(&self, _: Uuid, path: &Path) -> ClientResult<UploadedArtifact> {
            let name = path.file_name().unwrap().to_string_lossy().to_string();
            self.uploads.lock().unwrap().push(name.clone());
            Ok(UploadedArtifact {
                filename: name,
                size: 0,
            })
        }
    }

    #[derive(Default)]
    struct FakeLogs {
        lines: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LogRepository for FakeLogs {
        async fn send_lines(&self, _: Uuid, lines: Vec<String>) -> ClientResult<()> {
            self.lines.lock().unwrap().extend(lines);
            Ok(())
        }
    }

    /// Records calls; `run` drops `model.pt` into the mounted outputs dir
    #[derive(Default)]
    struct FakeRuntime {
        fail_build: bool,
        exit_code: i64,
        hang: bool,
        bad_chunk: bool,
        calls: Mutex<Vec<String>>,
        spec: Mutex<Option<RunSpec>>,
    }

    impl FakeRuntime {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: &str) {
            self.calls.lock().unwrap().push(call.to_string());
        }
    }

    #[async_trait]
    impl ContainerRuntime for FakeRuntime {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn probe(&self) -> std::result::Result<String, RuntimeError> {
            Ok("fake 1.0".to_string())
        }

        async fn build(
            &self,
            context_dir: &Path,
            tag: &str,
        ) -> std::result::Result<BuildOutput, RuntimeError> {
            self.record("build");
            assert!(context_dir.join("Dockerfile").exists());
            if self.fail_build {
                return Err(RuntimeError::Build {
                    reason: "pip install failed".to_string(),
                    output: vec!["Step 4/5 : RUN pip install".to_string()],
                });
            }
            Ok(BuildOutput {
                image: tag.to_string(),
                output_lines: vec!["Successfully built".to_string()],
            })
        }

        async fn run(
            &self,
            _image: &str,
            spec: &RunSpec,
        ) -> std::result::Result<ContainerHandle, RuntimeError> {
            self.record("run");
            let host: PathBuf = spec.binds[0].host.clone();
            std::fs::write(host.join("model.pt"), "weights").unwrap();
            *self.spec.lock().unwrap() = Some(spec.clone());
            Ok(ContainerHandle {
                id: "0123456789abcdef".to_string(),
            })
        }

        async fn stream_logs(
            &self,
            _handle: &ContainerHandle,
        ) -> std::result::Result<LogStream, RuntimeError> {
            self.record("logs");
            if self.hang {
                return Ok(stream::pending().boxed());
            }
            if self.bad_chunk {
                return Ok(stream::iter(vec![
                    Ok("epoch 1".to_string()),
                    Err(RuntimeError::Logs("stream did not contain valid UTF-8".to_string())),
                    Ok("epoch 3".to_string()),
                ])
                .boxed());
            }
            Ok(stream::iter(vec![Ok("epoch 1".to_string()), Ok("epoch 2".to_string())]).boxed())
        }

        async fn wait(&self, _handle: &ContainerHandle) -> std::result::Result<i64, RuntimeError> {
            self.record("wait");
            Ok(self.exit_code)
        }

        async fn stop(&self, _handle: &ContainerHandle) -> std::result::Result<(), RuntimeError> {
            self.record("stop");
            Ok(())
        }

        async fn remove(&self, _handle: &ContainerHandle) -> std::result::Result<(), RuntimeError> {
            self.record("remove");
            Ok(())
        }
    }

    struct Harness {
        jobs: Arc<FakeJobs>,
        logs: Arc<FakeLogs>,
        runtime: Arc<FakeRuntime>,
        service: ContainerExecutionService,
        root: tempfile::TempDir,
    }

    fn harness(bundle: Vec<u8>, runtime: FakeRuntime) -> Harness {
        let root = tempfile::tempdir().unwrap();
        let mut config = Config {
            work_dir: Some(root.path().join("work")),
            outputs_root: root.path().join("outputs"),
            docker_network: Some("none".to_string()),
            download_retries: 0,
            retry_delay_secs: 0,
            log_flush_interval_ms: 10,
            run_timeout_secs: 1,
            ..Config::default()
        };
        config
            .docker_run_env
            .insert("EPOCHS".to_string(), "2".to_string());

        let jobs = FakeJobs::new(bundle);
        let logs = Arc::new(FakeLogs::default());
        let runtime = Arc::new(runtime);
        let service =
            ContainerExecutionService::new(config, jobs.clone(), logs.clone(), runtime.clone());

        Harness {
            jobs,
            logs,
            runtime,
            service,
            root,
        }
    }

    fn descriptor() -> JobDescriptor {
        let id = Uuid::new_v4();
        JobDescriptor {
            id,
            name: "mnist".to_string(),
            bundle_reference: format!("{}.zip", id),
            main_entry: "main.py".to_string(),
            requirements_file: "requirements.txt".to_string(),
            image_tag: format!("mljob-{}:latest", id),
            created_at: Utc::now(),
        }
    }

    fn project() -> Vec<u8> {
        zip_bytes(&[("main.py", "print('training')\n")])
    }

    #[tokio::test]
    async fn test_successful_job_reports_each_stage() {
        let h = harness(project(), FakeRuntime::default());
        let job = descriptor();

        let outcome = h.service.execute(&job, &job.image_tag).await;

        let JobOutcome::Completed(report) = outcome else {
            panic!("expected completion, got {:?}", outcome);
        };
        assert_eq!(report.uploaded, vec!["model.pt"]);

        let statuses = h.jobs.statuses();
        assert_eq!(
            statuses,
            vec![
                (JobStatus::Running, "Building Docker image".to_string()),
                (JobStatus::Running, "Starting container".to_string()),
                (JobStatus::Running, "Streaming logs".to_string()),
                (
                    JobStatus::Completed,
                    "Container finished; uploaded 1 artifact(s)".to_string()
                ),
            ]
        );

        assert_eq!(
            *h.logs.lines.lock().unwrap(),
            vec!["Successfully built", "epoch 1", "epoch 2"]
        );
        assert_eq!(
            h.runtime.calls(),
            vec!["build", "run", "logs", "wait", "remove"]
        );

        let spec = h.runtime.spec.lock().unwrap().clone().unwrap();
        assert_eq!(spec.binds[0].container, "/app/outputs");
        assert!(spec.binds[0].host.ends_with(format!("job-{}", job.id)));
        assert_eq!(spec.network.as_deref(), Some("none"));
        assert_eq!(spec.env.get("EPOCHS"), Some(&"2".to_string()));

        // Harvested file is gone and the empty outputs dir was removed
        assert!(!h.root.path().join("outputs").join(format!("job-{}", job.id)).exists());
    }

    #[tokio::test]
    async fn test_build_failure_skips_run_and_harvest() {
        let runtime = FakeRuntime {
            fail_build: true,
            ..Default::default()
        };
        let h = harness(project(), runtime);
        let job = descriptor();

        let outcome = h.service.execute(&job, &job.image_tag).await;

        assert_eq!(
            outcome,
            JobOutcome::Failed("image build failed: pip install failed".to_string())
        );
        assert_eq!(h.runtime.calls(), vec!["build"]);
        assert!(h.jobs.uploads.lock().unwrap().is_empty());

        let lines = h.logs.lines.lock().unwrap().clone();
        assert_eq!(
            lines,
            vec![
                "Step 4/5 : RUN pip install",
                "[WORKER ERROR] image build failed: pip install failed"
            ]
        );

        let statuses = h.jobs.statuses();
        assert_eq!(
            statuses.last(),
            Some(&(
                JobStatus::Failed,
                "image build failed: pip install failed".to_string()
            ))
        );
    }

    #[tokio::test]
    async fn test_non_zero_exit_fails_without_harvest() {
        let runtime = FakeRuntime {
            exit_code: 2,
            ..Default::default()
        };
        let h = harness(project(), runtime);
        let job = descriptor();

        let outcome = h.service.execute(&job, &job.image_tag).await;

        assert_eq!(
            outcome,
            JobOutcome::Failed("container exited with code 2".to_string())
        );
        assert!(h.jobs.uploads.lock().unwrap().is_empty());
        assert!(h.runtime.calls().contains(&"remove".to_string()));

        // Outputs stay on disk for inspection
        let outputs = h.root.path().join("outputs").join(format!("job-{}", job.id));
        assert!(outputs.join("model.pt").exists());
    }

    #[tokio::test]
    async fn test_traversal_bundle_fails_before_build() {
        let bundle = zip_bytes(&[("main.py", "x"), ("../../etc/passwd", "root")]);
        let h = harness(bundle, FakeRuntime::default());
        let job = descriptor();

        let outcome = h.service.execute(&job, &job.image_tag).await;

        let expected = BundleError::PathTraversal("../../etc/passwd".to_string()).to_string();
        assert_eq!(outcome, JobOutcome::Failed(expected.clone()));
        assert!(h.runtime.calls().is_empty());
        assert_eq!(h.jobs.statuses(), vec![(JobStatus::Failed, expected)]);
    }

    #[tokio::test]
    async fn test_run_timeout_stops_container() {
        let runtime = FakeRuntime {
            hang: true,
            ..Default::default()
        };
        let h = harness(project(), runtime);
        let job = descriptor();

        let outcome = tokio::time::timeout(
            Duration::from_secs(10),
            h.service.execute(&job, &job.image_tag),
        )
        .await
        .unwrap();

        assert_eq!(
            outcome,
            JobOutcome::Failed("container run timed out after 1s".to_string())
        );
        assert_eq!(
            h.runtime.calls(),
            vec!["build", "run", "logs", "stop", "remove"]
        );
        assert!(h.jobs.uploads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_chunk_keeps_following() {
        let runtime = FakeRuntime {
            bad_chunk: true,
            ..Default::default()
        };
        let h = harness(project(), runtime);
        let job = descriptor();

        let outcome = h.service.execute(&job, &job.image_tag).await;

        assert!(matches!(outcome, JobOutcome::Completed(_)));
        assert_eq!(
            *h.logs.lines.lock().unwrap(),
            vec!["Successfully built", "epoch 1", "epoch 3"]
        );
        assert_eq!(
            h.runtime.calls(),
            vec!["build", "run", "logs", "wait", "remove"]
        );
    }
}

//! Container runtime
//!
//! One trait over the two supported backends: the Docker Engine API
//! (`DockerSdkRuntime`) and a docker-compatible binary
//! (`DockerCliRuntime`). The backend is picked once at startup and the
//! rest of the worker only sees `Arc<dyn ContainerRuntime>`.

mod cli;
mod sdk;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use thiserror::Error;
use tracing::info;

pub use cli::DockerCliRuntime;
pub use sdk::DockerSdkRuntime;

use crate::config::{Config, RuntimeKind};

/// Mount point of the per-job output directory inside the container
pub const CONTAINER_OUTPUTS_DIR: &str = "/app/outputs";

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("container runtime unavailable: {0}")]
    Unavailable(String),

    #[error("image build failed: {reason}")]
    Build { reason: String, output: Vec<String> },

    #[error("failed to start container: {0}")]
    Run(String),

    #[error("failed to read container logs: {0}")]
    Logs(String),

    #[error("container operation failed: {0}")]
    Container(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Docker(#[from] bollard::errors::Error),
}

/// A successfully built image and the build's output
#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub image: String,
    pub output_lines: Vec<String>,
}

/// Host directory mounted into the container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeBinding {
    pub host: PathBuf,
    pub container: String,
}

impl VolumeBinding {
    pub fn new(host: impl Into<PathBuf>, container: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            container: container.into(),
        }
    }

    /// `host:container`, as both backends spell it
    pub fn to_bind(&self) -> String {
        format!("{}:{}", self.host.display(), self.container)
    }
}

/// How to start a job container
#[derive(Debug, Clone, Default)]
pub struct RunSpec {
    /// Overrides the image `CMD` when non-empty
    pub command: Vec<String>,
    pub env: HashMap<String, String>,
    pub network: Option<String>,
    pub binds: Vec<VolumeBinding>,
    pub name: Option<String>,
}

impl RunSpec {
    /// `KEY=VALUE` pairs in a stable order
    pub fn env_pairs(&self) -> Vec<String> {
        let mut pairs: Vec<String> = self
            .env
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect();
        pairs.sort();
        pairs
    }
}

/// A started container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    pub id: String,
}

impl ContainerHandle {
    pub fn short_id(&self) -> &str {
        &self.id[..12.min(self.id.len())]
    }
}

/// Container output, one line per item, ending when the container stops
pub type LogStream = BoxStream<'static, Result<String, RuntimeError>>;

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &'static str;

    /// Checks the backend is reachable and returns its version
    async fn probe(&self) -> Result<String, RuntimeError>;

    /// Builds `context_dir` (which holds a `Dockerfile`) into `tag`
    async fn build(&self, context_dir: &Path, tag: &str) -> Result<BuildOutput, RuntimeError>;

    /// Starts a detached container from `image`
    async fn run(&self, image: &str, spec: &RunSpec) -> Result<ContainerHandle, RuntimeError>;

    /// Follows stdout and stderr, merged
    async fn stream_logs(&self, handle: &ContainerHandle) -> Result<LogStream, RuntimeError>;

    /// Waits for the container to exit and returns its exit code
    async fn wait(&self, handle: &ContainerHandle) -> Result<i64, RuntimeError>;

    async fn stop(&self, handle: &ContainerHandle) -> Result<(), RuntimeError>;

    async fn remove(&self, handle: &ContainerHandle) -> Result<(), RuntimeError>;
}

/// Creates the configured backend and probes it once
pub async fn build_runtime(config: &Config) -> anyhow::Result<Arc<dyn ContainerRuntime>> {
    let runtime: Arc<dyn ContainerRuntime> = match config.runtime {
        RuntimeKind::Sdk => Arc::new(DockerSdkRuntime::connect()?),
        RuntimeKind::Cli => Arc::new(DockerCliRuntime::new(config.docker_binary.clone())),
    };

    let version = runtime.probe().await?;
    info!("Container runtime '{}' is available: {}", runtime.name(), version);

    Ok(runtime)
}

/// Splits raw output chunks into lines
///
/// A chunk may end mid-line; the tail is held until the next chunk or
/// `finish`.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: String,
}

impl LineBuffer {
    /// Feeds a chunk and returns the lines it completed
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        self.pending.push_str(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.find('\n') {
            let line: String = self.pending.drain(..=pos).collect();
            lines.push(line.trim_end_matches(['\n', '\r']).to_string());
        }
        lines
    }

    /// Returns the unterminated tail, if any
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(rest.trim_end_matches('\r').to_string())
    }
}

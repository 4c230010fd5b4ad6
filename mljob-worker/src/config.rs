//! Worker configuration
//!
//! Settings come from a JSON file (when present), then a handful of
//! environment overrides, then validation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Which container backend executes jobs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeKind {
    /// Docker Engine API through bollard
    Sdk,
    /// A `docker`-compatible binary
    #[default]
    Cli,
}

/// How the worker decides whether to take a pending job
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AcceptMode {
    /// Ask the operator on stdin
    #[default]
    Prompt,
    /// Take every job
    Auto,
}

/// Worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Coordinator base URL (e.g., "http://localhost:8080")
    pub server_url: String,

    /// Shared bearer token
    pub token: String,

    /// Name this worker registers and accepts jobs under
    pub worker_name: String,

    /// Seconds between polls when idle
    pub poll_interval_sec: u64,

    /// Extra environment passed to every job container
    pub docker_run_env: HashMap<String, String>,

    /// Network mode for job containers; `None` keeps the runtime default
    pub docker_network: Option<String>,

    pub runtime: RuntimeKind,

    /// Binary used by the CLI backend (`docker`, `podman`, ...)
    pub docker_binary: String,

    pub accept_mode: AcceptMode,

    /// Parent directory for per-job scratch space; system temp when unset
    pub work_dir: Option<PathBuf>,

    /// Parent directory for per-job output directories
    pub outputs_root: PathBuf,

    /// Base image for synthesized Dockerfiles
    pub base_image: String,

    /// Interpreter prefix for the synthesized `CMD`
    pub entry_command: Vec<String>,

    pub build_timeout_secs: u64,
    pub run_timeout_secs: u64,

    /// Extra attempts after a failed bundle download
    pub download_retries: u32,
    pub retry_delay_secs: u64,

    /// Maximum lines per log request
    pub log_batch_size: usize,
    pub log_flush_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8080".to_string(),
            token: String::new(),
            worker_name: default_worker_name(),
            poll_interval_sec: 5,
            docker_run_env: HashMap::new(),
            docker_network: None,
            runtime: RuntimeKind::default(),
            docker_binary: "docker".to_string(),
            accept_mode: AcceptMode::default(),
            work_dir: None,
            outputs_root: PathBuf::from("./outputs"),
            base_image: "python:3.8".to_string(),
            entry_command: vec!["python".to_string()],
            build_timeout_secs: 1800,
            run_timeout_secs: 3600,
            download_retries: 3,
            retry_delay_secs: 2,
            log_batch_size: 50,
            log_flush_interval_ms: 500,
        }
    }
}

impl Config {
    /// Loads the configuration
    ///
    /// The file is `path` when given, else `MLJOB_WORKER_CONFIG`, else
    /// `config.json`. An explicitly named file must exist; the default one
    /// is optional. Environment overrides:
    /// - MLJOB_SERVER_URL
    /// - MLJOB_TOKEN
    /// - MLJOB_WORKER_NAME
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("MLJOB_WORKER_CONFIG").map(PathBuf::from));

        let mut config = match explicit {
            Some(path) => Self::from_file(&path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Parses a JSON config file; missing fields take their defaults
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("MLJOB_SERVER_URL") {
            self.server_url = url;
        }
        if let Some(token) = lookup("MLJOB_TOKEN") {
            self.token = token;
        }
        if let Some(name) = lookup("MLJOB_WORKER_NAME") {
            self.worker_name = name;
        }
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.worker_name.trim().is_empty() {
            anyhow::bail!("worker_name cannot be empty");
        }

        if !self.server_url.starts_with("http://") && !self.server_url.starts_with("https://") {
            anyhow::bail!("server_url must start with http:// or https://");
        }

        if self.poll_interval_sec == 0 {
            anyhow::bail!("poll_interval_sec must be greater than 0");
        }

        if self.entry_command.is_empty() {
            anyhow::bail!("entry_command cannot be empty");
        }

        if self.runtime == RuntimeKind::Cli && self.docker_binary.trim().is_empty() {
            anyhow::bail!("docker_binary cannot be empty with the cli runtime");
        }

        if self.build_timeout_secs == 0 || self.run_timeout_secs == 0 {
            anyhow::bail!("timeouts must be greater than 0");
        }

        if self.log_batch_size == 0 {
            anyhow::bail!("log_batch_size must be greater than 0");
        }

        if self.log_flush_interval_ms == 0 {
            anyhow::bail!("log_flush_interval_ms must be greater than 0");
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_sec)
    }

    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build_timeout_secs)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn log_flush_interval(&self) -> Duration {
        Duration::from_millis(self.log_flush_interval_ms)
    }

    /// Scratch parent for job workspaces
    pub fn work_root(&self) -> PathBuf {
        self.work_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

fn default_worker_name() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| "mljob-worker".to_string())
}

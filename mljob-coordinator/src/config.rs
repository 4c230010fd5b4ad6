//! Coordinator configuration
//!
//! Everything is read from environment variables so the coordinator can run
//! unchanged in a container.

use std::path::PathBuf;

/// Token accepted when `WORKER_SHARED_TOKEN` is not set
pub const DEFAULT_WORKER_TOKEN: &str = "changeme-worker-token";

/// Coordinator configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres URL; the in-memory store is used when absent
    pub database_url: Option<String>,

    /// Address the HTTP server binds to
    pub bind_addr: String,

    /// Shared bearer token every API call must present
    pub worker_token: String,

    /// Where submitted job archives are kept
    pub bundles_dir: PathBuf,

    /// Where uploaded artifacts are kept, one subdirectory per job
    pub artifacts_dir: PathBuf,

    /// Request body limit for bundle and artifact uploads
    pub max_upload_bytes: usize,
}

impl Config {
    /// Creates configuration from environment variables
    ///
    /// Expected environment variables (all optional):
    /// - DATABASE_URL
    /// - COORDINATOR_BIND_ADDR (default: 0.0.0.0:8080)
    /// - WORKER_SHARED_TOKEN (default: changeme-worker-token)
    /// - JOB_BUNDLES_DIR (default: ./data/bundles)
    /// - ARTIFACTS_DIR (default: ./data/artifacts)
    /// - MAX_UPLOAD_BYTES (default: 512 MiB)
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let max_upload_bytes = match std::env::var("MAX_UPLOAD_BYTES") {
            Ok(raw) => raw
                .parse::<usize>()
                .map_err(|e| anyhow::anyhow!("MAX_UPLOAD_BYTES is not a number: {}", e))?,
            Err(_) => defaults.max_upload_bytes,
        };

        let config = Self {
            database_url: std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            bind_addr: std::env::var("COORDINATOR_BIND_ADDR").unwrap_or(defaults.bind_addr),
            worker_token: std::env::var("WORKER_SHARED_TOKEN").unwrap_or(defaults.worker_token),
            bundles_dir: std::env::var("JOB_BUNDLES_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.bundles_dir),
            artifacts_dir: std::env::var("ARTIFACTS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.artifacts_dir),
            max_upload_bytes,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bind_addr.is_empty() {
            anyhow::bail!("bind_addr cannot be empty");
        }

        if self.worker_token.trim().is_empty() {
            anyhow::bail!("worker_token cannot be empty");
        }

        if self.max_upload_bytes == 0 {
            anyhow::bail!("max_upload_bytes must be greater than 0");
        }

        Ok(())
    }

    pub fn uses_default_token(&self) -> bool {
        self.worker_token == DEFAULT_WORKER_TOKEN
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            bind_addr: "0.0.0.0:8080".to_string(),
            worker_token: DEFAULT_WORKER_TOKEN.to_string(),
            bundles_dir: PathBuf::from("./data/bundles"),
            artifacts_dir: PathBuf::from("./data/artifacts"),
            max_upload_bytes: 512 * 1024 * 1024,
        }
    }
}

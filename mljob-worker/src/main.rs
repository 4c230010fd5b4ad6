//! mljob Worker
//!
//! Polls the coordinator for pending jobs and runs each one in a
//! container built from the job's bundle.
//!
//! Architecture:
//! - Configuration: JSON file, env overrides, validation
//! - Repositories: the coordinator API as seen by a worker
//! - Runtime: container backend (Docker Engine API or docker CLI)
//! - Services: bundle prep, execution, log relay, harvest, accept decision
//! - Scheduler: the polling loop

mod config;
mod context;
mod error;
mod repository;
mod runtime;
mod scheduler;
mod service;
mod shutdown;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::scheduler::WorkerAgent;
use crate::service::ContainerExecutionService;
use crate::service::decision::decision_for;
use mljob_client::CoordinatorClient;

#[derive(Parser, Debug)]
#[command(name = "mljob-worker")]
#[command(about = "Runs mljob training jobs in containers", long_about = None)]
struct Args {
    /// Path to the JSON config file
    #[arg(short, long, env = "MLJOB_WORKER_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mljob_worker=info,mljob_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting mljob worker");

    let args = Args::parse();
    let config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    info!(
        "Loaded configuration: worker_name={}, server_url={}, runtime={:?}, accept_mode={:?}",
        config.worker_name, config.server_url, config.runtime, config.accept_mode
    );

    let client = Arc::new(
        CoordinatorClient::new(config.server_url.clone()).with_token(config.token.clone()),
    );

    let runtime = runtime::build_runtime(&config)
        .await
        .context("Container runtime is not available")?;

    let executor = Arc::new(ContainerExecutionService::new(
        config.clone(),
        client.clone(),
        client.clone(),
        runtime,
    ));

    let shutdown =
        shutdown::install_shutdown_handler().context("Failed to install signal handlers")?;

    let mut agent = WorkerAgent::new(
        config.clone(),
        client.clone(),
        client,
        decision_for(config.accept_mode, shutdown.clone()),
        executor,
    );

    agent.run(shutdown).await;

    info!("Worker stopped");
    Ok(())
}

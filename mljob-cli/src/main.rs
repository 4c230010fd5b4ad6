//! mljob CLI
//!
//! Command-line interface for submitting and inspecting jobs on the
//! mljob coordinator.

mod commands;
mod config;
mod id_resolver;
mod types;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;

#[derive(Parser)]
#[command(name = "mljob")]
#[command(about = "mljob training job CLI", long_about = None)]
struct Cli {
    /// Coordinator URL
    #[arg(
        long,
        env = "MLJOB_COORDINATOR_URL",
        default_value = "http://localhost:8080"
    )]
    coordinator_url: String,

    /// Shared bearer token
    #[arg(long, env = "MLJOB_TOKEN", default_value = "", hide_env_values = true)]
    token: String,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config {
        coordinator_url: cli.coordinator_url,
        token: cli.token,
    };

    handle_command(cli.command, &config).await
}

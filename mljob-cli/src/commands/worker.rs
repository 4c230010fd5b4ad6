//! Worker command handlers

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use mljob_client::CoordinatorClient;
use mljob_core::domain::worker::{Worker, WorkerStatus};

use crate::config::Config;

/// Worker subcommands
#[derive(Subcommand)]
pub enum WorkerCommands {
    /// List all registered workers
    List,
}

pub async fn handle_worker_command(command: WorkerCommands, config: &Config) -> Result<()> {
    let client = config.client();

    match command {
        WorkerCommands::List => list_workers(&client).await,
    }
}

/// List all registered workers
async fn list_workers(client: &CoordinatorClient) -> Result<()> {
    let workers = client.list_workers().await?;

    if workers.is_empty() {
        println!("{}", "No workers registered.".yellow());
    } else {
        println!(
            "{}",
            format!("Found {} registered worker(s):", workers.len()).bold()
        );
        println!();
        for worker in workers {
            print_worker_summary(&worker);
        }
    }

    Ok(())
}

fn print_worker_summary(worker: &Worker) {
    println!("  {} Worker {}", "▸".cyan(), worker.name.bold());
    println!("    ID:           {}", worker.id.to_string().dimmed());
    println!("    Status:       {}", colorize_status(&worker.status));
    println!(
        "    Registered:   {}",
        worker
            .registered_at
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
    println!(
        "    Last Seen:    {}",
        worker
            .last_seen
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
    println!();
}

fn colorize_status(status: &WorkerStatus) -> ColoredString {
    let label = status.as_str();
    match status {
        WorkerStatus::Idle => label.green(),
        WorkerStatus::Busy => label.yellow(),
        WorkerStatus::Offline => label.red(),
    }
}

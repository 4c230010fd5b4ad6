//! Job command handlers
//!
//! Submitting bundles and inspecting jobs: listing, details, logs and
//! cancellation.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use colored::*;
use mljob_client::{CoordinatorClient, JobSubmission};
use mljob_core::domain::job::{Job, JobStatus};
use mljob_core::domain::log::{LogEntry, LogLevel};
use mljob_core::dto::job::JobDescriptor;

use crate::config::Config;
use crate::id_resolver::resolve_job_id;
use crate::types::IdOrPrefix;

/// Job subcommands
#[derive(Subcommand)]
pub enum JobCommands {
    /// Submit a zipped project as a new job
    Submit {
        /// Path to the project .zip
        bundle: PathBuf,

        /// Job name
        #[arg(short, long)]
        name: String,

        /// Script started by the generated Dockerfile (default: main.py)
        #[arg(long)]
        main_entry: Option<String>,

        /// pip requirements file inside the bundle (default: requirements.txt)
        #[arg(long)]
        requirements_file: Option<String>,
    },
    /// List all jobs
    List {
        /// Only show jobs with this status
        #[arg(short, long)]
        status: Option<JobStatus>,
    },
    /// List jobs waiting for a worker
    Pending,
    /// Get job details
    Get {
        /// Job ID or unambiguous prefix
        id: String,
    },
    /// Get job logs
    Logs {
        /// Job ID or unambiguous prefix
        id: String,
    },
    /// Cancel a job that has not finished
    Cancel {
        /// Job ID or unambiguous prefix
        id: String,
    },
}

pub async fn handle_job_command(command: JobCommands, config: &Config) -> Result<()> {
    let client = config.client();

    match command {
        JobCommands::Submit {
            bundle,
            name,
            main_entry,
            requirements_file,
        } => {
            let submission = JobSubmission {
                name,
                main_entry,
                requirements_file,
            };
            submit_job(&client, submission, bundle).await
        }
        JobCommands::List { status } => list_jobs(&client, status).await,
        JobCommands::Pending => list_pending_jobs(&client).await,
        JobCommands::Get { id } => get_job(&client, &id).await,
        JobCommands::Logs { id } => get_job_logs(&client, &id).await,
        JobCommands::Cancel { id } => cancel_job(&client, &id).await,
    }
}

async fn submit_job(
    client: &CoordinatorClient,
    submission: JobSubmission,
    bundle: PathBuf,
) -> Result<()> {
    if !bundle.is_file() {
        bail!("Bundle not found: {}", bundle.display());
    }

    let job = client
        .create_job(submission, &bundle)
        .await
        .with_context(|| format!("Failed to submit {}", bundle.display()))?;

    println!("{} {}", "✓ Job submitted:".green().bold(), job.id.to_string().cyan());
    println!();
    print_job_details(&job);

    Ok(())
}

async fn list_jobs(client: &CoordinatorClient, status: Option<JobStatus>) -> Result<()> {
    let jobs: Vec<Job> = client
        .list_jobs()
        .await?
        .into_iter()
        .filter(|job| status.is_none_or(|s| job.status == s))
        .collect();

    if jobs.is_empty() {
        println!("{}", "No jobs found.".yellow());
    } else {
        println!("{}", format!("Found {} job(s):", jobs.len()).bold());
        println!();
        for job in jobs {
            print_job_summary(&job);
        }
    }

    Ok(())
}

async fn list_pending_jobs(client: &CoordinatorClient) -> Result<()> {
    let jobs = client.list_pending_jobs().await?;

    if jobs.is_empty() {
        println!("{}", "No pending jobs.".yellow());
    } else {
        println!("{}", format!("Found {} pending job(s):", jobs.len()).bold());
        println!();
        for job in jobs {
            print_pending_summary(&job);
        }
    }

    Ok(())
}

async fn get_job(client: &CoordinatorClient, id: &str) -> Result<()> {
    let uuid = resolve_job_id(client, &IdOrPrefix::parse(id)).await?;

    let job = match client.get_job(uuid).await {
        Ok(job) => job,
        Err(e) if e.is_not_found() => bail!("Job {} not found", uuid),
        Err(e) => return Err(e.into()),
    };

    print_job_details(&job);

    Ok(())
}

async fn get_job_logs(client: &CoordinatorClient, id: &str) -> Result<()> {
    let uuid = resolve_job_id(client, &IdOrPrefix::parse(id)).await?;

    let logs = client.get_job_logs(uuid).await?;

    if logs.is_empty() {
        println!("{}", "No logs found for this job.".yellow());
    } else {
        println!("{}", format!("Logs for job {}:", uuid).bold());
        println!("{}", "─".repeat(80).dimmed());
        for log in logs {
            print_log_entry(&log);
        }
        println!("{}", "─".repeat(80).dimmed());
    }

    Ok(())
}

async fn cancel_job(client: &CoordinatorClient, id: &str) -> Result<()> {
    let uuid = resolve_job_id(client, &IdOrPrefix::parse(id)).await?;

    match client.cancel_job(uuid).await {
        Ok(job) => {
            println!(
                "{} {} is now {}",
                "✓".green(),
                job.id.to_string().cyan(),
                colorize_status(job.status)
            );
            Ok(())
        }
        Err(e) if e.is_conflict() => bail!("Job {} has already finished: {}", uuid, e),
        Err(e) => Err(e.into()),
    }
}

fn print_job_summary(job: &Job) {
    println!("  {} {} {}", "▸".cyan(), job.name.bold(), job.id.to_string().dimmed());
    println!("    Status:   {}", colorize_status(job.status));
    println!(
        "    Created:  {}",
        job.created_at
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
    if let Some(worker) = job.accepted_by {
        println!("    Worker:   {}", worker.to_string().dimmed());
    }
    println!();
}

fn print_pending_summary(job: &JobDescriptor) {
    println!("  {} {} {}", "▸".cyan(), job.name.bold(), job.id.to_string().dimmed());
    println!("    Entry:    {}", job.main_entry);
    println!(
        "    Created:  {}",
        job.created_at
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
    println!();
}

fn print_job_details(job: &Job) {
    println!("{}", "Job Details:".bold());
    println!("  ID:           {}", job.id.to_string().cyan());
    println!("  Name:         {}", job.name);
    println!("  Status:       {}", colorize_status(job.status));
    println!("  Main Entry:   {}", job.main_entry);
    println!("  Requirements: {}", job.requirements_file);
    println!("  Image:        {}", job.image_tag.dimmed());
    println!("  Bundle:       {}", job.bundle_reference.dimmed());
    println!(
        "  Created:      {}",
        job.created_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!(
        "  Updated:      {}",
        job.updated_at.format("%Y-%m-%d %H:%M:%S")
    );

    if let Some(worker) = job.accepted_by {
        println!("  Worker:       {}", worker);
    }

    if job.status.is_terminal() {
        let duration = job.updated_at.signed_duration_since(job.created_at);
        println!("  Duration:     {}s", duration.num_seconds());
    }
}

fn print_log_entry(log: &LogEntry) {
    let level_str = log.level.as_str().to_uppercase();
    let level_colored = match log.level {
        LogLevel::Debug => level_str.dimmed(),
        LogLevel::Info => level_str.cyan(),
        LogLevel::Warning => level_str.yellow(),
        LogLevel::Error => level_str.red(),
    };

    println!(
        "{} [{}] {}",
        log.ts.format("%H:%M:%S").to_string().dimmed(),
        level_colored,
        log.message
    );
}

/// Colorize job status for display
fn colorize_status(status: JobStatus) -> ColoredString {
    let label = status.as_str();
    match status {
        JobStatus::Pending => label.yellow(),
        JobStatus::Accepted => label.blue(),
        JobStatus::Running => label.cyan(),
        JobStatus::Completed => label.green(),
        JobStatus::Failed => label.red(),
        JobStatus::Canceled => label.dimmed(),
    }
}

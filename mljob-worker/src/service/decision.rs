//! Accept decision
//!
//! Whether the worker takes a pending job. `PromptDecision` asks the
//! operator on the terminal; `AutoAccept` takes everything.

use std::io::{BufRead, Write};

use async_trait::async_trait;
use mljob_core::dto::job::JobDescriptor;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::AcceptMode;

#[async_trait]
pub trait AcceptDecision: Send + Sync {
    async fn should_accept(&self, job: &JobDescriptor) -> bool;
}

pub struct AutoAccept;

#[async_trait]
impl AcceptDecision for AutoAccept {
    async fn should_accept(&self, _job: &JobDescriptor) -> bool {
        true
    }
}

/// Asks on stdin; anything but yes declines
///
/// A pending question gives up when `shutdown` fires, so Ctrl-C does not
/// wait for the operator.
pub struct PromptDecision {
    shutdown: CancellationToken,
}

impl PromptDecision {
    pub fn new(shutdown: CancellationToken) -> Self {
        Self { shutdown }
    }
}

#[async_trait]
impl AcceptDecision for PromptDecision {
    async fn should_accept(&self, job: &JobDescriptor) -> bool {
        let summary = describe(job);

        ask(&self.shutdown, move || {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "\nNew job available:\n{}", summary)?;
            write!(stdout, "Accept this job? [y/N]: ")?;
            stdout.flush()?;

            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line)?;
            Ok(line)
        })
        .await
    }
}

/// Runs `read` on its own thread and races the answer against `shutdown`
///
/// A plain thread is used instead of the blocking pool: a read that never
/// returns must not hold up runtime shutdown.
async fn ask<F>(shutdown: &CancellationToken, read: F) -> bool
where
    F: FnOnce() -> std::io::Result<String> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    std::thread::spawn(move || {
        let _ = tx.send(read());
    });

    tokio::select! {
        _ = shutdown.cancelled() => {
            debug!("Shutdown requested while waiting for an answer");
            false
        }
        answer = rx => match answer {
            Ok(Ok(line)) => parse_answer(&line).unwrap_or(false),
            Ok(Err(e)) => {
                warn!("Failed to read answer from stdin: {}", e);
                false
            }
            Err(_) => {
                warn!("Prompt thread exited without an answer");
                false
            }
        },
    }
}

pub fn decision_for(mode: AcceptMode, shutdown: CancellationToken) -> Box<dyn AcceptDecision> {
    match mode {
        AcceptMode::Prompt => Box::new(PromptDecision::new(shutdown)),
        AcceptMode::Auto => Box::new(AutoAccept),
    }
}

fn describe(job: &JobDescriptor) -> String {
    format!(
        "  ID:           {}\n  Name:         {}\n  Main Entry:   {}\n  Requirements: {}\n  Submitted:    {}",
        job.id,
        job.name,
        job.main_entry,
        job.requirements_file,
        job.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    )
}

/// `Some(true)` for y/yes, `Some(false)` for n/no, case-insensitive
pub fn parse_answer(input: &str) -> Option<bool> {
    match input.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;

    fn descriptor() -> JobDescriptor {
        JobDescriptor {
            id: Uuid::new_v4(),
            name: "resnet".to_string(),
            bundle_reference: "x.zip".to_string(),
            main_entry: "train.py".to_string(),
            requirements_file: "requirements.txt".to_string(),
            image_tag: "mljob-x:latest".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_parse_answer() {
        assert_eq!(parse_answer("y\n"), Some(true));
        assert_eq!(parse_answer(" YES "), Some(true));
        assert_eq!(parse_answer("n"), Some(false));
        assert_eq!(parse_answer("No\r\n"), Some(false));
        assert_eq!(parse_answer(""), None);
        assert_eq!(parse_answer("maybe"), None);
    }

    #[test]
    fn test_describe_lists_job_fields() {
        let job = descriptor();
        let text = describe(&job);
        assert!(text.contains(&job.id.to_string()));
        assert!(text.contains("resnet"));
        assert!(text.contains("train.py"));
        assert!(text.contains("requirements.txt"));
    }

    #[tokio::test]
    async fn test_auto_accept() {
        let decision = decision_for(AcceptMode::Auto, CancellationToken::new());
        assert!(decision.should_accept(&descriptor()).await);
    }

    #[tokio::test]
    async fn test_ask_uses_answer() {
        let shutdown = CancellationToken::new();
        assert!(ask(&shutdown, || Ok("yes\n".to_string())).await);
        assert!(!ask(&shutdown, || Ok("n\n".to_string())).await);
        assert!(!ask(&shutdown, || Err(std::io::ErrorKind::UnexpectedEof.into())).await);
    }

    #[tokio::test]
    async fn test_ask_gives_up_on_shutdown() {
        let shutdown = CancellationToken::new();
        let (_hold, release) = std::sync::mpsc::channel::<()>();

        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            trigger.cancel();
        });

        // The reader never answers while `_hold` is alive
        let answered = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            ask(&shutdown, move || {
                let _ = release.recv();
                Ok("y\n".to_string())
            }),
        )
        .await
        .unwrap();

        assert!(!answered);
    }
}

//! Log relay
//!
//! Buffers job log lines and ships them to the coordinator in batches
//! from a background task. Sending never blocks the pipeline and
//! delivery failures only produce a warning.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::repository::LogRepository;

pub struct LogRelay {
    tx: mpsc::UnboundedSender<String>,
    handle: JoinHandle<()>,
}

impl LogRelay {
    /// Spawns the sender task for one job
    pub fn start(
        job_id: Uuid,
        repo: Arc<dyn LogRepository>,
        flush_interval: Duration,
        max_batch: usize,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run(job_id, repo, rx, flush_interval, max_batch.max(1)));
        Self { tx, handle }
    }

    /// Queues one line
    pub fn send(&self, line: impl Into<String>) {
        // The task only stops after `finish`
        let _ = self.tx.send(line.into());
    }

    pub fn send_all<I, S>(&self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for line in lines {
            self.send(line);
        }
    }

    /// Flushes everything queued so far and stops the task
    pub async fn finish(self) {
        drop(self.tx);
        if let Err(e) = self.handle.await {
            warn!("Log relay task failed: {}", e);
        }
    }
}

async fn run(
    job_id: Uuid,
    repo: Arc<dyn LogRepository>,
    mut rx: mpsc::UnboundedReceiver<String>,
    flush_interval: Duration,
    max_batch: usize,
) {
    let mut ticker = time::interval(flush_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut batch: Vec<String> = Vec::new();

    loop {
        tokio::select! {
            line = rx.recv() => match line {
                Some(line) => {
                    batch.push(line);
                    if batch.len() >= max_batch {
                        flush(job_id, repo.as_ref(), &mut batch).await;
                    }
                }
                None => break,
            },
            _ = ticker.tick() => {
                if !batch.is_empty() {
                    flush(job_id, repo.as_ref(), &mut batch).await;
                }
            }
        }
    }

    if !batch.is_empty() {
        flush(job_id, repo.as_ref(), &mut batch).await;
    }
}

/// Sends the pending batch; the lines are dropped either way
async fn flush(job_id: Uuid, repo: &dyn LogRepository, batch: &mut Vec<String>) {
    let lines: Vec<String> = batch.drain(..).collect();
    debug!(job_id = %job_id, "Sending {} log line(s)", lines.len());

    if let Err(e) = repo.send_lines(job_id, lines).await {
        warn!(job_id = %job_id, "Failed to send logs: {}", e);
    }
}

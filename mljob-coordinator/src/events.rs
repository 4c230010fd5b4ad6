//! Job event bus
//!
//! Committed state changes are published here for whoever wants to follow
//! them (dashboards, notifiers). Publishing never blocks and never fails the
//! caller: with no subscriber the event is simply dropped.

use mljob_core::domain::job::JobStatus;
use tokio::sync::broadcast;
use uuid::Uuid;

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    StatusChanged { job_id: Uuid, status: JobStatus },
    LogsAppended { job_id: Uuid, count: usize },
}

#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<JobEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: JobEvent) {
        // Err only means nobody is listening
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Trace every event at debug level until the bus is dropped
pub async fn trace_events(mut rx: broadcast::Receiver<JobEvent>) {
    loop {
        match rx.recv().await {
            Ok(JobEvent::StatusChanged { job_id, status }) => {
                tracing::debug!(job_id = %job_id, status = %status, "Job status changed");
            }
            Ok(JobEvent::LogsAppended { job_id, count }) => {
                tracing::debug!(job_id = %job_id, count, "Job logs appended");
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("Event tracer lagged, skipped {} events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

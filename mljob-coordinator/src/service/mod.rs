//! Service Module
//!
//! Business logic layer for the coordinator.
//! Services orchestrate between the store and contain domain logic.

pub mod artifact;
pub mod job;
pub mod log;
pub mod storage;
pub mod worker;

// Re-export for convenience
pub use artifact as artifact_service;
pub use job as job_service;
pub use log as log_service;
pub use worker as worker_service;

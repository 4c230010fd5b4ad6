//! Service layer
//!
//! Business logic of the worker: preparing bundles, running a job,
//! relaying its logs, harvesting its artifacts, and deciding which jobs
//! to take.

pub mod bundle;
pub mod decision;
pub mod execution;
pub mod harvest;
pub mod relay;

pub use decision::AcceptDecision;
pub use execution::{ContainerExecutionService, ExecutionService, JobOutcome};

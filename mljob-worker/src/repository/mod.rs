//! Repository layer
//!
//! Narrow views of the coordinator API used by the worker. The traits
//! are implemented by `CoordinatorClient` and faked in tests.

mod jobs;
mod logs;
mod workers;

pub use jobs::JobRepository;
pub use logs::LogRepository;
pub use workers::WorkerRepository;

//! Scheduler layer for the worker
//!
//! Polls the coordinator for pending jobs, claims one at a time and hands
//! it to the execution service.

pub mod poller;

pub use poller::WorkerAgent;

//! Data Transfer Objects for the coordinator API
//!
//! Request and response bodies exchanged between the coordinator, the worker
//! agent and the operator CLI.

pub mod artifact;
pub mod job;
pub mod log;
pub mod worker;

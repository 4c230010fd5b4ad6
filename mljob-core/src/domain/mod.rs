//! Core domain types
//!
//! These types represent the fundamental entities and are shared between
//! the coordinator (for persistence) and the worker (for execution).

pub mod job;
pub mod log;
pub mod worker;

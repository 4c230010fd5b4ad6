//! mljob Core
//!
//! Core types and abstractions shared by the coordinator, the worker agent
//! and the operator CLI.
//!
//! This crate contains:
//! - Domain types: Job, Worker, LogEntry and the job status transition table
//! - DTOs: Data transfer objects for the coordinator HTTP API

pub mod domain;
pub mod dto;

// src/exec/mod.rs

//! Process execution layer.
//!
//! This module is responsible for actually running the commands planned
//! for each job, using `tokio::process::Command`, and reporting back to
//! the orchestration runtime via `RuntimeEvent`s.
//!
//! - [`command`] owns the executor loop that receives scheduled jobs.
//! - [`job_runner`] handles individual job process execution.
//! - [`backend`] provides the `ExecutorBackend` trait and a concrete
//!   `RealExecutorBackend` that the runtime uses in production, and which
//!   tests can replace with a fake implementation.
//!
//! The parallelism cap lives in the core runtime, not here: the executor
//! runs everything it is handed.

pub mod backend;
pub mod command;
pub mod job_runner;

pub use backend::{ExecutorBackend, RealExecutorBackend};
pub use command::spawn_executor;

// src/engine/mod.rs

//! Orchestration engine for pipedag.
//!
//! This module ties together:
//! - the scheduler (which task runs when)
//! - the worker-pool cap (how many jobs run at once)
//! - the main runtime event loop that reacts to:
//!   - job completion events
//!   - shutdown signals
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`].

/// Canonical task name type used throughout the engine.
pub type TaskName = String;

/// Outcome of a job process for the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Success,
    Failed(i32),
}

/// Events flowing into the runtime from the executor and signal handlers.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A job process exited with a concrete outcome.
    JobCompleted {
        task: TaskName,
        job_index: usize,
        outcome: JobOutcome,
    },
    /// Graceful shutdown requested (e.g. Ctrl-C). Unstarted tasks are
    /// skipped; running processes are left to finish.
    ShutdownRequested,
}

pub mod core;
pub mod report;
pub mod runtime;

pub use self::core::{CoreCommand, CoreRuntime, CoreStep};
pub use report::{RunReport, TaskReport, TaskStatus};
pub use runtime::Runtime;

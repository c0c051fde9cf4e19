// src/dag/state.rs

//! Per-run task state and the scheduler's dispatch types.

use std::path::PathBuf;

use crate::engine::TaskName;
use crate::plan::{JobExecutor, TaskPlan};

/// Run record of a single task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Waiting on upstream tasks.
    Pending,
    /// Dependencies satisfied and jobs queued for a worker slot.
    Ready,
    /// At least one job has been dispatched to the executor.
    Running,
    /// All jobs finished successfully, or none needed to run
    /// (`ran = false` means the task was already up to date).
    Done { ran: bool },
    /// A job exited with a non-success status.
    Failed,
    /// Not attempted: an upstream task failed, or the run was cancelled.
    Skipped,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunState::Done { .. } | RunState::Failed | RunState::Skipped
        )
    }
}

/// A task's planned jobs plus its mutable run record.
///
/// Mutated only by the [`Scheduler`](crate::dag::Scheduler).
#[derive(Debug, Clone)]
pub struct TaskRun {
    pub name: TaskName,
    /// Direct dependencies (names in `from = [...]`).
    pub deps: Vec<TaskName>,
    pub plan: TaskPlan,
    pub state: RunState,
    /// Stale jobs not yet completed in this run.
    pub jobs_remaining: usize,
    /// Jobs that actually executed (successfully) in this run.
    pub jobs_executed: usize,
    /// Exit code of the first failing job, if any.
    pub exit_code: Option<i32>,
}

impl TaskRun {
    pub fn new(name: TaskName, deps: Vec<TaskName>, plan: TaskPlan) -> Self {
        Self {
            name,
            deps,
            plan,
            state: RunState::Pending,
            jobs_remaining: 0,
            jobs_executed: 0,
            exit_code: None,
        }
    }
}

/// Description of a job that the scheduler wants the executor to run.
///
/// `cpus` / `mem_mb` are the task's resource hints, already rendered into
/// command templates but also carried along for external job-launch
/// collaborators.
#[derive(Debug, Clone)]
pub struct ScheduledJob {
    pub task: TaskName,
    /// Index into the owning task's job list.
    pub job_index: usize,
    pub executor: JobExecutor,
    pub inputs: Vec<PathBuf>,
    pub outputs: Vec<PathBuf>,
    pub cpus: u32,
    pub mem_mb: u64,
}

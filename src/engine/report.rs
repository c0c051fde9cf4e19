// src/engine/report.rs

//! End-of-run summary types.

use tracing::{info, warn};

use crate::engine::TaskName;
use crate::errors::PipedagError;

/// Terminal status of one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Outputs were current; nothing executed.
    UpToDate,
    /// All stale jobs executed successfully.
    Ran,
    /// A job exited with this code.
    Failed { code: i32 },
    /// Not attempted (upstream failure or cancellation).
    Skipped,
}

#[derive(Debug, Clone)]
pub struct TaskReport {
    pub name: TaskName,
    pub status: TaskStatus,
    pub jobs_executed: usize,
}

/// Per-task outcomes in topological order.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub tasks: Vec<TaskReport>,
}

impl RunReport {
    /// A run succeeds only if every task finished (ran or was current).
    pub fn success(&self) -> bool {
        self.tasks
            .iter()
            .all(|t| matches!(t.status, TaskStatus::UpToDate | TaskStatus::Ran))
    }

    pub fn failed(&self) -> impl Iterator<Item = &TaskReport> {
        self.tasks
            .iter()
            .filter(|t| matches!(t.status, TaskStatus::Failed { .. }))
    }

    pub fn skipped(&self) -> impl Iterator<Item = &TaskReport> {
        self.tasks
            .iter()
            .filter(|t| matches!(t.status, TaskStatus::Skipped))
    }

    /// The first task failure as an error, for callers that want `?`
    /// semantics instead of inspecting the report.
    pub fn first_failure(&self) -> Option<PipedagError> {
        self.tasks.iter().find_map(|t| match t.status {
            TaskStatus::Failed { code } => Some(PipedagError::Execution {
                task: t.name.clone(),
                code,
            }),
            _ => None,
        })
    }

    /// Log one line per task plus an overall verdict.
    pub fn log_summary(&self) {
        for task in &self.tasks {
            match task.status {
                TaskStatus::UpToDate => info!(task = %task.name, "up to date"),
                TaskStatus::Ran => {
                    info!(task = %task.name, jobs = task.jobs_executed, "ran")
                }
                TaskStatus::Failed { code } => {
                    warn!(task = %task.name, exit_code = code, "failed")
                }
                TaskStatus::Skipped => warn!(task = %task.name, "skipped"),
            }
        }

        if self.success() {
            info!(tasks = self.tasks.len(), "pipeline finished");
        } else {
            warn!(
                failed = self.failed().count(),
                skipped = self.skipped().count(),
                "pipeline finished with failures"
            );
        }
    }
}

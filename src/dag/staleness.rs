// src/dag/staleness.rs

//! Up-to-date checking via file modification times.
//!
//! A job is stale when any of its outputs is missing, or when the newest
//! input is strictly newer than the oldest output. Equal timestamps count
//! as current, so a task whose outputs were written in the same filesystem
//! tick as its inputs is not re-run. A missing input is never "staleness":
//! it is a configuration error surfaced as [`PipedagError::MissingInput`].

use std::time::SystemTime;

use tracing::debug;

use crate::errors::{PipedagError, Result};
use crate::fs::FileSystem;
use crate::plan::{Job, TaskPlan};

/// Indices of the jobs in `plan` that need to run.
///
/// With `force` set, every job counts as stale.
pub fn stale_job_indices(fs: &dyn FileSystem, plan: &TaskPlan, force: bool) -> Result<Vec<usize>> {
    if force {
        return Ok((0..plan.jobs.len()).collect());
    }

    let mut stale = Vec::new();
    for (index, job) in plan.jobs.iter().enumerate() {
        if job_is_stale(fs, &plan.name, job)? {
            stale.push(index);
        }
    }
    Ok(stale)
}

/// Whether a single job must run.
pub fn job_is_stale(fs: &dyn FileSystem, task: &str, job: &Job) -> Result<bool> {
    for input in &job.inputs {
        if !fs.is_file(input) {
            return Err(PipedagError::MissingInput {
                task: task.to_string(),
                path: input.clone(),
            });
        }
    }

    let mut oldest_output: Option<SystemTime> = None;
    for output in &job.outputs {
        if !fs.is_file(output) {
            debug!(task, output = %output.display(), "output missing; job is stale");
            return Ok(true);
        }
        let mtime = fs.modified(output)?;
        oldest_output = Some(match oldest_output {
            Some(t) => t.min(mtime),
            None => mtime,
        });
    }

    let Some(oldest_output) = oldest_output else {
        // A job without outputs can never be proven current.
        return Ok(true);
    };

    let mut newest_input: Option<SystemTime> = None;
    for input in &job.inputs {
        let mtime = fs.modified(input)?;
        newest_input = Some(match newest_input {
            Some(t) => t.max(mtime),
            None => mtime,
        });
    }

    Ok(matches!(newest_input, Some(input) if input > oldest_output))
}

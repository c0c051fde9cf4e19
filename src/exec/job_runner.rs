// src/exec/job_runner.rs

//! Individual job runner: external commands and in-process callables.

use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::dag::ScheduledJob;
use crate::engine::{JobOutcome, RuntimeEvent};
use crate::plan::JobExecutor;

/// Run a single job and emit a `JobCompleted` event when it finishes.
///
/// Once spawned, a command process is never killed by pipedag; cancellation
/// only stops new jobs from starting.
pub async fn run_job(job: ScheduledJob, runtime_tx: mpsc::Sender<RuntimeEvent>) {
    let task = job.task.clone();
    let job_index = job.job_index;

    let result = match job.executor.clone() {
        JobExecutor::Command(cmd) => run_command(&job, cmd, &runtime_tx).await,
        JobExecutor::Callable(f) => run_callable(&job, f, &runtime_tx).await,
    };

    if let Err(err) = result {
        error!(
            task = %task,
            job_index,
            error = %err,
            "job execution error"
        );
        let _ = runtime_tx
            .send(RuntimeEvent::JobCompleted {
                task,
                job_index,
                outcome: JobOutcome::Failed(-1),
            })
            .await;
    }
}

async fn run_command(
    job: &ScheduledJob,
    command: String,
    runtime_tx: &mpsc::Sender<RuntimeEvent>,
) -> Result<()> {
    info!(
        task = %job.task,
        job_index = job.job_index,
        cpus = job.cpus,
        mem_mb = job.mem_mb,
        cmd = %command,
        "starting job process"
    );

    // Build a shell command appropriate for the platform.
    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(&command);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(&command);
        c
    };

    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    let mut child = cmd.spawn().with_context(|| {
        format!(
            "spawning process for task '{}' job {}",
            job.task, job.job_index
        )
    })?;

    // Consume both streams so buffers don't fill; external tools tend to
    // chat on stderr, so both land in the debug log.
    if let Some(stdout) = child.stdout.take() {
        let task = job.task.clone();
        let job_index = job.job_index;
        tokio::spawn(async move {
            let reader = BufReader::new(stdout);
            let mut lines = reader.lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(task = %task, job_index, "stdout: {}", line);
            }
        });
    }

    if let Some(stderr) = child.stderr.take() {
        let task = job.task.clone();
        let job_index = job.job_index;
        tokio::spawn(async move {
            let reader = BufReader::new(stderr);
            let mut lines = reader.lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(task = %task, job_index, "stderr: {}", line);
            }
        });
    }

    let status = child.wait().await.with_context(|| {
        format!(
            "waiting for process of task '{}' job {}",
            job.task, job.job_index
        )
    })?;

    let code = status.code().unwrap_or(-1);
    let outcome = if status.success() {
        JobOutcome::Success
    } else {
        JobOutcome::Failed(code)
    };

    info!(
        task = %job.task,
        job_index = job.job_index,
        exit_code = code,
        success = status.success(),
        "job process exited"
    );

    send_completion(job, outcome, runtime_tx).await
}

/// In-process executors run on the blocking pool; a returned error counts
/// as a failure with exit code 1.
async fn run_callable(
    job: &ScheduledJob,
    f: crate::plan::InProcessFn,
    runtime_tx: &mpsc::Sender<RuntimeEvent>,
) -> Result<()> {
    info!(
        task = %job.task,
        job_index = job.job_index,
        "starting in-process job"
    );

    let inputs = job.inputs.clone();
    let outputs = job.outputs.clone();

    let outcome = match tokio::task::spawn_blocking(move || f(&inputs, &outputs)).await {
        Ok(Ok(())) => JobOutcome::Success,
        Ok(Err(err)) => {
            warn!(
                task = %job.task,
                job_index = job.job_index,
                error = %err,
                "in-process job returned an error"
            );
            JobOutcome::Failed(1)
        }
        Err(join_err) => {
            error!(
                task = %job.task,
                job_index = job.job_index,
                error = %join_err,
                "in-process job panicked"
            );
            JobOutcome::Failed(-1)
        }
    };

    send_completion(job, outcome, runtime_tx).await
}

async fn send_completion(
    job: &ScheduledJob,
    outcome: JobOutcome,
    runtime_tx: &mpsc::Sender<RuntimeEvent>,
) -> Result<()> {
    runtime_tx
        .send(RuntimeEvent::JobCompleted {
            task: job.task.clone(),
            job_index: job.job_index,
            outcome,
        })
        .await
        .with_context(|| {
            format!(
                "sending JobCompleted event for task '{}' to runtime",
                job.task
            )
        })
}

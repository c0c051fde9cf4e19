// src/exec/command.rs

//! Background executor loop that spawns job processes.

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::dag::ScheduledJob;
use crate::engine::RuntimeEvent;
use crate::exec::job_runner::run_job;

/// Spawn the background executor loop.
///
/// The returned `mpsc::Sender<ScheduledJob>` is what the runtime (or
/// `RealExecutorBackend`) uses to hand over work. Each scheduled job is
/// executed in its own Tokio task. The core runtime has already enforced
/// the parallelism cap, so everything received here starts immediately.
pub fn spawn_executor(runtime_tx: mpsc::Sender<RuntimeEvent>) -> mpsc::Sender<ScheduledJob> {
    let (tx, mut rx) = mpsc::channel::<ScheduledJob>(32);

    tokio::spawn(async move {
        info!("executor loop started");

        while let Some(job) = rx.recv().await {
            debug!(task = %job.task, job_index = job.job_index, "executor received job");
            let rt_tx = runtime_tx.clone();
            tokio::spawn(async move {
                run_job(job, rt_tx).await;
            });
        }

        info!("executor loop finished (channel closed)");
    });

    tx
}

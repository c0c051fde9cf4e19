use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use pipedag::dag::ScheduledJob;
use pipedag::engine::{JobOutcome, RuntimeEvent};
use pipedag::errors::Result;
use pipedag::exec::ExecutorBackend;
use tokio::sync::mpsc;

/// A fake executor that:
/// - records which jobs were "run"
/// - immediately reports JobCompleted for each scheduled job, with the
///   outcome chosen by a caller-supplied decision function.
pub struct FakeExecutor {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    executed: Arc<Mutex<Vec<ScheduledJob>>>,
    outcome_fn: Arc<dyn Fn(&ScheduledJob) -> JobOutcome + Send + Sync>,
}

impl FakeExecutor {
    /// Every job succeeds.
    pub fn all_success(
        runtime_tx: mpsc::Sender<RuntimeEvent>,
        executed: Arc<Mutex<Vec<ScheduledJob>>>,
    ) -> Self {
        Self::with_outcomes(runtime_tx, executed, |_| JobOutcome::Success)
    }

    pub fn with_outcomes(
        runtime_tx: mpsc::Sender<RuntimeEvent>,
        executed: Arc<Mutex<Vec<ScheduledJob>>>,
        outcome_fn: impl Fn(&ScheduledJob) -> JobOutcome + Send + Sync + 'static,
    ) -> Self {
        Self {
            runtime_tx,
            executed,
            outcome_fn: Arc::new(outcome_fn),
        }
    }
}

impl ExecutorBackend for FakeExecutor {
    fn spawn_ready_jobs(
        &mut self,
        jobs: Vec<ScheduledJob>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let executed = Arc::clone(&self.executed);
        let outcome_fn = Arc::clone(&self.outcome_fn);

        Box::pin(async move {
            for job in jobs {
                let outcome = outcome_fn(&job);
                {
                    let mut guard = executed.lock().unwrap();
                    guard.push(job.clone());
                }

                tx.send(RuntimeEvent::JobCompleted {
                    task: job.task.clone(),
                    job_index: job.job_index,
                    outcome,
                })
                .await
                .map_err(anyhow::Error::from)?;
            }
            Ok(())
        })
    }
}

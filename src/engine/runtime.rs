// src/engine/runtime.rs

use std::fmt;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::dag::ScheduledJob;
use crate::engine::report::RunReport;
use crate::errors::Result;
use crate::exec::ExecutorBackend;

use super::core::{CoreCommand, CoreRuntime};
use super::RuntimeEvent;

/// Drives the scheduler in response to `RuntimeEvent`s, and delegates
/// actual command execution to an `ExecutorBackend`.
///
/// This is a pure IO shell around `CoreRuntime`, which contains all the
/// runtime semantics. This struct handles async IO: reading events from
/// channels and dispatching jobs to the executor.
pub struct Runtime<E: ExecutorBackend> {
    core: CoreRuntime,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    executor: E,
}

impl<E: ExecutorBackend> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> Runtime<E> {
    pub fn new(core: CoreRuntime, event_rx: mpsc::Receiver<RuntimeEvent>, executor: E) -> Self {
        Self {
            core,
            event_rx,
            executor,
        }
    }

    /// Main event loop.
    ///
    /// - Seeds the run from the core.
    /// - Consumes `RuntimeEvent`s from `event_rx` and feeds them into the
    ///   core runtime.
    /// - Executes commands returned by the core (dispatch jobs).
    /// - Returns the run report once the core says the run is over, or the
    ///   fatal error that aborted it.
    pub async fn run(mut self) -> Result<RunReport> {
        info!("pipedag runtime started");

        let step = self.core.start();
        let mut keep_running = step.keep_running;
        self.execute_commands(step.commands).await?;

        while keep_running {
            let event = match self.event_rx.recv().await {
                Some(e) => e,
                None => {
                    info!("runtime event channel closed; exiting");
                    break;
                }
            };

            debug!(?event, "runtime received event");

            let step = self.core.step(event);
            self.execute_commands(step.commands).await?;
            keep_running = step.keep_running;
        }

        info!("runtime exiting");

        if let Some(err) = self.core.take_fatal() {
            return Err(err);
        }
        Ok(self.core.report())
    }

    async fn execute_commands(&mut self, commands: Vec<CoreCommand>) -> Result<()> {
        for command in commands {
            match command {
                CoreCommand::DispatchJobs(jobs) => {
                    self.spawn_ready(jobs).await?;
                }
            }
        }
        Ok(())
    }

    async fn spawn_ready(&mut self, jobs: Vec<ScheduledJob>) -> Result<()> {
        if jobs.is_empty() {
            return Ok(());
        }

        let names: Vec<_> = jobs
            .iter()
            .map(|j| format!("{}#{}", j.task, j.job_index))
            .collect();
        debug!(?names, "spawning ready jobs");

        self.executor.spawn_ready_jobs(jobs).await
    }
}

// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and produces:
//! - an updated core state
//! - a list of "commands" describing what the IO shell should do next
//!
//! The async/IO-heavy shell (`engine::runtime::Runtime`) is responsible
//! for reading events from channels and sending jobs to the executor.
//! The core owns the scheduler, the queue of jobs waiting for a worker
//! slot, and the global parallelism cap, so the cap and every state
//! transition can be unit tested without Tokio, channels, or processes.

use std::collections::VecDeque;

use tracing::{debug, error, warn};

use crate::dag::state::RunState;
use crate::dag::{ScheduledJob, Scheduler};
use crate::engine::report::RunReport;
use crate::engine::{JobOutcome, RuntimeEvent};
use crate::errors::PipedagError;

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Send these jobs to the executor.
    DispatchJobs(Vec<ScheduledJob>),
}

/// Decision returned by the core after handling a single [`RuntimeEvent`].
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

/// Pure core runtime state.
#[derive(Debug)]
pub struct CoreRuntime {
    scheduler: Scheduler,
    /// Jobs whose task is ready, waiting for a worker slot.
    queue: VecDeque<ScheduledJob>,
    /// Jobs currently dispatched to the executor.
    running: usize,
    max_parallel: usize,
    cancelled: bool,
    /// First unrecoverable error (e.g. a missing input discovered at
    /// ready-time); the run winds down and the shell surfaces it.
    fatal: Option<PipedagError>,
}

impl CoreRuntime {
    pub fn new(scheduler: Scheduler, max_parallel: usize) -> Self {
        Self {
            scheduler,
            queue: VecDeque::new(),
            running: 0,
            max_parallel: max_parallel.max(1),
            cancelled: false,
            fatal: None,
        }
    }

    /// Number of jobs currently dispatched (for tests).
    pub fn running_jobs(&self) -> usize {
        self.running
    }

    /// Seed the run and dispatch the first batch of jobs.
    pub fn start(&mut self) -> CoreStep {
        match self.scheduler.start() {
            Ok(jobs) => self.queue.extend(jobs),
            Err(err) => self.abort(err),
        }
        self.drain()
    }

    /// Handle a single runtime event.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        match event {
            RuntimeEvent::JobCompleted {
                task,
                job_index,
                outcome,
            } => {
                self.running = self.running.saturating_sub(1);
                self.on_job_completed(&task, job_index, outcome);
                self.drain()
            }
            RuntimeEvent::ShutdownRequested => {
                self.cancelled = true;
                self.queue.clear();
                self.scheduler.cancel();
                CoreStep {
                    commands: Vec::new(),
                    keep_running: self.running > 0,
                }
            }
        }
    }

    /// The first fatal error, if the run aborted.
    pub fn take_fatal(&mut self) -> Option<PipedagError> {
        self.fatal.take()
    }

    pub fn report(&self) -> RunReport {
        self.scheduler.report()
    }

    fn on_job_completed(&mut self, task: &str, job_index: usize, outcome: JobOutcome) {
        if self.fatal.is_some() {
            debug!(task, job_index, "completion after fatal error; discarding");
            return;
        }

        match self.scheduler.on_job_completed(task, job_index, outcome) {
            Ok(step) => {
                if self.cancelled {
                    // The scheduler already skipped everything unstarted;
                    // nothing new may be dispatched.
                    return;
                }
                if matches!(outcome, JobOutcome::Failed(_)) {
                    // Sibling jobs of the failed task may still sit in the
                    // queue; drop everything whose task is no longer live.
                    self.purge_dead_jobs();
                }
                self.queue.extend(step.newly_ready);
            }
            Err(err) => self.abort(err),
        }
    }

    /// Record a fatal error and wind the run down without killing
    /// in-flight processes.
    fn abort(&mut self, err: PipedagError) {
        error!(error = %err, "aborting run");
        if self.fatal.is_none() {
            self.fatal = Some(err);
        }
        self.queue.clear();
        self.scheduler.cancel();
    }

    /// Drop queued jobs whose task left the Ready/Running states.
    fn purge_dead_jobs(&mut self) {
        let scheduler = &self.scheduler;
        self.queue.retain(|job| {
            matches!(
                scheduler.run_state_of(&job.task),
                Some(RunState::Ready | RunState::Running)
            )
        });
    }

    /// Dispatch queued jobs up to the parallelism cap and decide whether
    /// the loop should continue.
    fn drain(&mut self) -> CoreStep {
        let mut dispatch = Vec::new();

        while self.running < self.max_parallel {
            let Some(job) = self.queue.pop_front() else {
                break;
            };
            self.scheduler.note_job_dispatched(&job.task);
            self.running += 1;
            dispatch.push(job);
        }

        let idle = self.running == 0 && self.queue.is_empty();

        if idle && !self.scheduler.all_terminal() && self.fatal.is_none() && !self.cancelled {
            // Every remaining task is Pending with unsatisfiable deps;
            // with a validated graph this cannot happen, but refuse to
            // spin forever if it does.
            warn!("run is idle but tasks remain; finishing early");
        }

        let mut commands = Vec::new();
        if !dispatch.is_empty() {
            commands.push(CoreCommand::DispatchJobs(dispatch));
        }

        CoreStep {
            commands,
            keep_running: !idle,
        }
    }
}

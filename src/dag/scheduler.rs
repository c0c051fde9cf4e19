// src/dag/scheduler.rs

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::dag::graph::TaskGraph;
use crate::dag::staleness::stale_job_indices;
use crate::dag::state::{RunState, ScheduledJob, TaskRun};
use crate::engine::report::{RunReport, TaskReport, TaskStatus};
use crate::engine::{JobOutcome, TaskName};
use crate::errors::Result;
use crate::fs::FileSystem;
use crate::plan::Plan;

/// What changed after feeding one job completion into the scheduler.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Jobs that became dispatchable.
    pub newly_ready: Vec<ScheduledJob>,
    /// Tasks skipped because an upstream task failed.
    pub newly_skipped: Vec<TaskName>,
}

/// Outcome of examining a Pending task.
enum ReadyOutcome {
    /// Dependencies not satisfied yet (or task not Pending).
    NotReady,
    /// Task is stale; these jobs want a worker slot.
    Scheduled(Vec<ScheduledJob>),
    /// Task was already up to date and moved straight to Done.
    FreshDone,
}

/// Scheduler holds the immutable task graph and plan plus the mutable
/// per-task run records.
///
/// It is responsible for:
/// - deciding when a task is ready (all upstream tasks Done)
/// - checking staleness at that moment, so outputs written earlier in the
///   same run are observed
/// - marking tasks Done/Failed as their jobs complete
/// - skipping the downstream closure of a failed task
///
/// All state transitions happen inside this type; the surrounding runtime
/// only routes events and enforces the parallelism cap.
#[derive(Debug)]
pub struct Scheduler {
    graph: TaskGraph,
    tasks: HashMap<TaskName, TaskRun>,
    fs: Arc<dyn FileSystem>,
    force: bool,
}

impl Scheduler {
    /// Construct a scheduler from a resolved [`Plan`].
    ///
    /// The plan may cover a dependency-closed subset of the graph
    /// (a `--target` run); tasks outside it are ignored entirely.
    pub fn new(graph: TaskGraph, plan: Plan, fs: Arc<dyn FileSystem>, force: bool) -> Self {
        let mut tasks = HashMap::new();

        for (name, task_plan) in plan.tasks {
            let deps = graph.dependencies_of(&name).to_vec();
            tasks.insert(name.clone(), TaskRun::new(name, deps, task_plan));
        }

        Self {
            graph,
            tasks,
            fs,
            force,
        }
    }

    /// Seed the run: walk the topological order once, moving every task
    /// that can make progress out of Pending. Fresh tasks cascade within
    /// the walk because producers precede consumers.
    pub fn start(&mut self) -> Result<Vec<ScheduledJob>> {
        let mut ready = Vec::new();

        for name in self.graph.topo_order() {
            if !self.tasks.contains_key(&name) {
                continue;
            }
            if let ReadyOutcome::Scheduled(jobs) = self.examine(&name)? {
                ready.extend(jobs);
            }
        }

        Ok(ready)
    }

    /// Record the completion of a dispatched job.
    pub fn on_job_completed(
        &mut self,
        task: &str,
        job_index: usize,
        outcome: JobOutcome,
    ) -> Result<SchedulerStep> {
        let Some(run) = self.tasks.get_mut(task) else {
            warn!(task, "completion for unknown task; ignoring");
            return Ok(SchedulerStep::default());
        };

        match run.state {
            RunState::Running => {}
            RunState::Failed => {
                debug!(
                    task,
                    job_index, "completion for already-failed task; ignoring"
                );
                return Ok(SchedulerStep::default());
            }
            state => {
                warn!(task, job_index, ?state, "unexpected completion; ignoring");
                return Ok(SchedulerStep::default());
            }
        }

        match outcome {
            JobOutcome::Success => {
                run.jobs_executed += 1;
                run.jobs_remaining = run.jobs_remaining.saturating_sub(1);

                if run.jobs_remaining > 0 {
                    debug!(
                        task,
                        job_index,
                        remaining = run.jobs_remaining,
                        "job finished; task still has jobs in flight"
                    );
                    return Ok(SchedulerStep::default());
                }

                run.state = RunState::Done { ran: true };
                info!(task, jobs = run.jobs_executed, "task completed");

                let mut newly_ready = Vec::new();
                self.cascade_dependents(task, &mut newly_ready)?;
                Ok(SchedulerStep {
                    newly_ready,
                    newly_skipped: Vec::new(),
                })
            }
            JobOutcome::Failed(code) => {
                run.state = RunState::Failed;
                run.exit_code = Some(code);
                warn!(
                    task,
                    job_index,
                    exit_code = code,
                    "job failed; skipping downstream tasks"
                );

                let newly_skipped = self.mark_dependents_skipped(task);
                Ok(SchedulerStep {
                    newly_ready: Vec::new(),
                    newly_skipped,
                })
            }
        }
    }

    /// Note that a queued job was handed to the executor.
    pub fn note_job_dispatched(&mut self, task: &str) {
        if let Some(run) = self.tasks.get_mut(task) {
            if run.state == RunState::Ready {
                run.state = RunState::Running;
            }
        }
    }

    /// Cancel the run: every task that has not started is Skipped.
    /// Running tasks are left alone; their in-flight completions are still
    /// recorded.
    pub fn cancel(&mut self) -> Vec<TaskName> {
        let mut skipped = Vec::new();
        for run in self.tasks.values_mut() {
            if matches!(run.state, RunState::Pending | RunState::Ready) {
                run.state = RunState::Skipped;
                skipped.push(run.name.clone());
            }
        }
        if !skipped.is_empty() {
            info!(count = skipped.len(), "cancelled; skipping unstarted tasks");
        }
        skipped
    }

    /// Whether every task reached a terminal state.
    pub fn all_terminal(&self) -> bool {
        self.tasks.values().all(|run| run.state.is_terminal())
    }

    /// Read-only view of a task's run state (tests and diagnostics).
    pub fn run_state_of(&self, task: &str) -> Option<RunState> {
        self.tasks.get(task).map(|run| run.state)
    }

    /// Summarize the run. Tasks that never reached a terminal state
    /// (possible after cancellation) are reported as Skipped.
    pub fn report(&self) -> RunReport {
        let mut tasks = Vec::new();

        for name in self.graph.topo_order() {
            let Some(run) = self.tasks.get(&name) else {
                continue;
            };

            let status = match run.state {
                RunState::Done { ran: false } => TaskStatus::UpToDate,
                RunState::Done { ran: true } => TaskStatus::Ran,
                RunState::Failed => TaskStatus::Failed {
                    code: run.exit_code.unwrap_or(-1),
                },
                RunState::Skipped
                | RunState::Pending
                | RunState::Ready
                | RunState::Running => TaskStatus::Skipped,
            };

            tasks.push(TaskReport {
                name: name.clone(),
                status,
                jobs_executed: run.jobs_executed,
            });
        }

        RunReport { tasks }
    }

    /// Examine a Pending task: if its dependencies are satisfied, resolve
    /// staleness and either schedule its stale jobs or mark it Done.
    fn examine(&mut self, name: &str) -> Result<ReadyOutcome> {
        {
            let Some(run) = self.tasks.get(name) else {
                return Ok(ReadyOutcome::NotReady);
            };
            if run.state != RunState::Pending {
                return Ok(ReadyOutcome::NotReady);
            }
            if !self.deps_satisfied(run) {
                return Ok(ReadyOutcome::NotReady);
            }
        }

        let stale = {
            let run = self.tasks.get(name).expect("checked above");
            stale_job_indices(self.fs.as_ref(), &run.plan, self.force)?
        };

        let run = self.tasks.get_mut(name).expect("checked above");

        if stale.is_empty() {
            run.state = RunState::Done { ran: false };
            info!(task = %run.name, "outputs up to date; not re-running");
            return Ok(ReadyOutcome::FreshDone);
        }

        run.state = RunState::Ready;
        run.jobs_remaining = stale.len();

        info!(
            task = %run.name,
            stale_jobs = stale.len(),
            total_jobs = run.plan.jobs.len(),
            "task is stale; scheduling jobs"
        );

        let jobs = stale
            .into_iter()
            .map(|index| {
                let job = &run.plan.jobs[index];
                ScheduledJob {
                    task: run.name.clone(),
                    job_index: index,
                    executor: job.executor.clone(),
                    inputs: job.inputs.clone(),
                    outputs: job.outputs.clone(),
                    cpus: run.plan.cpus,
                    mem_mb: run.plan.mem_mb,
                }
            })
            .collect();

        Ok(ReadyOutcome::Scheduled(jobs))
    }

    /// Whether all dependencies of the given task are Done.
    fn deps_satisfied(&self, run: &TaskRun) -> bool {
        run.deps.iter().all(|dep| match self.tasks.get(dep) {
            Some(dep_run) => matches!(dep_run.state, RunState::Done { .. }),
            None => {
                // Should not happen: plan selections are dependency-closed.
                warn!(task = %run.name, dep = %dep, "dependency missing from run table");
                false
            }
        })
    }

    /// Examine the dependents of a task that just became Done, recursing
    /// through dependents that turn out to be up to date.
    fn cascade_dependents(&mut self, task: &str, out: &mut Vec<ScheduledJob>) -> Result<()> {
        let dependents = self.graph.dependents_of(task).to_vec();

        for dependent in dependents {
            if !self.tasks.contains_key(&dependent) {
                continue;
            }
            match self.examine(&dependent)? {
                ReadyOutcome::Scheduled(jobs) => out.extend(jobs),
                ReadyOutcome::FreshDone => self.cascade_dependents(&dependent, out)?,
                ReadyOutcome::NotReady => {}
            }
        }

        Ok(())
    }

    /// Mark the downstream closure of a failed task as Skipped.
    ///
    /// Only Pending and Ready tasks are touched; anything terminal or
    /// already running keeps its state.
    fn mark_dependents_skipped(&mut self, failed: &str) -> Vec<TaskName> {
        let mut stack: Vec<TaskName> = self.graph.dependents_of(failed).to_vec();
        let mut newly_skipped = Vec::new();

        while let Some(name) = stack.pop() {
            if let Some(run) = self.tasks.get_mut(&name) {
                if matches!(run.state, RunState::Pending | RunState::Ready) {
                    run.state = RunState::Skipped;
                    debug!(task = %run.name, "skipped due to upstream failure");
                    newly_skipped.push(run.name.clone());
                    stack.extend(self.graph.dependents_of(&name).iter().cloned());
                }
            }
        }

        newly_skipped
    }
}

// src/plan/planner.rs

//! Resolves the validated config into a concrete execution plan.
//!
//! Planning happens once, before the run:
//! - glob input sources are expanded against the project root,
//! - `from` sources become the upstream tasks' planned output paths,
//! - each task's input set expands into jobs according to its expand mode,
//! - output templates and the command template are rendered per job.
//!
//! Tasks are planned in topological order so upstream output sets exist
//! by the time consumers are planned.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::debug;

use crate::config::model::{ConfigFile, ExpandMode, TaskConfig};
use crate::dag::TaskGraph;
use crate::errors::{PipedagError, Result};
use crate::fs::FileSystem;
use crate::plan::pattern::CapturePattern;
use crate::plan::template;

/// An in-process executor: takes the job's resolved input and output paths.
pub type InProcessFn = Arc<dyn Fn(&[PathBuf], &[PathBuf]) -> anyhow::Result<()> + Send + Sync>;

/// How a job runs: an external command line or an in-process function.
///
/// Config-declared tasks always get a `Command`; embedders can swap in a
/// `Callable` via [`Plan::set_callable`].
#[derive(Clone)]
pub enum JobExecutor {
    /// Fully rendered command line, ready for `sh -c`.
    Command(String),
    /// In-process function over (input paths, output paths).
    Callable(InProcessFn),
}

impl fmt::Debug for JobExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobExecutor::Command(cmd) => f.debug_tuple("Command").field(cmd).finish(),
            JobExecutor::Callable(_) => f.write_str("Callable(..)"),
        }
    }
}

/// One concrete unit of execution.
#[derive(Debug, Clone)]
pub struct Job {
    pub inputs: Vec<PathBuf>,
    pub outputs: Vec<PathBuf>,
    pub executor: JobExecutor,
}

impl Job {
    /// The rendered command line, if this job runs an external command.
    pub fn command(&self) -> Option<&str> {
        match &self.executor {
            JobExecutor::Command(cmd) => Some(cmd),
            JobExecutor::Callable(_) => None,
        }
    }
}

/// A task's resolved jobs plus its pass-through resource hints.
#[derive(Debug, Clone)]
pub struct TaskPlan {
    pub name: String,
    pub jobs: Vec<Job>,
    pub cpus: u32,
    pub mem_mb: u64,
}

impl TaskPlan {
    /// All output paths across this task's jobs.
    pub fn output_paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.jobs.iter().flat_map(|j| j.outputs.iter())
    }
}

/// The full resolved plan, keyed by task name.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub tasks: BTreeMap<String, TaskPlan>,
}

impl Plan {
    /// Replace a task's executor with an in-process function.
    ///
    /// The function receives each job's resolved input and output paths;
    /// every job of the task is switched over.
    pub fn set_callable(&mut self, task: &str, f: InProcessFn) -> Result<()> {
        let Some(task_plan) = self.tasks.get_mut(task) else {
            return Err(PipedagError::ConfigError(format!(
                "cannot attach callable: unknown task '{}'",
                task
            )));
        };
        for job in task_plan.jobs.iter_mut() {
            job.executor = JobExecutor::Callable(f.clone());
        }
        Ok(())
    }
}

/// Build the execution plan.
///
/// `selected` restricts planning to a subset of tasks (a `--target` closure);
/// it must be dependency-closed, which [`TaskGraph::ancestors_of`] guarantees.
pub fn build_plan(
    cfg: &ConfigFile,
    graph: &TaskGraph,
    fs: &dyn FileSystem,
    root: &Path,
    selected: Option<&HashSet<String>>,
) -> Result<Plan> {
    let mut plan = Plan::default();

    for name in graph.topo_order() {
        if let Some(sel) = selected {
            if !sel.contains(&name) {
                continue;
            }
        }

        let task = cfg
            .task
            .get(&name)
            .expect("graph tasks come from the config");

        let inputs = resolve_inputs(&name, task, fs, root, &plan)?;
        let task_plan = expand_task(&name, task, cfg, root, inputs)?;

        debug!(
            task = %name,
            jobs = task_plan.jobs.len(),
            "planned task"
        );

        plan.tasks.insert(name, task_plan);
    }

    Ok(plan)
}

/// Resolve a task's input file set: glob discovery plus upstream outputs.
fn resolve_inputs(
    name: &str,
    task: &TaskConfig,
    fs: &dyn FileSystem,
    root: &Path,
    plan: &Plan,
) -> Result<Vec<PathBuf>> {
    let mut inputs = Vec::new();

    if !task.inputs.is_empty() {
        let set = build_globset(&task.inputs)
            .with_context(|| format!("building input globset for task '{name}'"))?;

        let mut discovered = collect_matching_files(fs, root, &set)?;
        if discovered.is_empty() {
            return Err(PipedagError::ConfigError(format!(
                "task '{}' input patterns {:?} matched no files under {:?}",
                name, task.inputs, root
            )));
        }
        inputs.append(&mut discovered);
    }

    for upstream in task.from.iter() {
        let upstream_plan = plan
            .tasks
            .get(upstream)
            .expect("upstream tasks are planned first (topological order)");
        inputs.extend(upstream_plan.output_paths().cloned());
    }

    inputs.sort();
    inputs.dedup();
    Ok(inputs)
}

/// Expand a task's input set into jobs according to its expand mode.
fn expand_task(
    name: &str,
    task: &TaskConfig,
    cfg: &ConfigFile,
    root: &Path,
    inputs: Vec<PathBuf>,
) -> Result<TaskPlan> {
    let cpus = task.effective_cpus(&cfg.default);
    let mem_mb = task.effective_mem_mb(&cfg.default);

    let jobs = match task.expand {
        ExpandMode::Merge => {
            let job = make_job(name, task, cfg, root, inputs, &BTreeMap::new())?;
            vec![job]
        }
        ExpandMode::Transform => {
            let pattern = compiled_pattern(task);
            let mut jobs = Vec::with_capacity(inputs.len());
            for input in inputs {
                let captures = captures_for(name, &pattern, &input)?;
                jobs.push(make_job(name, task, cfg, root, vec![input], &captures)?);
            }
            jobs
        }
        ExpandMode::Collate => {
            let pattern = compiled_pattern(task);
            // Bucket inputs by their capture values; BTreeMap keys keep the
            // job order deterministic.
            let mut buckets: BTreeMap<BTreeMap<String, String>, Vec<PathBuf>> = BTreeMap::new();
            for input in inputs {
                let captures = captures_for(name, &pattern, &input)?;
                buckets.entry(captures).or_default().push(input);
            }

            let mut jobs = Vec::with_capacity(buckets.len());
            for (captures, files) in buckets {
                jobs.push(make_job(name, task, cfg, root, files, &captures)?);
            }
            jobs
        }
    };

    Ok(TaskPlan {
        name: name.to_string(),
        jobs,
        cpus,
        mem_mb,
    })
}

fn compiled_pattern(task: &TaskConfig) -> CapturePattern {
    let raw = task
        .match_pattern
        .as_ref()
        .expect("validation requires a pattern for transform/collate");
    CapturePattern::new(raw).expect("validation compiled this pattern already")
}

fn captures_for(
    name: &str,
    pattern: &CapturePattern,
    input: &Path,
) -> Result<BTreeMap<String, String>> {
    pattern
        .captures(input)
        .ok_or_else(|| PipedagError::PatternMismatch {
            task: name.to_string(),
            path: input.to_string_lossy().into_owned(),
            pattern: pattern.raw().to_string(),
        })
}

/// Render the output templates and command for one job.
fn make_job(
    name: &str,
    task: &TaskConfig,
    cfg: &ConfigFile,
    root: &Path,
    inputs: Vec<PathBuf>,
    captures: &BTreeMap<String, String>,
) -> Result<Job> {
    let mut outputs = Vec::new();
    for tpl in task.output_templates() {
        let rendered =
            template::render(&tpl, captures).map_err(|_| PipedagError::PatternMismatch {
                task: name.to_string(),
                path: tpl.clone(),
                pattern: task.match_pattern.clone().unwrap_or_default(),
            })?;
        outputs.push(under_root(root, &rendered));
    }

    let mut vars = captures.clone();
    vars.insert("inputs".to_string(), join_paths(&inputs));
    vars.insert("outputs".to_string(), join_paths(&outputs));
    if let Some(first) = inputs.first() {
        vars.insert("input".to_string(), first.display().to_string());
    }
    if let Some(first) = outputs.first() {
        vars.insert("output".to_string(), first.display().to_string());
    }
    vars.insert(
        "cpus".to_string(),
        task.effective_cpus(&cfg.default).to_string(),
    );
    vars.insert(
        "mem_mb".to_string(),
        task.effective_mem_mb(&cfg.default).to_string(),
    );

    let command = template::render(&task.command, &vars).map_err(|missing| {
        PipedagError::ConfigError(format!(
            "task '{}': command placeholder {{{}}} has no value for this job",
            name, missing
        ))
    })?;

    Ok(Job {
        inputs,
        outputs,
        executor: JobExecutor::Command(command),
    })
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Build a GlobSet from simple string patterns.
fn build_globset(patterns: &[String]) -> anyhow::Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat).with_context(|| format!("invalid glob pattern: {pat}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

/// Collect all files under `root` whose root-relative path matches the set.
fn collect_matching_files(fs: &dyn FileSystem, root: &Path, set: &GlobSet) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        for path in fs.read_dir(&dir)? {
            let path = normalize(path);
            if fs.is_dir(&path) {
                stack.push(path);
            } else if fs.is_file(&path) {
                let rel = path.strip_prefix(root).unwrap_or(&path);
                let rel_str = rel.to_string_lossy().replace('\\', "/");
                if set.is_match(&rel_str) {
                    files.push(path.clone());
                }
            }
        }
    }

    Ok(files)
}

/// Place a root-relative rendered path under the project root.
fn under_root(root: &Path, rel: &str) -> PathBuf {
    if root.as_os_str().is_empty() || root.as_os_str() == "." {
        PathBuf::from(rel)
    } else {
        root.join(rel)
    }
}

/// Drop a leading `./` so paths compare cleanly when the root is the
/// current directory.
fn normalize(path: PathBuf) -> PathBuf {
    match path.strip_prefix(".") {
        Ok(stripped) if !stripped.as_os_str().is_empty() => stripped.to_path_buf(),
        _ => path,
    }
}

// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod plan;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::dag::{Scheduler, TaskGraph};
use crate::engine::{CoreRuntime, RunReport, Runtime, RuntimeEvent};
use crate::errors::{PipedagError, Result};
use crate::exec::RealExecutorBackend;
use crate::fs::{FileSystem, RealFileSystem};
use crate::plan::{Plan, build_plan};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and validation
/// - plan resolution (input discovery, job expansion)
/// - scheduler / core runtime / executor
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<RunReport> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;

    let graph = TaskGraph::from_config(&cfg);
    let root_dir = config_root_dir(&config_path);
    let selected = target_selection(&graph, args.target.as_deref())?;

    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let plan = build_plan(&cfg, &graph, fs.as_ref(), &root_dir, selected.as_ref())?;

    if args.dry_run {
        print_dry_run(&cfg, &graph, &plan);
        return Ok(RunReport::default());
    }

    let max_parallel = args.jobs.unwrap_or(cfg.config.max_parallel);
    info!(
        tasks = plan.tasks.len(),
        max_parallel, "starting pipeline run"
    );

    // Runtime event channel.
    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);

    // Process executor backend (real implementation in production).
    let executor = RealExecutorBackend::new(rt_tx.clone());

    // Ctrl-C → graceful shutdown: unstarted tasks are skipped, running
    // processes are left to finish.
    {
        let tx = rt_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
        });
    }

    let scheduler = Scheduler::new(graph, plan, fs, args.force);
    let core = CoreRuntime::new(scheduler, max_parallel);
    let runtime = Runtime::new(core, rt_rx, executor);

    let report = runtime.run().await?;
    report.log_summary();
    Ok(report)
}

/// Figure out the project root that input globs and output templates are
/// relative to.
///
/// - If the config path has a non-empty parent (e.g. "configs/Pipedag.toml"),
///   we use that directory.
/// - If it's just a bare filename like "Pipedag.toml" (parent = ""),
///   we fall back to the current working directory "."
fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Resolve `--target` into the dependency-closed set of tasks to run.
fn target_selection(graph: &TaskGraph, target: Option<&str>) -> Result<Option<HashSet<String>>> {
    match target {
        None => Ok(None),
        Some(name) => {
            if !graph.contains(name) {
                return Err(PipedagError::ConfigError(format!(
                    "--target task '{}' is not declared in the config",
                    name
                )));
            }
            Ok(Some(graph.ancestors_of(name)))
        }
    }
}

/// Simple dry-run output: print tasks, deps, resource hints and jobs.
fn print_dry_run(cfg: &ConfigFile, graph: &TaskGraph, plan: &Plan) {
    println!("pipedag dry-run");
    println!("  config.max_parallel = {}", cfg.config.max_parallel);
    println!();

    println!("tasks ({}):", plan.tasks.len());
    for name in graph.topo_order() {
        let Some(task_plan) = plan.tasks.get(&name) else {
            continue;
        };

        println!("  - {name}");
        let deps = graph.dependencies_of(&name);
        if !deps.is_empty() {
            println!("      from: {:?}", deps);
        }
        println!(
            "      cpus: {}, mem_mb: {}",
            task_plan.cpus, task_plan.mem_mb
        );
        for (index, job) in task_plan.jobs.iter().enumerate() {
            println!("      job {index}:");
            if !job.inputs.is_empty() {
                println!("        inputs: {:?}", job.inputs);
            }
            println!("        outputs: {:?}", job.outputs);
            match job.command() {
                Some(cmd) => println!("        cmd: {cmd}"),
                None => println!("        cmd: <in-process>"),
            }
        }
    }
}

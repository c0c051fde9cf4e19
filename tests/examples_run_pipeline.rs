// tests/examples_run_pipeline.rs

//! End-to-end runs against a real temp directory and real `sh` commands.

#![cfg(unix)]

use std::error::Error;
use std::fs;
use std::path::Path;

use pipedag::cli::CliArgs;
use pipedag::engine::TaskStatus;
use pipedag_test_utils::init_tracing;
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn Error>>;

const CONFIG: &str = r#"
[config]
max_parallel = 2

[task.trim]
command = "cp {input} {output}"
inputs = ["raw.txt"]
output = "trimmed.txt"

[task.stats]
command = "wc -c < {input} > {output}"
from = ["trim"]
output = "stats.txt"
"#;

fn write_project(dir: &Path) {
    fs::write(dir.join("raw.txt"), "ACGTACGT\n").unwrap();
    fs::write(dir.join("Pipedag.toml"), CONFIG).unwrap();
}

fn args(dir: &Path) -> CliArgs {
    CliArgs {
        config: dir.join("Pipedag.toml").to_string_lossy().into_owned(),
        jobs: None,
        target: None,
        force: false,
        dry_run: false,
        log_level: None,
    }
}

fn status_of(report: &pipedag::engine::RunReport, name: &str) -> TaskStatus {
    report
        .tasks
        .iter()
        .find(|t| t.name == name)
        .unwrap_or_else(|| panic!("no report entry for {name}"))
        .status
}

#[tokio::test]
async fn first_run_executes_everything_second_run_nothing() -> TestResult {
    init_tracing();

    let dir = TempDir::new()?;
    write_project(dir.path());

    let report = pipedag::run(args(dir.path())).await?;
    assert!(report.success());
    assert_eq!(status_of(&report, "trim"), TaskStatus::Ran);
    assert_eq!(status_of(&report, "stats"), TaskStatus::Ran);

    assert_eq!(fs::read(dir.path().join("trimmed.txt"))?, b"ACGTACGT\n");
    assert!(dir.path().join("stats.txt").exists());

    // Re-invocation with unchanged inputs runs nothing.
    let report = pipedag::run(args(dir.path())).await?;
    assert!(report.success());
    assert_eq!(status_of(&report, "trim"), TaskStatus::UpToDate);
    assert_eq!(status_of(&report, "stats"), TaskStatus::UpToDate);

    Ok(())
}

#[tokio::test]
async fn deleting_an_output_reruns_the_producing_task_and_downstream() -> TestResult {
    init_tracing();

    let dir = TempDir::new()?;
    write_project(dir.path());

    pipedag::run(args(dir.path())).await?;
    fs::remove_file(dir.path().join("trimmed.txt"))?;

    let report = pipedag::run(args(dir.path())).await?;
    assert!(report.success());
    assert_eq!(status_of(&report, "trim"), TaskStatus::Ran);
    assert_eq!(status_of(&report, "stats"), TaskStatus::Ran);
    assert!(dir.path().join("trimmed.txt").exists());

    Ok(())
}

#[tokio::test]
async fn failing_command_yields_failed_report() -> TestResult {
    init_tracing();

    let dir = TempDir::new()?;
    fs::write(dir.path().join("raw.txt"), "ACGT\n")?;
    fs::write(
        dir.path().join("Pipedag.toml"),
        r#"
        [task.broken]
        command = "exit 3"
        inputs = ["raw.txt"]
        output = "never.txt"

        [task.after_broken]
        command = "cp {input} {output}"
        from = ["broken"]
        output = "after.txt"

        [task.fine]
        command = "cp {input} {output}"
        inputs = ["raw.txt"]
        output = "fine.txt"
        "#,
    )?;

    let report = pipedag::run(args(dir.path())).await?;
    assert!(!report.success());
    assert_eq!(status_of(&report, "broken"), TaskStatus::Failed { code: 3 });
    assert_eq!(status_of(&report, "after_broken"), TaskStatus::Skipped);
    assert_eq!(status_of(&report, "fine"), TaskStatus::Ran);
    assert!(dir.path().join("fine.txt").exists());

    Ok(())
}

#[tokio::test]
async fn target_runs_only_the_task_and_its_ancestors() -> TestResult {
    init_tracing();

    let dir = TempDir::new()?;
    write_project(dir.path());

    let mut cli = args(dir.path());
    cli.target = Some("trim".to_string());

    let report = pipedag::run(cli).await?;
    assert!(report.success());
    assert_eq!(report.tasks.len(), 1);
    assert_eq!(status_of(&report, "trim"), TaskStatus::Ran);
    assert!(!dir.path().join("stats.txt").exists());

    Ok(())
}

#[tokio::test]
async fn in_process_callable_runs_without_a_shell() -> TestResult {
    use std::sync::Arc;

    use pipedag::dag::{Scheduler, TaskGraph};
    use pipedag::engine::{CoreRuntime, Runtime, RuntimeEvent};
    use pipedag::exec::RealExecutorBackend;
    use pipedag::fs::RealFileSystem;
    use pipedag::plan::build_plan;
    use pipedag_test_utils::builders::{ConfigFileBuilder, TaskConfigBuilder};
    use tokio::sync::mpsc;

    init_tracing();

    let dir = TempDir::new()?;
    fs::write(dir.path().join("raw.txt"), "ACGT\n")?;

    // The declared command is a placeholder; the embedder swaps in an
    // in-process function before the run.
    let cfg = ConfigFileBuilder::new()
        .with_task(
            "copy",
            TaskConfigBuilder::new("true")
                .input("raw.txt")
                .output("copied.txt")
                .build(),
        )
        .build();

    let graph = TaskGraph::from_config(&cfg);
    let mut plan = build_plan(&cfg, &graph, &RealFileSystem, dir.path(), None)?;
    plan.set_callable(
        "copy",
        Arc::new(|inputs, outputs| {
            std::fs::copy(&inputs[0], &outputs[0])?;
            Ok(())
        }),
    )?;

    let scheduler = Scheduler::new(graph, plan, Arc::new(RealFileSystem), false);
    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(16);
    let executor = RealExecutorBackend::new(rt_tx.clone());
    let runtime = Runtime::new(CoreRuntime::new(scheduler, 2), rt_rx, executor);

    let report = runtime.run().await?;
    assert!(report.success());
    assert_eq!(status_of(&report, "copy"), TaskStatus::Ran);
    assert_eq!(fs::read(dir.path().join("copied.txt"))?, b"ACGT\n");

    Ok(())
}

#[tokio::test]
async fn dry_run_executes_nothing() -> TestResult {
    init_tracing();

    let dir = TempDir::new()?;
    write_project(dir.path());

    let mut cli = args(dir.path());
    cli.dry_run = true;

    let report = pipedag::run(cli).await?;
    assert!(report.tasks.is_empty());
    assert!(!dir.path().join("trimmed.txt").exists());

    Ok(())
}

// tests/core_parallel_cap.rs

//! The worker-pool cap lives in the pure core, so it can be checked
//! without Tokio: dispatch commands must never carry more jobs than free
//! worker slots.

use std::path::Path;
use std::sync::Arc;

use pipedag::config::ExpandMode;
use pipedag::dag::{Scheduler, TaskGraph};
use pipedag::engine::core::{CoreCommand, CoreRuntime};
use pipedag::engine::{JobOutcome, RuntimeEvent};
use pipedag::fs::mock::MockFileSystem;
use pipedag::plan::build_plan;
use pipedag_test_utils::builders::{ConfigFileBuilder, TaskConfigBuilder};

fn dispatched(commands: &[CoreCommand]) -> Vec<(String, usize)> {
    commands
        .iter()
        .flat_map(|c| match c {
            CoreCommand::DispatchJobs(jobs) => jobs
                .iter()
                .map(|j| (j.task.clone(), j.job_index))
                .collect::<Vec<_>>(),
        })
        .collect()
}

#[test]
fn dispatch_never_exceeds_max_parallel() {
    let fs = MockFileSystem::new();
    for i in 0..6 {
        fs.add_file(format!("data/s{i}/reads.fastq.gz"), 100);
    }

    let cfg = ConfigFileBuilder::new()
        .with_task(
            "trim",
            TaskConfigBuilder::new("scripts/trim {input} {output}")
                .input("data/**/*.fastq.gz")
                .expand(ExpandMode::Transform)
                .match_pattern(r".+/s(?P<N>\d+)/.+")
                .output("out/s{N}.fastq.gz")
                .build(),
        )
        .build();
    let graph = TaskGraph::from_config(&cfg);
    let plan = build_plan(&cfg, &graph, &fs, Path::new("."), None).unwrap();

    let scheduler = Scheduler::new(graph, plan, Arc::new(fs), false);
    let mut core = CoreRuntime::new(scheduler, 2);

    let step = core.start();
    let mut in_flight = dispatched(&step.commands);
    assert_eq!(in_flight.len(), 2, "initial dispatch respects the cap");
    assert_eq!(core.running_jobs(), 2);

    let mut completed = 0;
    while let Some((task, job_index)) = in_flight.pop() {
        let step = core.step(RuntimeEvent::JobCompleted {
            task,
            job_index,
            outcome: JobOutcome::Success,
        });
        completed += 1;

        let newly = dispatched(&step.commands);
        in_flight.extend(newly);
        assert!(
            core.running_jobs() <= 2,
            "running jobs exceeded the cap after {completed} completions"
        );

        if in_flight.is_empty() {
            assert!(!step.keep_running);
        }
    }

    assert_eq!(completed, 6, "all six jobs eventually ran");
}

#[test]
fn run_finishes_immediately_when_everything_is_current() {
    let fs = MockFileSystem::new();
    fs.add_file("in.txt", 100);
    fs.add_file("out.txt", 200);

    let cfg = ConfigFileBuilder::new()
        .with_task(
            "trim",
            TaskConfigBuilder::new("scripts/trim {input} {output}")
                .input("in.txt")
                .output("out.txt")
                .build(),
        )
        .build();
    let graph = TaskGraph::from_config(&cfg);
    let plan = build_plan(&cfg, &graph, &fs, Path::new("."), None).unwrap();

    let scheduler = Scheduler::new(graph, plan, Arc::new(fs), false);
    let mut core = CoreRuntime::new(scheduler, 4);

    let step = core.start();
    assert!(step.commands.is_empty());
    assert!(!step.keep_running);
    assert!(core.report().success());
}

#[test]
fn shutdown_waits_for_in_flight_jobs_only() {
    let fs = MockFileSystem::new();
    fs.add_file("raw.txt", 300);
    fs.add_file("a.out", 100);
    fs.add_file("b.out", 100);

    let cfg = ConfigFileBuilder::new()
        .with_task(
            "a",
            TaskConfigBuilder::new("scripts/a {input} {output}")
                .input("raw.txt")
                .output("a.out")
                .build(),
        )
        .with_task(
            "b",
            TaskConfigBuilder::new("scripts/b {input} {output}")
                .input("raw.txt")
                .output("b.out")
                .build(),
        )
        .build();
    let graph = TaskGraph::from_config(&cfg);
    let plan = build_plan(&cfg, &graph, &fs, Path::new("."), None).unwrap();

    let scheduler = Scheduler::new(graph, plan, Arc::new(fs), false);
    let mut core = CoreRuntime::new(scheduler, 1);

    let step = core.start();
    let in_flight = dispatched(&step.commands);
    assert_eq!(in_flight.len(), 1);

    // Shutdown with one job running and one queued: keep running until the
    // in-flight completion arrives, but dispatch nothing new.
    let step = core.step(RuntimeEvent::ShutdownRequested);
    assert!(step.commands.is_empty());
    assert!(step.keep_running);

    let (task, job_index) = in_flight[0].clone();
    let step = core.step(RuntimeEvent::JobCompleted {
        task,
        job_index,
        outcome: JobOutcome::Success,
    });
    assert!(step.commands.is_empty());
    assert!(!step.keep_running);

    let report = core.report();
    assert!(!report.success());
    assert_eq!(report.skipped().count(), 1);
}

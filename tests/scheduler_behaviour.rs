// tests/scheduler_behaviour.rs

//! Scheduler-level tests driven directly through `start` /
//! `on_job_completed`, with a mock filesystem providing the mtimes.

use std::path::Path;
use std::sync::Arc;

use pipedag::config::ConfigFile;
use pipedag::dag::state::RunState;
use pipedag::dag::{Scheduler, TaskGraph};
use pipedag::engine::JobOutcome;
use pipedag::fs::mock::MockFileSystem;
use pipedag::plan::build_plan;
use pipedag_test_utils::builders::{ConfigFileBuilder, TaskConfigBuilder};

/// raw.txt -> trim -> stats, plus an independent branch raw.txt -> kmer.
///
/// Upstream outputs exist (old) so downstream inputs resolve; all outputs
/// are older than the raw input, so every task is stale.
fn pipeline_config() -> ConfigFile {
    ConfigFileBuilder::new()
        .with_task(
            "trim",
            TaskConfigBuilder::new("scripts/trim {inputs} {output}")
                .input("raw.txt")
                .output("trimmed.txt")
                .build(),
        )
        .with_task(
            "stats",
            TaskConfigBuilder::new("scripts/stats {input} {output}")
                .from("trim")
                .output("stats.txt")
                .build(),
        )
        .with_task(
            "kmer",
            TaskConfigBuilder::new("scripts/kmer {inputs} {output}")
                .input("raw.txt")
                .output("kmer.txt")
                .build(),
        )
        .build()
}

fn stale_everything_fs() -> MockFileSystem {
    let fs = MockFileSystem::new();
    fs.add_file("raw.txt", 300);
    fs.add_file("trimmed.txt", 100);
    fs.add_file("stats.txt", 100);
    fs.add_file("kmer.txt", 100);
    fs
}

fn scheduler_for(cfg: &ConfigFile, fs: MockFileSystem, force: bool) -> Scheduler {
    let graph = TaskGraph::from_config(cfg);
    let plan = build_plan(cfg, &graph, &fs, Path::new("."), None).unwrap();
    Scheduler::new(graph, plan, Arc::new(fs), force)
}

#[test]
fn chain_runs_in_dependency_order() {
    let cfg = pipeline_config();
    let fs = stale_everything_fs();
    let mut scheduler = scheduler_for(&cfg, fs.clone(), false);

    let ready = scheduler.start().unwrap();
    let mut names: Vec<_> = ready.iter().map(|j| j.task.clone()).collect();
    names.sort();
    // Roots run first; stats waits on trim.
    assert_eq!(names, vec!["kmer", "trim"]);

    // trim rewrites its output, so stats sees a newer input.
    fs.add_file("trimmed.txt", 400);
    scheduler.note_job_dispatched("trim");
    let step = scheduler
        .on_job_completed("trim", 0, JobOutcome::Success)
        .unwrap();
    assert_eq!(step.newly_ready.len(), 1);
    assert_eq!(step.newly_ready[0].task, "stats");

    scheduler.note_job_dispatched("stats");
    scheduler
        .on_job_completed("stats", 0, JobOutcome::Success)
        .unwrap();
    scheduler.note_job_dispatched("kmer");
    scheduler
        .on_job_completed("kmer", 0, JobOutcome::Success)
        .unwrap();

    assert!(scheduler.all_terminal());
    assert_eq!(
        scheduler.run_state_of("stats"),
        Some(RunState::Done { ran: true })
    );
}

#[test]
fn failure_skips_downstream_closure_but_not_siblings() {
    let cfg = pipeline_config();
    let mut scheduler = scheduler_for(&cfg, stale_everything_fs(), false);

    scheduler.start().unwrap();

    scheduler.note_job_dispatched("trim");
    let step = scheduler
        .on_job_completed("trim", 0, JobOutcome::Failed(2))
        .unwrap();
    assert_eq!(step.newly_skipped, vec!["stats".to_string()]);

    scheduler.note_job_dispatched("kmer");
    scheduler
        .on_job_completed("kmer", 0, JobOutcome::Success)
        .unwrap();

    assert!(scheduler.all_terminal());
    assert_eq!(scheduler.run_state_of("trim"), Some(RunState::Failed));
    assert_eq!(scheduler.run_state_of("stats"), Some(RunState::Skipped));
    assert_eq!(
        scheduler.run_state_of("kmer"),
        Some(RunState::Done { ran: true })
    );

    let report = scheduler.report();
    assert!(!report.success());
    assert_eq!(report.failed().count(), 1);
    assert_eq!(report.skipped().count(), 1);
}

#[test]
fn up_to_date_pipeline_runs_nothing() {
    let cfg = pipeline_config();

    // Outputs newer than the raw input everywhere.
    let fs = MockFileSystem::new();
    fs.add_file("raw.txt", 100);
    fs.add_file("trimmed.txt", 200);
    fs.add_file("stats.txt", 300);
    fs.add_file("kmer.txt", 200);

    let mut scheduler = scheduler_for(&cfg, fs, false);

    let ready = scheduler.start().unwrap();
    assert!(ready.is_empty());
    assert!(scheduler.all_terminal());

    for task in ["trim", "stats", "kmer"] {
        assert_eq!(
            scheduler.run_state_of(task),
            Some(RunState::Done { ran: false }),
            "{task} should be up to date"
        );
    }
    assert!(scheduler.report().success());
}

#[test]
fn deleting_one_output_reruns_exactly_that_task_and_its_dependents() {
    let cfg = pipeline_config();

    // Everything current, then trimmed.txt disappears.
    let fs = MockFileSystem::new();
    fs.add_file("raw.txt", 100);
    fs.add_file("trimmed.txt", 200);
    fs.add_file("stats.txt", 300);
    fs.add_file("kmer.txt", 200);
    fs.remove_file("trimmed.txt");

    let mut scheduler = scheduler_for(&cfg, fs.clone(), false);

    let ready = scheduler.start().unwrap();
    let names: Vec<_> = ready.iter().map(|j| j.task.clone()).collect();
    assert_eq!(names, vec!["trim".to_string()]);

    // kmer is untouched by the missing file.
    assert_eq!(
        scheduler.run_state_of("kmer"),
        Some(RunState::Done { ran: false })
    );

    // trim re-runs and rewrites its output, newer than stats.txt.
    fs.add_file("trimmed.txt", 400);
    scheduler.note_job_dispatched("trim");
    let step = scheduler
        .on_job_completed("trim", 0, JobOutcome::Success)
        .unwrap();
    assert_eq!(step.newly_ready.len(), 1);
    assert_eq!(step.newly_ready[0].task, "stats");
}

#[test]
fn fresh_downstream_is_not_rerun_after_upstream_runs() {
    let cfg = pipeline_config();

    // trim must run (output missing), but its rewritten output ends up
    // older than stats.txt, so stats stays current.
    let fs = MockFileSystem::new();
    fs.add_file("raw.txt", 100);
    fs.add_file("stats.txt", 500);
    fs.add_file("kmer.txt", 200);

    let mut scheduler = scheduler_for(&cfg, fs.clone(), false);

    let ready = scheduler.start().unwrap();
    let names: Vec<_> = ready.iter().map(|j| j.task.clone()).collect();
    assert_eq!(names, vec!["trim".to_string()]);

    fs.add_file("trimmed.txt", 450);
    scheduler.note_job_dispatched("trim");
    let step = scheduler
        .on_job_completed("trim", 0, JobOutcome::Success)
        .unwrap();

    assert!(step.newly_ready.is_empty());
    assert_eq!(
        scheduler.run_state_of("stats"),
        Some(RunState::Done { ran: false })
    );
    assert!(scheduler.all_terminal());
}

#[test]
fn force_reruns_current_tasks() {
    let cfg = pipeline_config();

    let fs = MockFileSystem::new();
    fs.add_file("raw.txt", 100);
    fs.add_file("trimmed.txt", 200);
    fs.add_file("stats.txt", 300);
    fs.add_file("kmer.txt", 200);

    let mut scheduler = scheduler_for(&cfg, fs, true);

    let ready = scheduler.start().unwrap();
    let mut names: Vec<_> = ready.iter().map(|j| j.task.clone()).collect();
    names.sort();
    assert_eq!(names, vec!["kmer", "trim"]);
}

#[test]
fn missing_from_derived_input_surfaces_as_error() {
    let cfg = pipeline_config();

    // trim is stale and its declared output never appears, so stats
    // cannot resolve its input when trim completes.
    let fs = MockFileSystem::new();
    fs.add_file("raw.txt", 300);
    fs.add_file("kmer.txt", 100);

    let mut scheduler = scheduler_for(&cfg, fs, false);

    scheduler.start().unwrap();
    scheduler.note_job_dispatched("trim");
    let err = scheduler
        .on_job_completed("trim", 0, JobOutcome::Success)
        .unwrap_err();

    assert!(matches!(
        err,
        pipedag::errors::PipedagError::MissingInput { .. }
    ));
}

#[test]
fn cancel_skips_everything_unstarted() {
    let cfg = pipeline_config();
    let mut scheduler = scheduler_for(&cfg, stale_everything_fs(), false);

    scheduler.start().unwrap();
    scheduler.note_job_dispatched("trim");
    let skipped = scheduler.cancel();

    // stats was Pending, kmer was Ready (not yet dispatched).
    let mut skipped_sorted = skipped.clone();
    skipped_sorted.sort();
    assert_eq!(skipped_sorted, vec!["kmer".to_string(), "stats".to_string()]);
    assert_eq!(scheduler.run_state_of("trim"), Some(RunState::Running));
}

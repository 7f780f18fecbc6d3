// tests/runtime_fake_supervisor.rs

//! End-to-end driver runs against the fake supervisor backend: no real tool
//! process, scripted console output and exits, real filesystem in a tempdir.

mod common;
use crate::common::init_tracing;

use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

use fragrun::config::manifest::load_manifest;
use fragrun::config::model::JobFile;
use fragrun::driver::{JobEvent, JobReport, JobRuntime, NoPostProcess, RuntimeOptions};
use fragrun::fsio::RealFileSystem;
use fragrun::types::Closeout;
use fragrun_test_utils::builders::{write_job_fixture, JobFileBuilder};
use fragrun_test_utils::fake_supervisor::{FakeSupervisor, ScriptedAttempt};

type TestResult = Result<(), Box<dyn Error>>;

const RUN_COMPLETE: &str = "Loading workflow\nRun complete\n";

fn write_fragment(job: &JobFile, unit: &str) {
    let path = job.results_dir().join(format!("{unit}.out"));
    std::fs::write(path, format!("hits for {unit}\n")).expect("write fragment");
}

async fn run_job(
    job: JobFile,
    script: Vec<ScriptedAttempt>,
    pre_queued: Vec<JobEvent>,
) -> Result<(JobReport, usize), Box<dyn Error>> {
    let job_path = job.job.work_dir.join("Fragrun.toml");
    std::fs::write(&job_path, "# job file stand-in\n")?;
    let units = load_manifest(job.manifest_path())?;

    let (events_tx, mut events_rx) = mpsc::channel::<JobEvent>(64);
    for event in pre_queued {
        events_tx.send(event).await?;
    }

    let backend = FakeSupervisor::new(events_tx.clone(), script);
    let launches = backend.launches();

    let runtime = JobRuntime::new(
        job,
        job_path,
        units,
        backend,
        NoPostProcess,
        Arc::new(RealFileSystem),
        events_tx,
        RuntimeOptions::default(),
    )?;

    let report = timeout(Duration::from_secs(10), runtime.run(&mut events_rx)).await?;
    let launch_count = launches.lock().unwrap().len();
    Ok((report, launch_count))
}

#[tokio::test]
async fn clean_run_consolidates_all_fragments() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let job = JobFileBuilder::new(dir.path()).hold_off_secs(0).build();
    write_job_fixture(&job, &["raw/sample_01.mzML", "raw/sample_02.mzML"]);

    // Fragments already on disk when the tool exits; the finalize sweep must
    // pick them up even though no watcher is running in this test.
    write_fragment(&job, "sample_01");
    write_fragment(&job, "sample_02");

    let consolidated = job.consolidated_path();
    let input_01 = job.job.work_dir.join("raw/sample_01.mzML");
    let (report, launches) = run_job(
        job,
        vec![ScriptedAttempt::clean_exit(RUN_COMPLETE)],
        vec![],
    )
    .await?;

    assert_eq!(report.closeout, Closeout::Success);
    assert_eq!(report.produced, 2);
    assert_eq!(report.expected, 2);
    assert_eq!(launches, 1);

    let combined = std::fs::read_to_string(consolidated)?;
    assert!(combined.contains("=== \"sample_01\" ==="));
    assert!(combined.contains("=== \"sample_02\" ==="));
    assert!(combined.contains("hits for sample_01"));
    // Consolidated inputs are deleted.
    assert!(!input_01.exists());
    Ok(())
}

#[tokio::test]
async fn clean_exit_without_artifacts_fails_acceptance() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let job = JobFileBuilder::new(dir.path()).build();
    write_job_fixture(&job, &["raw/a.mzML", "raw/b.mzML"]);

    let (report, _) = run_job(
        job,
        vec![ScriptedAttempt::clean_exit(RUN_COMPLETE)],
        vec![],
    )
    .await?;

    assert_eq!(report.closeout, Closeout::Failed);
    assert_eq!(report.produced, 0);
    let message = report.message.expect("failure carries a message");
    assert!(message.contains("0 of 2"), "unexpected message: {message}");
    Ok(())
}

#[tokio::test]
async fn missing_workflow_is_file_not_found() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let job = JobFileBuilder::new(dir.path()).build();
    write_job_fixture(&job, &["raw/a.mzML"]);
    std::fs::remove_file(job.job.work_dir.join(&job.job.workflow))?;

    let (report, launches) = run_job(
        job,
        vec![ScriptedAttempt::clean_exit(RUN_COMPLETE)],
        vec![],
    )
    .await?;

    assert_eq!(report.closeout, Closeout::FileNotFound);
    assert_eq!(launches, 0, "nothing may launch when a required file is missing");
    Ok(())
}

#[tokio::test]
async fn memory_exhaustion_reports_reset_insufficient_memory() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let job = JobFileBuilder::new(dir.path()).build();
    write_job_fixture(&job, &["raw/a.mzML"]);

    let console = "First search start\njava.lang.OutOfMemoryError: Java heap space\n";
    let (report, _) = run_job(
        job,
        vec![ScriptedAttempt::crash(console, 1)],
        vec![],
    )
    .await?;

    assert_eq!(report.closeout, Closeout::ResetInsufficientMemory);
    let message = report.message.expect("OOM carries the offending line");
    assert!(message.contains("OutOfMemoryError"));
    Ok(())
}

#[tokio::test]
async fn crash_within_budget_relaunches_and_succeeds() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let job = JobFileBuilder::new(dir.path()).hold_off_secs(0).build();
    write_job_fixture(&job, &["raw/sample_01.mzML"]);
    write_fragment(&job, "sample_01");

    let script = vec![
        ScriptedAttempt::crash("Loading workflow\n", 137),
        ScriptedAttempt::clean_exit(RUN_COMPLETE),
    ];
    let (report, launches) = run_job(job, script, vec![]).await?;

    assert_eq!(report.closeout, Closeout::Success);
    assert_eq!(launches, 2, "one relaunch after the crash");
    Ok(())
}

#[tokio::test]
async fn timed_out_attempt_relaunches_within_budget() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let job = JobFileBuilder::new(dir.path()).hold_off_secs(0).build();
    write_job_fixture(&job, &["raw/sample_01.mzML"]);
    write_fragment(&job, "sample_01");

    // First attempt is killed at its wall-clock limit; the retry finishes.
    let script = vec![
        ScriptedAttempt::timed_out("Loading workflow\n"),
        ScriptedAttempt::clean_exit(RUN_COMPLETE),
    ];
    let (report, launches) = run_job(job, script, vec![]).await?;

    assert_eq!(report.closeout, Closeout::Success);
    assert_eq!(launches, 2, "a timeout is retried, not terminal");
    assert!(report
        .message
        .expect("the timeout is recorded on the report")
        .contains("wall-clock"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn stalled_pool_is_reset_once_then_aborted() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let job = JobFileBuilder::new(dir.path()).stall_minutes(30).build();
    write_job_fixture(&job, &["raw/a.mzML", "raw/b.mzML"]);
    let job_path = job.job.work_dir.join("Fragrun.toml");
    std::fs::write(&job_path, "# job file stand-in\n")?;
    let units = load_manifest(job.manifest_path())?;

    // The tool runs forever and never drops an artifact. One stall window
    // triggers the pool reset and relaunch; the relaunch is not forward
    // progress, so the second window confirms the stall and aborts instead
    // of burning the whole failure budget on more resets.
    let script = vec![ScriptedAttempt::HoldUntilCancelled {
        console: "Loading workflow\n".to_string(),
        exit: fragrun::supervise::ToolExit {
            exit_code: -9,
            timed_out: false,
        },
    }];
    let (events_tx, mut events_rx) = mpsc::channel::<JobEvent>(64);
    let backend = FakeSupervisor::new(events_tx.clone(), script)
        .with_tick_interval(Duration::from_secs(5 * 60));
    let launches = backend.launches();

    let runtime = JobRuntime::new(
        job,
        job_path,
        units,
        backend,
        NoPostProcess,
        Arc::new(RealFileSystem),
        events_tx,
        RuntimeOptions::default(),
    )?;
    let report = timeout(Duration::from_secs(6 * 3600), runtime.run(&mut events_rx)).await?;

    assert_eq!(report.closeout, Closeout::Failed);
    assert_eq!(
        launches.lock().unwrap().len(),
        2,
        "exactly one pool reset before the abort"
    );
    assert!(report
        .message
        .expect("the stall abort carries a message")
        .contains("two stall windows"));
    Ok(())
}

#[tokio::test]
async fn failure_budget_exhaustion_is_fatal() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let job = JobFileBuilder::new(dir.path()).failure_max(2).build();
    write_job_fixture(&job, &["raw/a.mzML"]);

    // Every attempt crashes; budget of 2 allows one relaunch.
    let script = vec![ScriptedAttempt::crash("Loading workflow\n", 137)];
    let (report, launches) = run_job(job, script, vec![]).await?;

    assert_eq!(report.closeout, Closeout::Failed);
    assert_eq!(launches, 2);
    assert!(report
        .message
        .expect("budget exhaustion carries a message")
        .contains("failure budget exhausted"));
    Ok(())
}

#[tokio::test]
async fn shutdown_request_terminates_the_attempt() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let job = JobFileBuilder::new(dir.path()).build();
    write_job_fixture(&job, &["raw/a.mzML"]);

    let script = vec![ScriptedAttempt::HoldUntilCancelled {
        console: "Loading workflow\n".to_string(),
        exit: fragrun::supervise::ToolExit {
            exit_code: -9,
            timed_out: false,
        },
    }];
    let (report, _) = run_job(job, script, vec![JobEvent::ShutdownRequested]).await?;

    assert_eq!(report.closeout, Closeout::Failed);
    assert!(report
        .message
        .expect("shutdown carries a message")
        .contains("shutdown requested"));
    Ok(())
}

#[tokio::test]
async fn artifact_events_feed_the_appender_mid_run() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let job = JobFileBuilder::new(dir.path()).hold_off_secs(0).build();
    write_job_fixture(&job, &["raw/sample_01.mzML"]);
    write_fragment(&job, "sample_01");
    let fragment = job.results_dir().join("sample_01.out");

    // Detection arrives as an event (watcher path) rather than via the
    // finalize sweep.
    let pre = vec![JobEvent::ArtifactDetected {
        name: "sample_01".to_string(),
        path: fragment,
    }];
    let (report, _) = run_job(
        job,
        vec![ScriptedAttempt::clean_exit(RUN_COMPLETE)],
        pre,
    )
    .await?;

    assert_eq!(report.closeout, Closeout::Success);
    assert_eq!(report.produced, 1);
    Ok(())
}

#[test]
fn report_paths_are_relative_to_work_dir() {
    let job = JobFileBuilder::new(Path::new("/data/jobs/exp42")).build();
    assert_eq!(
        job.consolidated_path(),
        Path::new("/data/jobs/exp42/combined_results.txt")
    );
    assert_eq!(
        job.run_log_path(),
        Path::new("/data/jobs/exp42/fragrun-run.log")
    );
}

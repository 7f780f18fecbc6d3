// src/lib.rs

pub mod appender;
pub mod cli;
pub mod config;
pub mod driver;
pub mod errors;
pub mod fsio;
pub mod logging;
pub mod monitor;
pub mod progress;
pub mod supervise;
pub mod types;
pub mod watch;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::manifest::{load_manifest, WorkUnit};
use crate::config::model::JobFile;
use crate::driver::{JobEvent, JobReport, JobRuntime, NoPostProcess, RuntimeOptions};
use crate::errors::Result;
use crate::fsio::RealFileSystem;
use crate::supervise::backend::RealSuperviseBackend;
use crate::supervise::spec::ToolSpec;
use crate::types::Closeout;
use crate::watch::ArtifactPatterns;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - job file loading + manifest parsing
/// - the supervisor backend and job runtime
/// - the artifact watcher over the results directory
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<JobReport> {
    let job_path = PathBuf::from(&args.job);
    let job = load_and_validate(&job_path)?;
    let units = load_manifest(job.manifest_path())?;
    info!(units = units.len(), family = ?job.tool.family, "job loaded");

    if args.dry_run {
        print_dry_run(&job, &units)?;
        return Ok(JobReport {
            closeout: Closeout::Success,
            message: Some("dry run; nothing launched".to_string()),
            expected: units.len() as u64,
            produced: 0,
            attempts: Vec::new(),
        });
    }

    // Driver event channel: supervisor ticks, artifact detections, shutdown.
    let (events_tx, mut events_rx) = mpsc::channel::<JobEvent>(256);

    let backend = RealSuperviseBackend::new(events_tx.clone());
    let runtime = JobRuntime::new(
        job.clone(),
        job_path,
        units,
        backend,
        NoPostProcess,
        Arc::new(RealFileSystem),
        events_tx.clone(),
        RuntimeOptions {
            no_resume: args.no_resume,
        },
    )?;

    // The tool creates the results directory late; make it exist up front so
    // the watcher has something to attach to.
    std::fs::create_dir_all(job.results_dir())?;
    let patterns = ArtifactPatterns::compile(&job.appender.artifact_glob)?;
    let _watcher_handle = watch::spawn_watcher(job.results_dir(), patterns, events_tx.clone())?;

    // Ctrl-C → graceful shutdown.
    {
        let tx = events_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            let _ = tx.send(JobEvent::ShutdownRequested).await;
        });
    }

    let report = runtime.run(&mut events_rx).await;
    info!(
        closeout = ?report.closeout,
        produced = report.produced,
        expected = report.expected,
        attempts = report.attempts.len(),
        "job finished"
    );
    Ok(report)
}

/// Simple dry-run output: resolved command line, milestone table, thresholds.
fn print_dry_run(job: &JobFile, units: &[WorkUnit]) -> Result<()> {
    let spec = ToolSpec::from_job(job);
    println!("fragrun dry-run");
    println!("  command: {}", spec.command_line());
    println!("  work_dir: {}", job.job.work_dir.display());
    println!("  results_dir: {}", job.results_dir().display());
    println!("  consolidated: {}", job.consolidated_path().display());
    println!();

    println!("work units ({}):", units.len());
    for unit in units {
        println!(
            "  - {} [{}] {}",
            unit.name,
            unit.group,
            unit.input_path.display()
        );
    }
    println!();

    let set = progress::milestone_set(job.tool.family, &job.milestone)?;
    println!("milestones ({}):", set.milestones().len());
    for m in set.milestones() {
        println!("  {:>5.1}%  {}", m.percent, m.name);
    }
    println!();

    println!("monitor:");
    println!("  stall_minutes = {}", job.monitor.stall_minutes);
    println!("  reset_max_attempts = {}", job.monitor.reset_max_attempts);
    println!("  failure_max = {}", job.monitor.failure_max);
    if job.monitor.expected_workers > 0 {
        println!("  expected_workers = {}", job.monitor.expected_workers);
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}

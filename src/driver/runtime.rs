// src/driver/runtime.rs

//! Async job runtime: the IO shell around [`CoreDriver`].
//!
//! Owns the attempt loop. Each attempt launches the tool through the
//! supervisor backend and then selects over the tool's exit, driver events
//! (ticks, artifact detections, shutdown) and the periodic timers (drain,
//! snapshot, node health). All decisions come back from the pure core; this
//! file only performs the IO they imply.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::pin::pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::appender::{Appender, Stager};
use crate::config::manifest::WorkUnit;
use crate::config::model::JobFile;
use crate::driver::attempt::{acceptance, Acceptance, AttemptLedger};
use crate::driver::core::{CoreDriver, TickDirective};
use crate::driver::{JobEvent, JobReport, PostProcess};
use crate::errors::Result;
use crate::fsio::FileSystem;
use crate::monitor::pool::CommandPoolControl;
use crate::monitor::reset::{ResetOutcome, ResetSequence};
use crate::progress::{milestone_set, ProgressCell, ProgressParser};
use crate::supervise::backend::SuperviseBackend;
use crate::supervise::spec::ToolSpec;
use crate::types::{Closeout, ToolFamily};
use crate::watch::{artifact_unit_name, scan_results_dir, ArtifactPatterns};

/// Runtime behaviour toggles from the CLI.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeOptions {
    /// Discard staged partial state and force a clean first attempt.
    pub no_resume: bool,
}

/// One job's async runtime.
pub struct JobRuntime<B: SuperviseBackend, P: PostProcess> {
    job: JobFile,
    job_path: PathBuf,
    units: Vec<WorkUnit>,
    backend: B,
    post: P,
    fs: Arc<dyn FileSystem>,
    events_tx: mpsc::Sender<JobEvent>,
    appender: Arc<Appender>,
    stager: Option<Stager>,
    patterns: ArtifactPatterns,
    parser: ProgressParser,
    progress: ProgressCell,
    core: CoreDriver,
    reset_seq: ResetSequence,
    pool: CommandPoolControl,
    options: RuntimeOptions,
}

impl<B: SuperviseBackend, P: PostProcess> JobRuntime<B, P> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        job: JobFile,
        job_path: PathBuf,
        units: Vec<WorkUnit>,
        backend: B,
        post: P,
        fs: Arc<dyn FileSystem>,
        events_tx: mpsc::Sender<JobEvent>,
        options: RuntimeOptions,
    ) -> Result<Self> {
        let patterns = ArtifactPatterns::compile(&job.appender.artifact_glob)?;
        let set = milestone_set(job.tool.family, &job.milestone)?;
        let parser = ProgressParser::new(set);

        let inputs: HashMap<String, PathBuf> = units
            .iter()
            .map(|u| (u.name.clone(), resolve(&job.job.work_dir, &u.input_path)))
            .collect();
        let appender = Arc::new(Appender::new(
            Arc::clone(&fs),
            job.consolidated_path(),
            Duration::from_secs(job.appender.hold_off_secs),
            job.appender.rate_window,
            inputs,
        ));

        let stager = job
            .job
            .staging_dir
            .clone()
            .map(|dir| Stager::new(Arc::clone(&fs), dir));

        let core = CoreDriver::new(&job.monitor, units.len() as u64, now());
        let reset_seq = ResetSequence::new(
            job.monitor.reset_max_attempts,
            Duration::from_secs(job.monitor.step_timeout_secs),
        );
        let pool = CommandPoolControl::from_config(&job.monitor);

        Ok(Self {
            job,
            job_path,
            units,
            backend,
            post,
            fs,
            events_tx,
            appender,
            stager,
            patterns,
            parser,
            progress: ProgressCell::new(),
            core,
            reset_seq,
            pool,
            options,
        })
    }

    /// Shared read handle onto the latched overall-progress percentage.
    pub fn progress_cell(&self) -> ProgressCell {
        self.progress.clone()
    }

    pub fn appender(&self) -> Arc<Appender> {
        Arc::clone(&self.appender)
    }

    /// Drive the job to a terminal closeout.
    ///
    /// `events_rx` is the receive side of the channel whose send side was
    /// handed to the backend, the watcher and the shutdown hook.
    pub async fn run(mut self, events_rx: &mut mpsc::Receiver<JobEvent>) -> JobReport {
        if let Some(missing) = self.missing_required_file() {
            warn!(path = ?missing, "required file missing; refusing to launch");
            return self.report(
                Closeout::FileNotFound,
                Some(format!("required file not found: {}", missing.display())),
                AttemptLedger::new(),
            );
        }

        self.prepare_initial_state();

        let mut ledger = AttemptLedger::new();
        let mut flush = tokio::time::interval(Duration::from_secs(self.job.appender.flush_secs));
        let mut snapshot =
            tokio::time::interval(Duration::from_secs(self.job.appender.snapshot_minutes * 60));
        let mut health =
            tokio::time::interval(Duration::from_secs(self.job.monitor.health_check_minutes * 60));
        for iv in [&mut flush, &mut snapshot, &mut health] {
            iv.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // Consume the immediate first tick so the timers fire after one
            // whole period.
            iv.reset();
        }
        let snapshot_enabled = self.stager.is_some();
        let health_enabled =
            self.job.tool.family == ToolFamily::Sequest && self.job.monitor.status_cmd.is_some();

        loop {
            ledger.begin(now());

            let spec = ToolSpec::from_job(&self.job);
            info!(command = %spec.command_line(), "launching supervised tool");
            let handle = match self.backend.launch(spec) {
                Ok(handle) => handle,
                Err(e) => {
                    ledger.finish(now(), false, self.appender.total_observed());
                    return self.report(
                        Closeout::Failed,
                        Some(format!("failed to launch tool: {e}")),
                        ledger,
                    );
                }
            };
            let canceller = handle.canceller();

            let mut reset_requested = false;
            let mut stall_abort = false;
            let mut shutdown = false;

            let mut exit_fut = pin!(handle.wait());
            let exit = loop {
                tokio::select! {
                    exit = &mut exit_fut => break exit,

                    maybe = events_rx.recv() => {
                        let Some(event) = maybe else {
                            // All senders gone: treat like a shutdown request.
                            shutdown = true;
                            canceller.cancel();
                            continue;
                        };
                        match event {
                            JobEvent::Tick => {
                                self.on_tick();
                                if self.parser.fatal_error().is_some() {
                                    canceller.cancel();
                                    continue;
                                }
                                match self.core.on_tick(now(), self.appender.total_observed()) {
                                    TickDirective::None => {}
                                    TickDirective::RequestReset => {
                                        reset_requested = true;
                                        canceller.cancel();
                                    }
                                    TickDirective::DropCorruptRemainder => {
                                        let dropped = self.drop_outstanding_inputs();
                                        self.core.forgive_units(dropped);
                                    }
                                    TickDirective::AbortAttempt => {
                                        stall_abort = true;
                                        self.core.record_error(
                                            "no new artifacts across two stall windows",
                                        );
                                        canceller.cancel();
                                    }
                                }
                            }
                            JobEvent::ArtifactDetected { name, path } => {
                                if self.appender.on_artifact_detected(&name, path) {
                                    self.core.on_artifact(now());
                                }
                            }
                            JobEvent::ShutdownRequested => {
                                info!("shutdown requested; terminating tool");
                                shutdown = true;
                                canceller.cancel();
                            }
                        }
                    }

                    _ = flush.tick() => {
                        scan_results_dir(&self.job.results_dir(), &self.patterns, &self.events_tx)
                            .await;
                        let _ = self.appender.drain(false);
                    }

                    _ = snapshot.tick(), if snapshot_enabled => {
                        self.snapshot_partial_state();
                    }

                    _ = health.tick(), if health_enabled => {
                        if self.run_health_check().await {
                            warn!("worker pool degraded below minimum; requesting reset");
                            reset_requested = true;
                            canceller.cancel();
                        }
                    }
                }
            };

            // Final parse catches lines written between the last tick and exit.
            self.on_tick();
            let produced = self.appender.total_observed();
            let attempt_clean = exit.clean()
                && !reset_requested
                && !stall_abort
                && !shutdown
                && self.parser.fatal_error().is_none();
            ledger.finish(now(), attempt_clean, produced);

            if let Some(fatal) = self.parser.fatal_error() {
                self.core.record_error(fatal.to_string());
                let _ = self.appender.final_drain().await;
                return self.report_from_core(Closeout::ResetInsufficientMemory, ledger);
            }
            if shutdown {
                let _ = self.appender.final_drain().await;
                self.core.record_error("shutdown requested");
                return self.report_from_core(Closeout::Failed, ledger);
            }
            if stall_abort {
                let _ = self.appender.final_drain().await;
                return self.report_from_core(Closeout::Failed, ledger);
            }

            if attempt_clean {
                return self.finalize(ledger, events_rx).await;
            }

            let why = if reset_requested {
                "pool reset requested".to_string()
            } else if exit.timed_out {
                self.core.record_error("attempt exceeded its wall-clock limit");
                "attempt timed out".to_string()
            } else {
                format!("tool exited with code {}", exit.exit_code)
            };
            if !self.core.note_failure(&why) {
                self.core.record_error(format!(
                    "failure budget exhausted after: {why}"
                ));
                let _ = self.appender.final_drain().await;
                return self.report_from_core(Closeout::Failed, ledger);
            }

            match self.reset_seq.execute(&mut self.pool).await {
                ResetOutcome::Completed => {
                    info!("pool reset complete; relaunching attempt");
                }
                ResetOutcome::BudgetExhausted => {
                    self.core.record_error("pool reset budget exhausted");
                    let _ = self.appender.final_drain().await;
                    return self.report_from_core(Closeout::Failed, ledger);
                }
            }
        }
    }

    /// Clean-exit path: sweep up the last fragments, apply the acceptance
    /// rule, run post-processing.
    async fn finalize(
        mut self,
        ledger: AttemptLedger,
        events_rx: &mut mpsc::Receiver<JobEvent>,
    ) -> JobReport {
        // Sweep straight off the disk rather than through the event channel:
        // a large backlog of undetected fragments must not fill the channel.
        let entries = self.fs.read_dir(&self.job.results_dir()).unwrap_or_default();
        for path in entries {
            if !self.patterns.matches(&path) {
                continue;
            }
            if let Some(name) = artifact_unit_name(&path) {
                self.appender.on_artifact_detected(&name, path);
            }
        }
        while let Ok(event) = events_rx.try_recv() {
            if let JobEvent::ArtifactDetected { name, path } = event {
                self.appender.on_artifact_detected(&name, path);
            }
        }
        let _ = self.appender.final_drain().await;
        self.snapshot_partial_state();

        let produced = self.appender.total_observed();
        let expected = self.core.expected();
        match acceptance(expected, produced) {
            Acceptance::Accept | Acceptance::AcceptWithWarning => {
                if let Err(e) = self.post.post_process(&self.job.job.work_dir) {
                    warn!(error = %e, "post-processing failed");
                    self.core.record_error(format!("post-processing failed: {e}"));
                    return self.report_from_core(Closeout::ErrorZipping, ledger);
                }
                info!(produced, expected, "job complete");
                self.report_from_core(Closeout::Success, ledger)
            }
            Acceptance::Reject => {
                self.core.record_error(format!(
                    "only {produced} of {expected} expected artifacts were produced"
                ));
                self.report_from_core(Closeout::Failed, ledger)
            }
        }
    }

    fn report_from_core(&mut self, closeout: Closeout, ledger: AttemptLedger) -> JobReport {
        let message = self.core.message().map(str::to_string);
        self.report(closeout, message, ledger)
    }

    fn report(
        &self,
        closeout: Closeout,
        message: Option<String>,
        ledger: AttemptLedger,
    ) -> JobReport {
        JobReport {
            closeout,
            message,
            expected: self.core.expected(),
            produced: self.appender.total_observed(),
            attempts: ledger.into_attempts(),
        }
    }

    /// First missing required file, if any. Checked before anything launches
    /// so a typo'd path fails fast instead of after a tool crash.
    fn missing_required_file(&self) -> Option<PathBuf> {
        let work_dir = &self.job.job.work_dir;
        let required = [
            self.job.tool.program.clone(),
            self.job.manifest_path(),
            resolve(work_dir, &self.job.job.workflow),
        ];
        required.into_iter().find(|p| !self.fs.exists(p))
    }

    /// Decide between resuming staged partial state and a clean restart.
    fn prepare_initial_state(&mut self) {
        let Some(stager) = &self.stager else {
            self.clean_restart();
            return;
        };
        if self.options.no_resume {
            info!("resume disabled on the command line; starting clean");
            self.clean_restart();
            return;
        }

        let work_dir = self.job.job.work_dir.clone();
        let config_files = vec![self.job_path.clone(), resolve(&work_dir, &self.job.job.workflow)];
        if !stager.resume_allowed(&config_files) {
            self.clean_restart();
            return;
        }

        for target in [self.job.consolidated_path(), self.job.run_log_path()] {
            if let Err(e) = stager.restore(&target) {
                warn!(target = ?target, error = %e, "failed to restore staged copy");
            }
        }
        let recovered = self.appender.seed_from_consolidated();
        info!(recovered, "resuming from staged partial state");
    }

    /// Remove leftover outputs from a previous run so this attempt starts
    /// from an empty consolidated file and run log.
    fn clean_restart(&self) {
        for path in [self.job.consolidated_path(), self.job.run_log_path()] {
            if self.fs.exists(&path) {
                if let Err(e) = self.fs.remove_file(&path) {
                    warn!(path = ?path, error = %e, "failed to remove stale output");
                } else {
                    debug!(path = ?path, "removed stale output from previous run");
                }
            }
        }
    }

    /// Re-scan the run log and publish the latched percentage.
    fn on_tick(&mut self) {
        self.parser.parse_log(&self.job.run_log_path());
        self.progress.store(self.parser.percent());
        if let Some(median) = self.appender.median_unit_secs() {
            debug!(
                percent = self.parser.percent(),
                milestone = self.parser.current_milestone(),
                median_unit_secs = median,
                "progress"
            );
        }
    }

    /// Delete the input files of units that never produced an artifact.
    /// Returns how many units were written off.
    fn drop_outstanding_inputs(&self) -> u64 {
        let mut dropped = 0u64;
        for unit in &self.units {
            if self.appender.is_observed(&unit.name) {
                continue;
            }
            dropped += 1;
            let input = resolve(&self.job.job.work_dir, &unit.input_path);
            if !self.fs.exists(&input) {
                continue;
            }
            match self.fs.remove_file(&input) {
                Ok(()) => warn!(unit = %unit.name, input = ?input, "dropped presumed-corrupt input"),
                Err(e) => warn!(unit = %unit.name, error = %e, "failed to drop corrupt input"),
            }
        }
        dropped
    }

    fn snapshot_partial_state(&self) {
        let Some(stager) = &self.stager else {
            return;
        };
        let sources = vec![
            self.job.consolidated_path(),
            self.job.run_log_path(),
            self.job_path.clone(),
            resolve(&self.job.job.work_dir, &self.job.job.workflow),
        ];
        if let Err(e) = stager.snapshot(&sources) {
            warn!(error = %e, "partial-state snapshot failed");
        }
    }

    /// Run the configured node-status command and feed its output to the
    /// core. Returns `true` when the pool has degraded below the minimum.
    async fn run_health_check(&mut self) -> bool {
        let Some(cmd) = self.job.monitor.status_cmd.clone() else {
            return false;
        };
        let output = match tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&cmd)
            .output()
            .await
        {
            Ok(out) => String::from_utf8_lossy(&out.stdout).into_owned(),
            Err(e) => {
                warn!(cmd = %cmd, error = %e, "node status command failed to run");
                return false;
            }
        };
        self.core.on_health_report(&output, now())
    }
}

/// Timestamps fed to the core come from tokio's clock, not the system
/// clock, so a paused test clock advances stall and health timing together
/// with the timers.
fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

/// Resolve a possibly-relative configured path against the work directory.
fn resolve(work_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        work_dir.join(path)
    }
}

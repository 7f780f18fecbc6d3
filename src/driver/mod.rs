// src/driver/mod.rs

//! Orchestration driver.
//!
//! The driver owns the top-level retry loop: launch a supervised attempt,
//! react to ticks / artifact detections / health reports, decide reset vs.
//! retry vs. terminal result. Decision logic lives in the pure [`core`];
//! the async IO shell is [`runtime`]; attempt bookkeeping and the final
//! acceptance rule live in [`attempt`].

use std::path::PathBuf;

pub mod attempt;
pub mod core;
pub mod runtime;

pub use attempt::{acceptance, Acceptance, AttemptLedger, RunAttempt, ACCEPTANCE_FRACTION};
pub use core::{CoreDriver, TickDirective};
pub use runtime::{JobRuntime, RuntimeOptions};

use crate::types::Closeout;

/// Events flowing into the driver from the supervisor, watcher and timers.
#[derive(Debug, Clone)]
pub enum JobEvent {
    /// Periodic supervisor tick while the tool runs; the driver's scheduling
    /// point for progress parsing and stall evaluation.
    Tick,
    /// A result fragment appeared on disk.
    ArtifactDetected { name: String, path: PathBuf },
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

/// Hook for tool-family-specific result handling after a successful run
/// (archival, report placement). Failures map to [`Closeout::ErrorZipping`].
pub trait PostProcess: Send {
    fn post_process(&mut self, work_dir: &std::path::Path) -> anyhow::Result<()>;
}

/// Default post-processor: results stay where the appender put them.
#[derive(Debug, Default)]
pub struct NoPostProcess;

impl PostProcess for NoPostProcess {
    fn post_process(&mut self, _work_dir: &std::path::Path) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Final report for one job.
#[derive(Debug)]
pub struct JobReport {
    pub closeout: Closeout,
    /// First fatal message, with secondary context appended.
    pub message: Option<String>,
    pub expected: u64,
    pub produced: u64,
    pub attempts: Vec<RunAttempt>,
}

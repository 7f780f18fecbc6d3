// src/driver/attempt.rs

//! Attempt bookkeeping and the final acceptance rule.

use std::time::Instant;

use tracing::{info, warn};

/// Minimum produced/expected fraction accepted as success.
pub const ACCEPTANCE_FRACTION: f64 = 0.999;

/// One launch of the supervised tool.
#[derive(Debug, Clone)]
pub struct RunAttempt {
    pub index: u32,
    pub started: Instant,
    pub finished: Option<Instant>,
    pub success: bool,
    /// Cumulative artifacts produced by the end of this attempt, across all
    /// attempts so far (a retry never double-counts completed work).
    pub produced_cumulative: u64,
}

/// Attempt history for one job.
#[derive(Debug, Default)]
pub struct AttemptLedger {
    attempts: Vec<RunAttempt>,
}

impl AttemptLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new attempt; returns its 1-based index.
    pub fn begin(&mut self, now: Instant) -> u32 {
        let index = self.attempts.len() as u32 + 1;
        self.attempts.push(RunAttempt {
            index,
            started: now,
            finished: None,
            success: false,
            produced_cumulative: 0,
        });
        info!(attempt = index, "starting run attempt");
        index
    }

    /// Close the current attempt.
    pub fn finish(&mut self, now: Instant, success: bool, produced_cumulative: u64) {
        if let Some(current) = self.attempts.last_mut() {
            current.finished = Some(now);
            current.success = success;
            current.produced_cumulative = produced_cumulative;
        }
    }

    pub fn count(&self) -> u32 {
        self.attempts.len() as u32
    }

    pub fn into_attempts(self) -> Vec<RunAttempt> {
        self.attempts
    }
}

/// Outcome of comparing produced artifacts against the expected count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acceptance {
    /// Exact match or surplus.
    Accept,
    /// Shortfall within the 0.1% tolerance; accepted with a warning.
    AcceptWithWarning,
    /// Materially short; hard failure.
    Reject,
}

impl Acceptance {
    pub fn is_success(self) -> bool {
        !matches!(self, Acceptance::Reject)
    }
}

/// Final acceptance rule: produced must be at least 99.9% of expected.
pub fn acceptance(expected: u64, produced: u64) -> Acceptance {
    if produced >= expected {
        return Acceptance::Accept;
    }
    if expected == 0 {
        return Acceptance::Accept;
    }
    let fraction = produced as f64 / expected as f64;
    if fraction >= ACCEPTANCE_FRACTION {
        warn!(
            produced,
            expected, "artifact count slightly short of expected; accepting with warning"
        );
        Acceptance::AcceptWithWarning
    } else {
        warn!(produced, expected, "artifact count materially short of expected");
        Acceptance::Reject
    }
}

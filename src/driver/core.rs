// src/driver/core.rs

//! Pure driver decision logic.
//!
//! The async shell feeds in timestamps, artifact counts and status-command
//! output; the core tracks stall state, node health and failure budgets and
//! answers "what should happen now". No channels, Tokio types or IO.

use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::config::model::MonitorSection;
use crate::monitor::health::NodeHealth;
use crate::monitor::stall::{StallAction, StallMonitor};

/// What the shell must do after feeding a tick into the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickDirective {
    None,
    /// Reset the worker pool and relaunch the attempt.
    RequestReset,
    /// Delete the remaining (presumed corrupt) inputs and keep going.
    DropCorruptRemainder,
    /// The attempt is dead; terminate it.
    AbortAttempt,
}

#[derive(Debug)]
pub struct CoreDriver {
    /// Stall timing spans relaunches: a pool reset is not forward progress,
    /// so suspicion raised in one attempt carries into the next. Only an
    /// observed artifact re-anchors the window.
    stall: StallMonitor,
    health: Option<NodeHealth>,
    expected: u64,
    failure_count: u32,
    failure_max: u32,
    /// First fatal message wins; later errors become secondary context.
    message: Option<String>,
}

impl CoreDriver {
    pub fn new(monitor: &MonitorSection, expected: u64, now: Instant) -> Self {
        let stall_threshold = Duration::from_secs(monitor.stall_minutes * 60);
        let health = (monitor.expected_workers > 0).then(|| {
            NodeHealth::new(
                monitor.expected_workers,
                Duration::from_secs(monitor.node_recent_minutes * 60),
            )
        });

        Self {
            stall: StallMonitor::new(stall_threshold, now),
            health,
            expected,
            failure_count: 0,
            failure_max: monitor.failure_max,
            message: None,
        }
    }

    pub fn expected(&self) -> u64 {
        self.expected
    }

    /// Lower the expected count after corrupt remainders were dropped: the
    /// deleted inputs will never produce artifacts and must not be waited on.
    pub fn forgive_units(&mut self, dropped: u64) {
        self.expected = self.expected.saturating_sub(dropped);
    }

    /// A new artifact was observed.
    pub fn on_artifact(&mut self, now: Instant) {
        self.stall.on_artifact(now);
    }

    /// Supervisor tick: evaluate stall state against produced-so-far.
    pub fn on_tick(&mut self, now: Instant, produced: u64) -> TickDirective {
        let remaining = self.expected.saturating_sub(produced);
        match self.stall.on_tick(now, remaining, self.expected) {
            StallAction::None => TickDirective::None,
            StallAction::RequestReset => TickDirective::RequestReset,
            StallAction::DropCorruptRemainder => TickDirective::DropCorruptRemainder,
            StallAction::AbortAttempt => TickDirective::AbortAttempt,
        }
    }

    /// Status-command output from the health timer. Returns `true` when the
    /// pool has degraded below the minimum active fraction and a reset
    /// should be requested.
    pub fn on_health_report(&mut self, output: &str, now: Instant) -> bool {
        let Some(health) = self.health.as_mut() else {
            return false;
        };
        health.record_status_output(output, now);
        health.below_minimum(now)
    }

    /// Record a recoverable failure (reset request, node degradation).
    ///
    /// Returns `true` while budget remains for another local attempt.
    pub fn note_failure(&mut self, why: &str) -> bool {
        self.failure_count += 1;
        let budget_left = self.failure_count < self.failure_max;
        if budget_left {
            info!(
                failures = self.failure_count,
                max = self.failure_max,
                why,
                "recoverable failure recorded"
            );
        } else {
            warn!(
                failures = self.failure_count,
                max = self.failure_max,
                why,
                "failure budget exhausted; disabling local attempts"
            );
        }
        budget_left
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    /// Retain a human-readable error. The first message wins; later ones are
    /// appended as secondary context rather than overwriting.
    pub fn record_error(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        match &mut self.message {
            None => self.message = Some(msg),
            Some(existing) => {
                existing.push_str("; ");
                existing.push_str(&msg);
            }
        }
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

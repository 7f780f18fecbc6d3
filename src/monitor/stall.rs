// src/monitor/stall.rs

//! Stall detection state machine.
//!
//! Pure state: the async shell feeds in timestamps and remaining-work counts
//! on each supervisor tick, and acts on the returned [`StallAction`]. No
//! timers, channels or IO live here, so every transition is unit testable.

use std::time::{Duration, Instant};

use tracing::{info, warn};

/// Fraction of total work below which a confirmed stall's remainder is
/// presumed corrupt and dropped instead of aborting the attempt.
pub const CORRUPT_REMAINDER_FRACTION: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StallState {
    Healthy,
    /// One full threshold period passed without a new artifact; a pool reset
    /// has been requested and a second period is being waited out.
    SuspectedStall { since: Instant },
    /// Two full periods without an artifact; the attempt is dead.
    Aborted,
}

/// What the shell must do after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StallAction {
    None,
    /// Trigger a full worker-pool reset (halt, wipe, relaunch, re-register).
    RequestReset,
    /// The few remaining inputs are presumed corrupt: delete them and treat
    /// the attempt as recoverable.
    DropCorruptRemainder,
    /// Too much work remains; abort the attempt.
    AbortAttempt,
}

#[derive(Debug)]
pub struct StallMonitor {
    threshold: Duration,
    state: StallState,
    last_artifact: Instant,
}

impl StallMonitor {
    /// `start` anchors the first threshold window (attempt launch time).
    pub fn new(threshold: Duration, start: Instant) -> Self {
        Self {
            threshold,
            state: StallState::Healthy,
            last_artifact: start,
        }
    }

    pub fn state(&self) -> StallState {
        self.state
    }

    /// A new artifact was observed: clear the stall timer, back to healthy.
    pub fn on_artifact(&mut self, now: Instant) {
        if !matches!(self.state, StallState::Healthy) {
            info!("artifact observed; stall suspicion cleared");
        }
        self.state = StallState::Healthy;
        self.last_artifact = now;
    }

    /// Periodic evaluation. `remaining` is expected-but-incomplete work,
    /// `total` the expected artifact count.
    pub fn on_tick(&mut self, now: Instant, remaining: u64, total: u64) -> StallAction {
        match self.state {
            StallState::Healthy => {
                if now.saturating_duration_since(self.last_artifact) > self.threshold {
                    warn!(
                        threshold_secs = self.threshold.as_secs(),
                        "no new artifact within stall threshold; requesting pool reset"
                    );
                    self.state = StallState::SuspectedStall { since: now };
                    StallAction::RequestReset
                } else {
                    StallAction::None
                }
            }
            StallState::SuspectedStall { since } => {
                if now.saturating_duration_since(since) <= self.threshold {
                    return StallAction::None;
                }
                let remaining_fraction = if total == 0 {
                    0.0
                } else {
                    remaining as f64 / total as f64
                };
                if remaining_fraction < CORRUPT_REMAINDER_FRACTION {
                    warn!(
                        remaining,
                        total, "stall confirmed with tiny remainder; presuming corrupt inputs"
                    );
                    // Dropping the remainder counts as forward progress.
                    self.state = StallState::Healthy;
                    self.last_artifact = now;
                    StallAction::DropCorruptRemainder
                } else {
                    warn!(remaining, total, "stall confirmed; aborting attempt");
                    self.state = StallState::Aborted;
                    StallAction::AbortAttempt
                }
            }
            StallState::Aborted => StallAction::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THRESHOLD: Duration = Duration::from_secs(1800);

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn healthy_within_threshold() {
        let t0 = Instant::now();
        let mut m = StallMonitor::new(THRESHOLD, t0);
        assert_eq!(m.on_tick(t0 + secs(1700), 500, 1000), StallAction::None);
        assert_eq!(m.state(), StallState::Healthy);
    }

    #[test]
    fn first_threshold_requests_reset() {
        let t0 = Instant::now();
        let mut m = StallMonitor::new(THRESHOLD, t0);
        assert_eq!(
            m.on_tick(t0 + secs(1801), 500, 1000),
            StallAction::RequestReset
        );
        assert!(matches!(m.state(), StallState::SuspectedStall { .. }));

        // Still inside the second window: nothing more.
        assert_eq!(m.on_tick(t0 + secs(2000), 500, 1000), StallAction::None);
    }

    #[test]
    fn second_threshold_aborts_with_large_remainder() {
        let t0 = Instant::now();
        let mut m = StallMonitor::new(THRESHOLD, t0);
        m.on_tick(t0 + secs(1801), 500, 1000);
        assert_eq!(
            m.on_tick(t0 + secs(3700), 500, 1000),
            StallAction::AbortAttempt
        );
        assert_eq!(m.state(), StallState::Aborted);
        // Aborted is terminal for this attempt.
        assert_eq!(m.on_tick(t0 + secs(9000), 500, 1000), StallAction::None);
    }

    #[test]
    fn second_threshold_drops_tiny_remainder() {
        let t0 = Instant::now();
        let mut m = StallMonitor::new(THRESHOLD, t0);
        m.on_tick(t0 + secs(1801), 0, 10_000);
        // 5 of 10_000 remaining = 0.05% < 0.1%.
        assert_eq!(
            m.on_tick(t0 + secs(3700), 5, 10_000),
            StallAction::DropCorruptRemainder
        );
        assert_eq!(m.state(), StallState::Healthy);
    }

    #[test]
    fn artifact_observation_resets_suspicion() {
        let t0 = Instant::now();
        let mut m = StallMonitor::new(THRESHOLD, t0);
        m.on_tick(t0 + secs(1801), 500, 1000);
        m.on_artifact(t0 + secs(2000));
        assert_eq!(m.state(), StallState::Healthy);
        assert_eq!(m.on_tick(t0 + secs(3700), 499, 1000), StallAction::None);
    }
}

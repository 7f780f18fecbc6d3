// src/monitor/reset.rs

//! Bounded-retry worker-pool reset.
//!
//! A reset is a fixed sequence of discrete steps — halt the pool, wipe
//! per-node temp state, relaunch, re-register nodes — each with its own
//! timeout. The sequence is retried whole; once the budget is spent the
//! condition is fatal and the driver disables further local attempts.

use std::time::Duration;

use tracing::{info, warn};

/// The discrete steps of one reset sequence, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetStep {
    Halt,
    WipeTemp,
    RestartPool,
    RegisterNodes,
}

pub const RESET_STEPS: [ResetStep; 4] = [
    ResetStep::Halt,
    ResetStep::WipeTemp,
    ResetStep::RestartPool,
    ResetStep::RegisterNodes,
];

/// Pool operations the reset sequence drives.
///
/// The cluster family implements this with external commands; the
/// single-process family's implementation only kills/relaunches the tool.
/// Tests substitute a scripted implementation.
pub trait PoolControl: Send {
    fn run_step(
        &mut self,
        step: ResetStep,
    ) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;
}

/// Outcome of [`ResetSequence::execute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetOutcome {
    Completed,
    /// The cumulative attempt budget is spent; fatal, non-retryable.
    BudgetExhausted,
}

#[derive(Debug)]
pub struct ResetSequence {
    max_attempts: u32,
    step_timeout: Duration,
    attempts_used: u32,
}

impl ResetSequence {
    pub fn new(max_attempts: u32, step_timeout: Duration) -> Self {
        Self {
            max_attempts,
            step_timeout,
            attempts_used: 0,
        }
    }

    pub fn attempts_used(&self) -> u32 {
        self.attempts_used
    }

    pub fn budget_exhausted(&self) -> bool {
        self.attempts_used >= self.max_attempts
    }

    /// Run reset sequences until one completes or the cumulative budget is
    /// spent. The budget persists across calls: a pool that keeps needing
    /// resets eventually exhausts it even if individual resets succeed.
    pub async fn execute<P: PoolControl>(&mut self, pool: &mut P) -> ResetOutcome {
        while self.attempts_used < self.max_attempts {
            self.attempts_used += 1;
            info!(
                attempt = self.attempts_used,
                max = self.max_attempts,
                "starting pool reset sequence"
            );

            if self.run_once(pool).await {
                info!(attempt = self.attempts_used, "pool reset sequence completed");
                return ResetOutcome::Completed;
            }
        }

        warn!(
            attempts = self.attempts_used,
            "pool reset budget exhausted; disabling further local attempts"
        );
        ResetOutcome::BudgetExhausted
    }

    async fn run_once<P: PoolControl>(&self, pool: &mut P) -> bool {
        for step in RESET_STEPS {
            let result = tokio::time::timeout(self.step_timeout, pool.run_step(step)).await;
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(?step, error = %e, "reset step failed");
                    return false;
                }
                Err(_) => {
                    warn!(?step, timeout_secs = self.step_timeout.as_secs(), "reset step timed out");
                    return false;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    /// Scripted pool: fails the first `fail_first` whole sequences at the
    /// given step, then succeeds.
    struct ScriptedPool {
        fail_first: u32,
        fail_at: ResetStep,
        sequences_started: u32,
        steps_run: Vec<ResetStep>,
    }

    impl ScriptedPool {
        fn new(fail_first: u32, fail_at: ResetStep) -> Self {
            Self {
                fail_first,
                fail_at,
                sequences_started: 0,
                steps_run: Vec::new(),
            }
        }
    }

    impl PoolControl for ScriptedPool {
        async fn run_step(&mut self, step: ResetStep) -> anyhow::Result<()> {
            if step == ResetStep::Halt {
                self.sequences_started += 1;
            }
            self.steps_run.push(step);
            if self.sequences_started <= self.fail_first && step == self.fail_at {
                return Err(anyhow!("scripted failure at {:?}", step));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn completes_on_first_clean_sequence() {
        let mut seq = ResetSequence::new(4, Duration::from_secs(1));
        let mut pool = ScriptedPool::new(0, ResetStep::Halt);
        assert_eq!(seq.execute(&mut pool).await, ResetOutcome::Completed);
        assert_eq!(pool.steps_run, RESET_STEPS.to_vec());
        assert_eq!(seq.attempts_used(), 1);
    }

    #[tokio::test]
    async fn retries_until_success_within_budget() {
        let mut seq = ResetSequence::new(4, Duration::from_secs(1));
        let mut pool = ScriptedPool::new(2, ResetStep::RestartPool);
        assert_eq!(seq.execute(&mut pool).await, ResetOutcome::Completed);
        assert_eq!(seq.attempts_used(), 3);
    }

    #[tokio::test]
    async fn budget_exhaustion_is_fatal() {
        let mut seq = ResetSequence::new(2, Duration::from_secs(1));
        let mut pool = ScriptedPool::new(10, ResetStep::WipeTemp);
        assert_eq!(seq.execute(&mut pool).await, ResetOutcome::BudgetExhausted);
        assert!(seq.budget_exhausted());
    }

    #[tokio::test]
    async fn budget_persists_across_calls() {
        let mut seq = ResetSequence::new(3, Duration::from_secs(1));
        let mut pool = ScriptedPool::new(0, ResetStep::Halt);
        assert_eq!(seq.execute(&mut pool).await, ResetOutcome::Completed);
        assert_eq!(seq.execute(&mut pool).await, ResetOutcome::Completed);
        assert_eq!(seq.execute(&mut pool).await, ResetOutcome::Completed);
        assert_eq!(seq.execute(&mut pool).await, ResetOutcome::BudgetExhausted);
    }

    #[tokio::test]
    async fn step_timeout_fails_the_sequence() {
        struct HangingPool;
        impl PoolControl for HangingPool {
            async fn run_step(&mut self, step: ResetStep) -> anyhow::Result<()> {
                if step == ResetStep::RestartPool {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                }
                Ok(())
            }
        }

        let mut seq = ResetSequence::new(1, Duration::from_millis(50));
        let mut pool = HangingPool;
        assert_eq!(seq.execute(&mut pool).await, ResetOutcome::BudgetExhausted);
    }
}

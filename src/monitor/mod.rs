// src/monitor/mod.rs

//! Stall detection, worker-pool health and bounded reset-and-resume.
//!
//! - [`stall`] — the Healthy / SuspectedStall / Aborted state machine, fed
//!   timestamps by the driver on each supervisor tick.
//! - [`health`] — recently-active worker tracking from status-command output
//!   (cluster family only).
//! - [`reset`] — the bounded-retry halt/wipe/restart/re-register sequence.
//! - [`pool`] — command-backed [`reset::PoolControl`] implementation.

pub mod health;
pub mod pool;
pub mod reset;
pub mod stall;

pub use health::NodeHealth;
pub use pool::CommandPoolControl;
pub use reset::{PoolControl, ResetOutcome, ResetSequence, ResetStep, RESET_STEPS};
pub use stall::{StallAction, StallMonitor, StallState, CORRUPT_REMAINDER_FRACTION};

// src/progress/mod.rs

//! Progress inference from the supervised tool's console output.
//!
//! - [`milestone`] — the compiled milestone table and sub-range metadata.
//! - [`profile`] — built-in per-family tables (swappable per tool version
//!   without touching the state machine).
//! - [`interp`] — the interpolation primitives.
//! - [`parser`] — the line scanner that maps markers to a monotonic overall
//!   percentage.
//!
//! The latched percentage is published through [`ProgressCell`]: a single
//! writer (the parser's owner) and any number of readers, with no locking
//! beyond one atomic scalar.

pub mod interp;
pub mod milestone;
pub mod parser;
pub mod profile;

pub use interp::{frac_within, interp};
pub use milestone::{Milestone, MilestoneSet, SubRange};
pub use parser::ProgressParser;
pub use profile::milestone_set;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Single-writer / multi-reader progress value.
#[derive(Debug, Clone, Default)]
pub struct ProgressCell {
    bits: Arc<AtomicU64>,
}

impl ProgressCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, percent: f64) {
        self.bits.store(percent.to_bits(), Ordering::Relaxed);
    }

    pub fn load(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

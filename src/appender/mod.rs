// src/appender/mod.rs

//! Incremental artifact consolidation.
//!
//! - [`queue`] — detection-ordered fragment queue (pure state).
//! - [`drain`] — single-flight drain into the consolidated output.
//! - [`staging`] — periodic partial-result snapshots and resume validation.

pub mod drain;
pub mod queue;
pub mod staging;

pub use drain::{cleaned_name, consolidated_unit_names, Appender, DrainOutcome};
pub use queue::{ArtifactCandidate, ArtifactQueue};
pub use staging::Stager;

// src/watch/mod.rs

//! Filesystem detection of result fragments.
//!
//! Event-driven `notify` watcher as the primary path, with a periodic
//! directory scan as backstop. Both feed `JobEvent::ArtifactDetected` into
//! the driver; dedupe happens downstream in the artifact queue.

pub mod patterns;
pub mod watcher;

pub use patterns::ArtifactPatterns;
pub use watcher::{artifact_unit_name, scan_results_dir, spawn_watcher, WatcherHandle};

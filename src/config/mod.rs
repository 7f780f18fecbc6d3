// src/config/mod.rs

//! Job-file loading and validation.
//!
//! The TOML job file is deserialized into [`model::RawJobFile`] and promoted
//! to a validated [`model::JobFile`] via `TryFrom`. Semantic checks
//! (milestone monotonicity, thresholds, family-specific requirements) live in
//! [`validate`]; the tab-delimited work-unit manifest parser lives in
//! [`manifest`].

pub mod loader;
pub mod manifest;
pub mod model;
pub mod validate;

pub use loader::load_and_validate;
pub use manifest::{load_manifest, WorkUnit};
pub use model::{
    AppenderSection, JobFile, JobSection, MilestoneOverride, MonitorSection, RawJobFile,
    ToolSection,
};

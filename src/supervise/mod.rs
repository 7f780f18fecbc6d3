// src/supervise/mod.rs

//! External-process supervision.
//!
//! - [`spec`] — the tool command line built from the job file.
//! - [`process`] — launch, output tee, periodic tick, timeout, kill.
//! - [`backend`] — the `SuperviseBackend` trait the driver is written
//!   against, plus the real OS-process implementation.

pub mod backend;
pub mod process;
pub mod spec;

pub use backend::{Canceller, RealSuperviseBackend, SuperviseBackend, SupervisorHandle};
pub use process::{run_tool, ToolExit};
pub use spec::{ToolSpec, DEFAULT_TICK_INTERVAL};

// src/types.rs

use std::str::FromStr;

use serde::Deserialize;

/// Terminal result of a job attempt (or of the whole job).
///
/// Callers branch only on this enumeration, never on free-text messages.
/// The human-readable detail (first fatal message plus secondary context)
/// travels separately in [`crate::driver::JobReport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Closeout {
    /// All expected artifacts produced (possibly within the 0.1% tolerance).
    Success,
    /// Generic failure: tool error, acceptance shortfall, reset budget spent.
    Failed,
    /// A required input (manifest, workflow file, tool binary) was missing.
    FileNotFound,
    /// The tool ran out of memory; the job step should be rescheduled on a
    /// larger machine rather than failed permanently.
    ResetInsufficientMemory,
    /// Post-processing could not archive the results.
    ErrorZipping,
}

impl Closeout {
    pub fn is_success(self) -> bool {
        matches!(self, Closeout::Success)
    }
}

/// Which external tool family a job drives.
///
/// - `FragPipe`: single long-running process; progress comes from milestone
///   markers in its console output.
/// - `Sequest`: cluster of worker nodes; progress comes from result fragments
///   appearing on disk, health from a node-status command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolFamily {
    FragPipe,
    Sequest,
}

impl FromStr for ToolFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fragpipe" => Ok(ToolFamily::FragPipe),
            "sequest" => Ok(ToolFamily::Sequest),
            other => Err(format!(
                "invalid tool family: {other} (expected \"fragpipe\" or \"sequest\")"
            )),
        }
    }
}

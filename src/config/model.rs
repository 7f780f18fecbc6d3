// src/config/model.rs

use std::path::PathBuf;

use serde::Deserialize;

use crate::types::ToolFamily;

/// Top-level job configuration as read from a TOML file.
///
/// ```toml
/// [job]
/// work_dir = "/data/jobs/exp42"
/// manifest = "exp42.fp-manifest"
/// workflow = "closed.workflow"
///
/// [tool]
/// family = "fragpipe"
/// program = "/opt/fragpipe/bin/fragpipe"
/// memory_gb = 64
/// threads = 28
///
/// [[milestone]]
/// name = "first-search-start"
/// pattern = "first search start"
/// percent = 24.0
/// ```
///
/// `[monitor]`, `[appender]` and `[[milestone]]` are optional and default to
/// the built-in per-family values.
#[derive(Debug, Clone, Deserialize)]
pub struct RawJobFile {
    pub job: JobSection,
    pub tool: ToolSection,

    #[serde(default)]
    pub monitor: MonitorSection,

    #[serde(default)]
    pub appender: AppenderSection,

    /// Milestone table overrides from `[[milestone]]`.
    ///
    /// When empty, the built-in table for the tool family is used.
    #[serde(default)]
    pub milestone: Vec<MilestoneOverride>,
}

/// `[job]` section: where the job lives and which inputs it consumes.
#[derive(Debug, Clone, Deserialize)]
pub struct JobSection {
    /// Working directory for the supervised tool; also the parent of the
    /// run log and (by default) the results directory.
    pub work_dir: PathBuf,

    /// Tab-delimited manifest listing one input file per work unit.
    /// Relative paths are resolved against `work_dir`.
    pub manifest: PathBuf,

    /// Workflow / parameter file handed to the tool on its command line.
    pub workflow: PathBuf,

    /// Directory the tool writes result fragments into.
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,

    /// Optional remote staging directory for periodic partial-result
    /// snapshots; when absent, crash-resume is disabled.
    #[serde(default)]
    pub staging_dir: Option<PathBuf>,
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("results")
}

/// `[tool]` section: how to launch the external tool.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolSection {
    pub family: ToolFamily,

    /// Path to the tool's launcher binary.
    pub program: PathBuf,

    /// Heap size handed to the tool (`--ram`).
    #[serde(default = "default_memory_gb")]
    pub memory_gb: u32,

    /// Worker thread count handed to the tool (`--threads`).
    #[serde(default = "default_threads")]
    pub threads: u32,

    /// Directory containing the tool's bundled helpers (`--config-tools-folder`).
    #[serde(default)]
    pub tools_dir: Option<PathBuf>,

    /// Hard wall-clock limit for one attempt, in minutes. 0 = unlimited.
    #[serde(default = "default_timeout_minutes")]
    pub timeout_minutes: u64,
}

fn default_memory_gb() -> u32 {
    32
}

fn default_threads() -> u32 {
    8
}

fn default_timeout_minutes() -> u64 {
    12 * 60
}

/// `[monitor]` section: stall / node-health thresholds.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorSection {
    /// No new artifact for this long => suspected stall.
    #[serde(default = "default_stall_minutes")]
    pub stall_minutes: u64,

    /// Interval of the active-worker check (cluster family only).
    #[serde(default = "default_health_check_minutes")]
    pub health_check_minutes: u64,

    /// A worker counts as recently active if seen within this window.
    #[serde(default = "default_node_recent_minutes")]
    pub node_recent_minutes: u64,

    /// Number of worker nodes spawned for the job (cluster family only).
    #[serde(default)]
    pub expected_workers: u32,

    /// Command whose output lists recently-active worker identifiers
    /// (cluster family only).
    #[serde(default)]
    pub status_cmd: Option<String>,

    /// Halt/wipe/restart/re-register sequences before giving up.
    #[serde(default = "default_reset_max_attempts")]
    pub reset_max_attempts: u32,

    /// Per-step timeout within a reset sequence.
    #[serde(default = "default_step_timeout_secs")]
    pub step_timeout_secs: u64,

    /// Command that halts the worker pool (cluster family).
    #[serde(default)]
    pub halt_cmd: Option<String>,

    /// Directory of per-node temp state wiped during a reset.
    #[serde(default)]
    pub wipe_dir: Option<PathBuf>,

    /// Command that relaunches the worker pool (cluster family).
    #[serde(default)]
    pub restart_cmd: Option<String>,

    /// Command that re-registers worker nodes with the pool (cluster family).
    #[serde(default)]
    pub register_cmd: Option<String>,

    /// Total reset + node-health failures tolerated before the job is
    /// fatally aborted and local execution disabled.
    #[serde(default = "default_failure_max")]
    pub failure_max: u32,
}

fn default_stall_minutes() -> u64 {
    30
}

fn default_health_check_minutes() -> u64 {
    2
}

fn default_node_recent_minutes() -> u64 {
    5
}

fn default_reset_max_attempts() -> u32 {
    4
}

fn default_step_timeout_secs() -> u64 {
    60
}

fn default_failure_max() -> u32 {
    6
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            stall_minutes: default_stall_minutes(),
            health_check_minutes: default_health_check_minutes(),
            node_recent_minutes: default_node_recent_minutes(),
            expected_workers: 0,
            status_cmd: None,
            reset_max_attempts: default_reset_max_attempts(),
            step_timeout_secs: default_step_timeout_secs(),
            halt_cmd: None,
            wipe_dir: None,
            restart_cmd: None,
            register_cmd: None,
            failure_max: default_failure_max(),
        }
    }
}

/// `[appender]` section: incremental consolidation behaviour.
#[derive(Debug, Clone, Deserialize)]
pub struct AppenderSection {
    /// Consolidated output file, resolved against `work_dir`.
    #[serde(default = "default_consolidated")]
    pub consolidated: PathBuf,

    /// A queued fragment must be at least this old before a periodic drain
    /// may consume it (final drains ignore the hold-off).
    #[serde(default = "default_hold_off_secs")]
    pub hold_off_secs: u64,

    /// Interval of the periodic drain timer.
    #[serde(default = "default_flush_secs")]
    pub flush_secs: u64,

    /// Interval of the partial-result snapshot to the staging directory.
    #[serde(default = "default_snapshot_minutes")]
    pub snapshot_minutes: u64,

    /// Glob patterns (relative to `results_dir`) that identify result
    /// fragments, e.g. `["*.pep.out"]`.
    #[serde(default = "default_artifact_glob")]
    pub artifact_glob: Vec<String>,

    /// Size of the rolling window used for median per-unit rate reporting.
    #[serde(default = "default_rate_window")]
    pub rate_window: usize,
}

fn default_consolidated() -> PathBuf {
    PathBuf::from("combined_results.txt")
}

fn default_hold_off_secs() -> u64 {
    30
}

fn default_flush_secs() -> u64 {
    15
}

fn default_snapshot_minutes() -> u64 {
    5
}

fn default_artifact_glob() -> Vec<String> {
    vec!["*.out".to_string()]
}

fn default_rate_window() -> usize {
    50
}

impl Default for AppenderSection {
    fn default() -> Self {
        Self {
            consolidated: default_consolidated(),
            hold_off_secs: default_hold_off_secs(),
            flush_secs: default_flush_secs(),
            snapshot_minutes: default_snapshot_minutes(),
            artifact_glob: default_artifact_glob(),
            rate_window: default_rate_window(),
        }
    }
}

/// One `[[milestone]]` entry overriding the built-in milestone table.
///
/// Rank is implied by position in the file; targets must be non-decreasing.
#[derive(Debug, Clone, Deserialize)]
pub struct MilestoneOverride {
    pub name: String,
    /// Case-insensitive prefix pattern matched against console lines.
    pub pattern: String,
    pub percent: f64,
}

/// Validated job file.
///
/// Construction goes through `TryFrom<RawJobFile>` (see
/// [`crate::config::validate`]), so holding a `JobFile` implies the semantic
/// checks passed.
#[derive(Debug, Clone)]
pub struct JobFile {
    pub job: JobSection,
    pub tool: ToolSection,
    pub monitor: MonitorSection,
    pub appender: AppenderSection,
    pub milestone: Vec<MilestoneOverride>,
}

impl JobFile {
    /// Internal constructor used by validation; not part of the public API
    /// contract.
    pub(crate) fn new_unchecked(raw: RawJobFile) -> Self {
        Self {
            job: raw.job,
            tool: raw.tool,
            monitor: raw.monitor,
            appender: raw.appender,
            milestone: raw.milestone,
        }
    }

    /// Absolute path of the manifest file.
    pub fn manifest_path(&self) -> PathBuf {
        self.job.work_dir.join(&self.job.manifest)
    }

    /// Absolute path of the results directory.
    pub fn results_dir(&self) -> PathBuf {
        self.job.work_dir.join(&self.job.results_dir)
    }

    /// Absolute path of the consolidated output file.
    pub fn consolidated_path(&self) -> PathBuf {
        self.job.work_dir.join(&self.appender.consolidated)
    }

    /// Absolute path of the append-only run log the tool's output is teed to.
    pub fn run_log_path(&self) -> PathBuf {
        self.job.work_dir.join("fragrun-run.log")
    }
}

// src/supervise/spec.rs

use std::path::PathBuf;
use std::time::Duration;

use crate::config::model::JobFile;

/// Default interval of the periodic tick emitted while the tool runs.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(5);

/// Everything needed to launch one attempt of the external tool.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub work_dir: PathBuf,
    /// Append-only log the child's combined output is teed to.
    pub log_path: PathBuf,
    /// Hard wall-clock limit; `None` = unlimited.
    pub timeout: Option<Duration>,
    pub tick_interval: Duration,
}

impl ToolSpec {
    /// Build the fixed flag set from the job file.
    ///
    /// Flags are positional/named strings, not a structured protocol; the
    /// tool gives us nothing better.
    pub fn from_job(job: &JobFile) -> Self {
        let mut args = vec![
            "--ram".to_string(),
            job.tool.memory_gb.to_string(),
            "--threads".to_string(),
            job.tool.threads.to_string(),
            "--workflow".to_string(),
            job.job.workflow.display().to_string(),
            "--manifest".to_string(),
            job.job.manifest.display().to_string(),
            "--workdir".to_string(),
            job.job.work_dir.display().to_string(),
        ];
        if let Some(tools_dir) = &job.tool.tools_dir {
            args.push("--config-tools-folder".to_string());
            args.push(tools_dir.display().to_string());
        }

        let timeout = match job.tool.timeout_minutes {
            0 => None,
            mins => Some(Duration::from_secs(mins * 60)),
        };

        Self {
            program: job.tool.program.clone(),
            args,
            work_dir: job.job.work_dir.clone(),
            log_path: job.run_log_path(),
            timeout,
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }

    /// The command line as a display string (dry-run output, logging).
    pub fn command_line(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

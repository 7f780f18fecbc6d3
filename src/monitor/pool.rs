// src/monitor/pool.rs

//! Production [`PoolControl`] implementations.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::model::MonitorSection;
use crate::monitor::reset::{PoolControl, ResetStep};

/// Drives reset steps through configured shell commands.
///
/// Steps without a configured command are no-ops: the single-process family
/// configures none of them (its "reset" is just kill + relaunch, handled by
/// the driver), while the cluster family configures all four.
#[derive(Debug)]
pub struct CommandPoolControl {
    halt_cmd: Option<String>,
    wipe_dir: Option<PathBuf>,
    restart_cmd: Option<String>,
    register_cmd: Option<String>,
}

impl CommandPoolControl {
    pub fn from_config(monitor: &MonitorSection) -> Self {
        Self {
            halt_cmd: monitor.halt_cmd.clone(),
            wipe_dir: monitor.wipe_dir.clone(),
            restart_cmd: monitor.restart_cmd.clone(),
            register_cmd: monitor.register_cmd.clone(),
        }
    }

    async fn run_command(cmd: &str) -> Result<()> {
        debug!(cmd, "running pool control command");
        let status = Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .status()
            .await
            .with_context(|| format!("spawning pool control command '{cmd}'"))?;

        if !status.success() {
            bail!(
                "pool control command '{cmd}' exited with {}",
                status.code().unwrap_or(-1)
            );
        }
        Ok(())
    }

    async fn wipe_temp(&self) -> Result<()> {
        let Some(dir) = &self.wipe_dir else {
            return Ok(());
        };
        if !dir.exists() {
            return Ok(());
        }
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .with_context(|| format!("reading temp dir {:?}", dir))?;
        let mut removed = 0usize;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let result = if path.is_dir() {
                tokio::fs::remove_dir_all(&path).await
            } else {
                tokio::fs::remove_file(&path).await
            };
            result.with_context(|| format!("removing temp entry {:?}", path))?;
            removed += 1;
        }
        info!(dir = ?dir, removed, "wiped pool temp state");
        Ok(())
    }
}

impl PoolControl for CommandPoolControl {
    async fn run_step(&mut self, step: ResetStep) -> Result<()> {
        match step {
            ResetStep::Halt => match &self.halt_cmd {
                Some(cmd) => Self::run_command(cmd).await,
                None => Ok(()),
            },
            ResetStep::WipeTemp => self.wipe_temp().await,
            ResetStep::RestartPool => match &self.restart_cmd {
                Some(cmd) => Self::run_command(cmd).await,
                None => Ok(()),
            },
            ResetStep::RegisterNodes => match &self.register_cmd {
                Some(cmd) => Self::run_command(cmd).await,
                None => Ok(()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::reset::{ResetOutcome, ResetSequence};
    use std::time::Duration;

    #[tokio::test]
    async fn unconfigured_steps_are_noops() {
        let monitor = MonitorSection::default();
        let mut pool = CommandPoolControl::from_config(&monitor);
        let mut seq = ResetSequence::new(1, Duration::from_secs(5));
        assert_eq!(seq.execute(&mut pool).await, ResetOutcome::Completed);
    }

    #[tokio::test]
    async fn failing_command_fails_the_step() {
        let monitor = MonitorSection {
            halt_cmd: Some("exit 3".to_string()),
            ..MonitorSection::default()
        };
        let mut pool = CommandPoolControl::from_config(&monitor);
        let mut seq = ResetSequence::new(1, Duration::from_secs(5));
        assert_eq!(seq.execute(&mut pool).await, ResetOutcome::BudgetExhausted);
    }

    #[tokio::test]
    async fn wipe_temp_clears_directory() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("node1.state"), "x").unwrap();
        std::fs::create_dir(tmp.path().join("scratch")).unwrap();

        let monitor = MonitorSection {
            wipe_dir: Some(tmp.path().to_path_buf()),
            ..MonitorSection::default()
        };
        let mut pool = CommandPoolControl::from_config(&monitor);
        pool.run_step(ResetStep::WipeTemp).await.unwrap();

        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }
}

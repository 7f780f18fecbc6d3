// src/config/validate.rs

use crate::config::model::{JobFile, RawJobFile};
use crate::errors::{FragrunError, Result};
use crate::types::ToolFamily;

impl TryFrom<RawJobFile> for JobFile {
    type Error = FragrunError;

    fn try_from(raw: RawJobFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_job(&raw)?;
        Ok(JobFile::new_unchecked(raw))
    }
}

fn validate_raw_job(raw: &RawJobFile) -> Result<()> {
    validate_tool_section(raw)?;
    validate_monitor_section(raw)?;
    validate_appender_section(raw)?;
    validate_milestones(raw)?;
    Ok(())
}

fn validate_tool_section(raw: &RawJobFile) -> Result<()> {
    if raw.tool.memory_gb == 0 {
        return Err(FragrunError::ConfigError(
            "[tool].memory_gb must be >= 1 (got 0)".to_string(),
        ));
    }
    if raw.tool.threads == 0 {
        return Err(FragrunError::ConfigError(
            "[tool].threads must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_monitor_section(raw: &RawJobFile) -> Result<()> {
    let m = &raw.monitor;

    if m.stall_minutes == 0 {
        return Err(FragrunError::ConfigError(
            "[monitor].stall_minutes must be >= 1 (got 0)".to_string(),
        ));
    }
    if m.reset_max_attempts == 0 {
        return Err(FragrunError::ConfigError(
            "[monitor].reset_max_attempts must be >= 1 (got 0)".to_string(),
        ));
    }
    if m.health_check_minutes == 0 {
        return Err(FragrunError::ConfigError(
            "[monitor].health_check_minutes must be >= 1 (got 0)".to_string(),
        ));
    }
    if m.node_recent_minutes == 0 {
        return Err(FragrunError::ConfigError(
            "[monitor].node_recent_minutes must be >= 1 (got 0)".to_string(),
        ));
    }

    // The cluster family needs node-health inputs; the single-process family
    // must not carry them (they would silently do nothing).
    match raw.tool.family {
        ToolFamily::Sequest => {
            if m.expected_workers == 0 {
                return Err(FragrunError::ConfigError(
                    "[monitor].expected_workers must be set for the sequest family".to_string(),
                ));
            }
            if m.status_cmd.as_deref().map_or(true, |s| s.trim().is_empty()) {
                return Err(FragrunError::ConfigError(
                    "[monitor].status_cmd must be set for the sequest family".to_string(),
                ));
            }
        }
        ToolFamily::FragPipe => {
            if m.expected_workers != 0 || m.status_cmd.is_some() {
                return Err(FragrunError::ConfigError(
                    "[monitor].expected_workers / status_cmd only apply to the sequest family"
                        .to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn validate_appender_section(raw: &RawJobFile) -> Result<()> {
    let a = &raw.appender;

    if a.flush_secs == 0 {
        return Err(FragrunError::ConfigError(
            "[appender].flush_secs must be >= 1 (got 0)".to_string(),
        ));
    }
    if a.snapshot_minutes == 0 {
        return Err(FragrunError::ConfigError(
            "[appender].snapshot_minutes must be >= 1 (got 0)".to_string(),
        ));
    }
    if a.rate_window == 0 {
        return Err(FragrunError::ConfigError(
            "[appender].rate_window must be >= 1 (got 0)".to_string(),
        ));
    }
    if a.artifact_glob.is_empty() {
        return Err(FragrunError::ConfigError(
            "[appender].artifact_glob must contain at least one pattern".to_string(),
        ));
    }
    Ok(())
}

fn validate_milestones(raw: &RawJobFile) -> Result<()> {
    // Overrides are optional; when present the table must be usable as-is.
    let mut last_percent = f64::NEG_INFINITY;
    for (idx, m) in raw.milestone.iter().enumerate() {
        if m.name.trim().is_empty() {
            return Err(FragrunError::ConfigError(format!(
                "[[milestone]] entry {idx} has an empty name"
            )));
        }
        if m.pattern.trim().is_empty() {
            return Err(FragrunError::ConfigError(format!(
                "milestone '{}' has an empty pattern",
                m.name
            )));
        }
        if !(0.0..=100.0).contains(&m.percent) {
            return Err(FragrunError::ConfigError(format!(
                "milestone '{}' has percent {} outside 0..=100",
                m.name, m.percent
            )));
        }
        if m.percent < last_percent {
            return Err(FragrunError::ConfigError(format!(
                "milestone '{}' regresses from {} to {}; targets must be non-decreasing",
                m.name, last_percent, m.percent
            )));
        }
        last_percent = m.percent;
    }
    Ok(())
}

// src/config/manifest.rs

//! Tab-delimited work-unit manifest.
//!
//! One row per work unit:
//!
//! ```text
//! <input file path>\t<group name>\t<biological replicate, usually empty>\t<data type tag>
//! ```
//!
//! The manifest row count is the expected artifact count used by stall and
//! acceptance math, so parsing is strict about column count but tolerant of
//! blank lines.

use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{FragrunError, Result};

/// One input item requiring one output artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkUnit {
    /// Stable identifier: the input file's stem (no directory, no extension).
    pub name: String,
    pub input_path: PathBuf,
    pub group: String,
    /// Biological replicate; usually empty.
    pub replicate: String,
    /// Data type tag, e.g. `DDA`.
    pub data_type: String,
}

impl WorkUnit {
    fn from_row(line_no: usize, line: &str) -> Result<Self> {
        let cols: Vec<&str> = line.split('\t').collect();
        if cols.len() != 4 {
            return Err(FragrunError::ManifestError(format!(
                "line {line_no}: expected 4 tab-delimited columns, got {}",
                cols.len()
            )));
        }

        let input_path = PathBuf::from(cols[0]);
        let name = unit_name(&input_path).ok_or_else(|| {
            FragrunError::ManifestError(format!(
                "line {line_no}: cannot derive a unit name from path '{}'",
                cols[0]
            ))
        })?;

        Ok(Self {
            name,
            input_path,
            group: cols[1].to_string(),
            replicate: cols[2].to_string(),
            data_type: cols[3].to_string(),
        })
    }
}

/// Derive the stable unit name from an input path: file stem, no extension.
pub fn unit_name(path: &Path) -> Option<String> {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
}

/// Parse a manifest file into its work units.
///
/// Duplicate unit names are rejected: each work unit must own exactly one
/// output artifact, and a duplicate name would make artifact attribution
/// ambiguous.
pub fn load_manifest(path: impl AsRef<Path>) -> Result<Vec<WorkUnit>> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    parse_manifest(&contents)
}

/// Parse manifest text (split out for tests).
pub fn parse_manifest(contents: &str) -> Result<Vec<WorkUnit>> {
    let mut units = Vec::new();

    for (idx, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let unit = WorkUnit::from_row(idx + 1, line)?;

        if units.iter().any(|u: &WorkUnit| u.name == unit.name) {
            return Err(FragrunError::ManifestError(format!(
                "line {}: duplicate work unit '{}'",
                idx + 1,
                unit.name
            )));
        }
        units.push(unit);
    }

    if units.is_empty() {
        return Err(FragrunError::ManifestError(
            "manifest contains no work units".to_string(),
        ));
    }

    Ok(units)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_typical_rows() {
        let text = "/data/raw/sample_01.mzML\tcontrol\t\tDDA\n\
                    /data/raw/sample_02.mzML\ttreated\t2\tDDA\n";
        let units = parse_manifest(text).unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].name, "sample_01");
        assert_eq!(units[0].group, "control");
        assert_eq!(units[0].replicate, "");
        assert_eq!(units[1].replicate, "2");
    }

    #[test]
    fn blank_lines_are_skipped() {
        let text = "\n/data/a.mzML\tg\t\tDDA\n\n";
        assert_eq!(parse_manifest(text).unwrap().len(), 1);
    }

    #[test]
    fn wrong_column_count_is_rejected() {
        let err = parse_manifest("/data/a.mzML\tg\tDDA\n").unwrap_err();
        assert!(err.to_string().contains("4 tab-delimited columns"));
    }

    #[test]
    fn duplicate_unit_names_are_rejected() {
        let text = "/data/a.mzML\tg\t\tDDA\n/other/a.mzML\tg\t\tDDA\n";
        assert!(parse_manifest(text).is_err());
    }

    #[test]
    fn empty_manifest_is_rejected() {
        assert!(parse_manifest("\n\n").is_err());
    }
}

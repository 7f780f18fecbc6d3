// src/watch/patterns.rs

use std::path::Path;

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::errors::{FragrunError, Result};

/// Compiled glob set identifying result fragments among the files the tool
/// drops into its results directory (logs, temp files and fragments all land
/// in the same place).
#[derive(Debug, Clone)]
pub struct ArtifactPatterns {
    set: GlobSet,
}

impl ArtifactPatterns {
    pub fn compile(patterns: &[String]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern).map_err(|e| {
                FragrunError::ConfigError(format!("invalid artifact glob '{pattern}': {e}"))
            })?;
            builder.add(glob);
        }
        let set = builder
            .build()
            .map_err(|e| FragrunError::ConfigError(format!("building artifact glob set: {e}")))?;
        Ok(Self { set })
    }

    /// Match against the file name only; fragments are identified by name,
    /// not location within the results tree.
    pub fn matches(&self, path: &Path) -> bool {
        match path.file_name() {
            Some(name) => self.set.is_match(Path::new(name)),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn matches_on_file_name_only() {
        let p = ArtifactPatterns::compile(&["*.pep.out".to_string()]).unwrap();
        assert!(p.matches(&PathBuf::from("/results/deep/sample_01.pep.out")));
        assert!(!p.matches(&PathBuf::from("/results/sample_01.log")));
    }

    #[test]
    fn invalid_glob_is_a_config_error() {
        assert!(ArtifactPatterns::compile(&["[".to_string()]).is_err());
    }
}

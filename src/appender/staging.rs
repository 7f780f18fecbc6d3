// src/appender/staging.rs

//! Partial-result snapshots and crash-resume validation.
//!
//! Every few minutes the consolidated file, run log and job configuration
//! are copied to a staging directory so a crashed attempt can resume. Staged
//! copies are written as `<name>.tmp` and renamed into place, so a reader
//! never sees a half-written snapshot; a lingering `.tmp` means the copy was
//! in flight when the writer died.
//!
//! Resume is only allowed when the job's configuration files match the
//! staged copies exactly (ignoring whitespace). Any other difference forces
//! a clean restart.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::fsio::FileSystem;

#[derive(Debug)]
pub struct Stager {
    fs: Arc<dyn FileSystem>,
    staging_dir: PathBuf,
}

impl Stager {
    pub fn new(fs: Arc<dyn FileSystem>, staging_dir: PathBuf) -> Self {
        Self { fs, staging_dir }
    }

    /// Snapshot the given files into the staging directory.
    ///
    /// Missing sources are skipped (the consolidated file may not exist yet
    /// early in an attempt); individual copy failures are logged and do not
    /// abort the rest of the snapshot.
    pub fn snapshot(&self, sources: &[PathBuf]) -> Result<()> {
        for source in sources {
            if !self.fs.exists(source) {
                debug!(source = ?source, "snapshot source missing; skipping");
                continue;
            }
            if let Err(e) = self.snapshot_one(source) {
                warn!(source = ?source, error = %e, "failed to stage snapshot copy");
            }
        }
        Ok(())
    }

    fn snapshot_one(&self, source: &Path) -> Result<()> {
        let name = source
            .file_name()
            .context("snapshot source has no file name")?;
        let staged = self.staging_dir.join(name);
        let tmp = self.staging_dir.join(format!("{}.tmp", name.to_string_lossy()));

        let contents = self.fs.read_to_string(source)?;
        self.fs.write(&tmp, contents.as_bytes())?;
        self.fs.rename(&tmp, &staged)?;

        debug!(source = ?source, staged = ?staged, "snapshot staged");
        Ok(())
    }

    /// Bring a staged copy back into place if the local file is missing.
    ///
    /// Returns `true` when a copy was restored. A present local file always
    /// wins; a missing staged copy is a no-op.
    pub fn restore(&self, target: &Path) -> Result<bool> {
        if self.fs.exists(target) {
            return Ok(false);
        }
        let name = target.file_name().context("restore target has no file name")?;
        let staged = self.staging_dir.join(name);
        if !self.fs.exists(&staged) {
            return Ok(false);
        }

        let contents = self.fs.read_to_string(&staged)?;
        self.fs.write(target, contents.as_bytes())?;
        info!(target = ?target, "restored partial state from staged copy");
        Ok(true)
    }

    /// Whether a previous attempt's partial state may be resumed.
    ///
    /// Requires every local configuration file to match its staged copy
    /// byte-for-byte after whitespace is stripped. A missing staged copy, or
    /// any one-byte content difference, rejects the resume.
    pub fn resume_allowed(&self, config_files: &[PathBuf]) -> bool {
        for local in config_files {
            let name = match local.file_name() {
                Some(n) => n,
                None => {
                    warn!(path = ?local, "config file has no file name; resume rejected");
                    return false;
                }
            };
            let staged = self.staging_dir.join(name);

            let local_contents = match self.fs.read_to_string(local) {
                Ok(c) => c,
                Err(e) => {
                    warn!(path = ?local, error = %e, "cannot read local config; resume rejected");
                    return false;
                }
            };
            let staged_contents = match self.fs.read_to_string(&staged) {
                Ok(c) => c,
                Err(e) => {
                    info!(path = ?staged, error = %e, "no staged copy; resume rejected");
                    return false;
                }
            };

            if content_fingerprint(&local_contents) != content_fingerprint(&staged_contents) {
                info!(path = ?local, "config differs from staged copy; forcing clean restart");
                return false;
            }
        }
        true
    }
}

/// Whitespace-insensitive content fingerprint.
fn content_fingerprint(contents: &str) -> blake3::Hash {
    let mut hasher = blake3::Hasher::new();
    for chunk in contents.split_whitespace() {
        hasher.update(chunk.as_bytes());
        // Delimit chunks so "ab c" != "a bc".
        hasher.update(&[0]);
    }
    hasher.finalize()
}

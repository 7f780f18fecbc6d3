// src/fsio/mock.rs

use super::FileSystem;
use anyhow::{anyhow, Result};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// In-memory filesystem for appender/staging tests.
///
/// Paths are used verbatim (no normalization), so tests should stick to
/// absolute paths. `fail_reads_for` / `fail_removes_for` inject per-path IO
/// failures to exercise the drain's skip-and-continue error handling.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    inner: Arc<Mutex<MockState>>,
}

#[derive(Debug, Default)]
struct MockState {
    files: BTreeMap<PathBuf, Vec<u8>>,
    fail_reads: HashSet<PathBuf>,
    fail_removes: HashSet<PathBuf>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let mut state = self.inner.lock().unwrap();
        state
            .files
            .insert(path.as_ref().to_path_buf(), content.into());
    }

    /// Make every subsequent read of `path` fail.
    pub fn fail_reads_for(&self, path: impl AsRef<Path>) {
        let mut state = self.inner.lock().unwrap();
        state.fail_reads.insert(path.as_ref().to_path_buf());
    }

    /// Make every subsequent removal of `path` fail.
    pub fn fail_removes_for(&self, path: impl AsRef<Path>) {
        let mut state = self.inner.lock().unwrap();
        state.fail_removes.insert(path.as_ref().to_path_buf());
    }

    pub fn contents_of(&self, path: impl AsRef<Path>) -> Option<String> {
        let state = self.inner.lock().unwrap();
        state
            .files
            .get(path.as_ref())
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }
}

impl FileSystem for MockFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        let state = self.inner.lock().unwrap();
        if state.fail_reads.contains(path) {
            return Err(anyhow!("injected read failure: {:?}", path));
        }
        match state.files.get(path) {
            Some(content) => String::from_utf8(content.clone())
                .map_err(|e| anyhow!("invalid UTF-8 in {:?}: {}", path, e)),
            None => Err(anyhow!("file not found: {:?}", path)),
        }
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let mut state = self.inner.lock().unwrap();
        state.files.insert(path.to_path_buf(), contents.to_vec());
        Ok(())
    }

    fn append(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let mut state = self.inner.lock().unwrap();
        state
            .files
            .entry(path.to_path_buf())
            .or_default()
            .extend_from_slice(contents);
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        let mut state = self.inner.lock().unwrap();
        if state.fail_removes.contains(path) {
            return Err(anyhow!("injected remove failure: {:?}", path));
        }
        state
            .files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| anyhow!("file not found: {:?}", path))
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let mut state = self.inner.lock().unwrap();
        let content = state
            .files
            .remove(from)
            .ok_or_else(|| anyhow!("file not found: {:?}", from))?;
        state.files.insert(to.to_path_buf(), content);
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        let state = self.inner.lock().unwrap();
        state.files.contains_key(path)
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let state = self.inner.lock().unwrap();
        Ok(state
            .files
            .keys()
            .filter(|p| p.parent() == Some(path))
            .cloned()
            .collect())
    }
}

// src/watch/watcher.rs

use std::path::{Path, PathBuf};

use anyhow::Result;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::driver::JobEvent;
use crate::watch::patterns::ArtifactPatterns;

/// Handle for the filesystem watcher.
///
/// This exists mainly so the underlying `RecommendedWatcher` is kept alive
/// for as long as needed. Dropping this handle stops file watching.
pub struct WatcherHandle {
    _inner: RecommendedWatcher,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle").finish()
    }
}

/// Spawn a filesystem watcher over the results directory that forwards
/// `JobEvent::ArtifactDetected` for every new file matching the artifact
/// patterns.
///
/// Duplicate detections (watcher + periodic scan overlap, editor-style
/// create/modify event pairs) are fine: the artifact queue dedupes by unit
/// name.
pub fn spawn_watcher(
    results_dir: impl Into<PathBuf>,
    patterns: ArtifactPatterns,
    events: mpsc::Sender<JobEvent>,
) -> Result<WatcherHandle> {
    let results_dir = results_dir.into();

    // Channel from the blocking notify callback into the async world.
    let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel::<Event>();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if let Err(err) = event_tx.send(event) {
                    // Can't log via tracing from the notify thread reliably.
                    eprintln!("fragrun: failed to forward notify event: {err}");
                }
            }
            Err(err) => {
                eprintln!("fragrun: file watch error: {err}");
            }
        },
        Config::default(),
    )?;

    watcher.watch(&results_dir, RecursiveMode::Recursive)?;
    info!(dir = ?results_dir, "artifact watcher started");

    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            debug!(?event, "received notify event");
            for path in event.paths {
                forward_if_artifact(&path, &patterns, &events).await;
            }
        }
        debug!("artifact watcher event loop finished");
    });

    Ok(WatcherHandle { _inner: watcher })
}

/// Periodic directory scan that backstops missed notify events.
///
/// Scan errors are logged and swallowed; the watcher remains the primary
/// detection path.
pub async fn scan_results_dir(
    results_dir: &Path,
    patterns: &ArtifactPatterns,
    events: &mpsc::Sender<JobEvent>,
) {
    let entries = match std::fs::read_dir(results_dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(dir = ?results_dir, error = %e, "results dir not readable; skipping scan");
            return;
        }
    };

    for entry in entries {
        match entry {
            Ok(entry) => forward_if_artifact(&entry.path(), patterns, events).await,
            Err(e) => warn!(error = %e, "error while scanning results dir"),
        }
    }
}

async fn forward_if_artifact(
    path: &Path,
    patterns: &ArtifactPatterns,
    events: &mpsc::Sender<JobEvent>,
) {
    if !patterns.matches(path) || !path.is_file() {
        return;
    }
    let Some(name) = artifact_unit_name(path) else {
        return;
    };
    debug!(unit = %name, path = ?path, "artifact fragment detected");
    let _ = events
        .send(JobEvent::ArtifactDetected {
            name,
            path: path.to_path_buf(),
        })
        .await;
}

/// Unit name of a fragment file: the file name up to its first dot, so
/// `sample_01.pep.out` attributes to unit `sample_01` (manifest names are
/// single-extension stems).
pub fn artifact_unit_name(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_string_lossy();
    let stem = name.split('.').next().unwrap_or("");
    if stem.is_empty() {
        None
    } else {
        Some(stem.to_string())
    }
}

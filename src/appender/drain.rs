// src/appender/drain.rs

//! Single-flight consolidation of queued result fragments.
//!
//! Detection (watcher callback) and consumption (timer-driven drain) run
//! concurrently; an atomic in-use flag makes the drain single-flight so the
//! consolidated file never sees interleaved writes. Concurrent callers get
//! [`DrainOutcome::Busy`] immediately instead of blocking.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::appender::queue::{ArtifactCandidate, ArtifactQueue};
use crate::fsio::FileSystem;

/// Result of one `drain` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// The drain ran (possibly consuming zero items).
    Drained { appended: usize, had_errors: bool },
    /// Another drain was in flight; nothing was done.
    Busy,
}

impl DrainOutcome {
    pub fn is_busy(self) -> bool {
        matches!(self, DrainOutcome::Busy)
    }
}

/// Consolidates result fragments into the append-only output file, deleting
/// consumed fragments and their paired input files.
#[derive(Debug)]
pub struct Appender {
    fs: Arc<dyn FileSystem>,
    consolidated: PathBuf,
    hold_off: Duration,
    queue: Mutex<ArtifactQueue>,
    /// Paired input file per unit name, deleted alongside the fragment.
    inputs: HashMap<String, PathBuf>,
    in_use: AtomicBool,
}

impl Appender {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        consolidated: PathBuf,
        hold_off: Duration,
        rate_window: usize,
        inputs: HashMap<String, PathBuf>,
    ) -> Self {
        Self {
            fs,
            consolidated,
            hold_off,
            queue: Mutex::new(ArtifactQueue::new(rate_window)),
            inputs,
            in_use: AtomicBool::new(false),
        }
    }

    /// Record a newly detected fragment. Idempotent per unit name.
    pub fn on_artifact_detected(&self, name: &str, path: PathBuf) -> bool {
        self.observe_at(name, path, Instant::now())
    }

    /// Timestamp-explicit variant of [`Self::on_artifact_detected`] (tests).
    pub fn observe_at(&self, name: &str, path: PathBuf, now: Instant) -> bool {
        let mut queue = self.queue.lock().unwrap();
        let newly = queue.observe(name, path, now);
        if newly {
            debug!(unit = %name, queued = queue.len(), "artifact fragment queued");
        }
        newly
    }

    /// Total distinct fragments observed so far (queued + consolidated).
    pub fn total_observed(&self) -> u64 {
        self.queue.lock().unwrap().total_observed()
    }

    /// Whether a unit's fragment was already observed (queued or drained).
    pub fn is_observed(&self, name: &str) -> bool {
        self.queue.lock().unwrap().is_known(name)
    }

    /// Recover the observed set from an existing consolidated file after a
    /// crash: every separator line counts as one already-consolidated unit.
    ///
    /// Returns how many units were recovered. A missing consolidated file is
    /// a clean start, not an error.
    pub fn seed_from_consolidated(&self) -> u64 {
        let contents = match self.fs.read_to_string(&self.consolidated) {
            Ok(c) => c,
            Err(_) => return 0,
        };
        let names = consolidated_unit_names(&contents);
        let recovered = names.len() as u64;
        self.queue.lock().unwrap().seed_observed(names);
        if recovered > 0 {
            info!(recovered, "resumed observed set from consolidated file");
        }
        recovered
    }

    /// Median seconds between consolidated fragments, for rate reporting.
    pub fn median_unit_secs(&self) -> Option<f64> {
        self.queue.lock().unwrap().median_unit_secs()
    }

    pub fn queued_len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    /// Flush eligible fragments into the consolidated output.
    ///
    /// With `flush_all`, the hold-off window is ignored (final drain at job
    /// end). Per-item IO errors are logged and skipped; they surface only as
    /// `had_errors` in the outcome.
    pub fn drain(&self, flush_all: bool) -> DrainOutcome {
        self.drain_at(flush_all, Instant::now())
    }

    /// Timestamp-explicit variant of [`Self::drain`] (tests).
    pub fn drain_at(&self, flush_all: bool, now: Instant) -> DrainOutcome {
        if self
            .in_use
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("drain already in flight; returning busy");
            return DrainOutcome::Busy;
        }

        let outcome = self.drain_locked(flush_all, now);
        self.in_use.store(false, Ordering::Release);
        outcome
    }

    fn drain_locked(&self, flush_all: bool, now: Instant) -> DrainOutcome {
        let items = {
            let mut queue = self.queue.lock().unwrap();
            queue.take_eligible(flush_all, self.hold_off, now)
        };

        if items.is_empty() {
            return DrainOutcome::Drained {
                appended: 0,
                had_errors: false,
            };
        }

        let mut appended = 0usize;
        let mut had_errors = false;

        for item in &items {
            match self.append_one(item) {
                Ok(()) => appended += 1,
                Err(e) => {
                    warn!(unit = %item.name, error = %e, "failed to consolidate fragment; skipping");
                    had_errors = true;
                }
            }
        }

        info!(
            appended,
            had_errors,
            remaining = self.queued_len(),
            "drain finished"
        );
        DrainOutcome::Drained {
            appended,
            had_errors,
        }
    }

    fn append_one(&self, item: &ArtifactCandidate) -> anyhow::Result<()> {
        let content = self.fs.read_to_string(&item.path)?;

        // Separator format is load-bearing: downstream consumers split the
        // consolidated file on it.
        let mut block = format!("=== \"{}\" ===\n", cleaned_name(&item.name));
        block.push_str(&content);
        if !content.ends_with('\n') {
            block.push('\n');
        }
        self.fs.append(&self.consolidated, block.as_bytes())?;

        // Fragment first, then the paired input; the consolidated copy is
        // already durable at this point.
        self.fs.remove_file(&item.path)?;
        if let Some(input) = self.inputs.get(&item.name) {
            if self.fs.exists(input) {
                self.fs.remove_file(input)?;
            }
        }

        debug!(unit = %item.name, "fragment consolidated and inputs removed");
        Ok(())
    }

    /// Final drain at job end: retried up to 3 times with a short wait while
    /// the queue is non-empty (a concurrent periodic drain may hold the
    /// single-flight flag on the first try).
    pub async fn final_drain(&self) -> DrainOutcome {
        let mut last = DrainOutcome::Busy;
        for attempt in 1..=3 {
            last = self.drain(true);
            let done = !last.is_busy() && self.queued_len() == 0;
            if done {
                return last;
            }
            debug!(attempt, "final drain incomplete; retrying shortly");
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        if self.queued_len() > 0 {
            warn!(
                remaining = self.queued_len(),
                "final drain left fragments unconsolidated"
            );
        }
        last
    }
}

/// Unit names recorded by separator lines in a consolidated file.
pub fn consolidated_unit_names(contents: &str) -> Vec<String> {
    contents
        .lines()
        .filter_map(|line| {
            let name = line.strip_prefix("=== \"")?.strip_suffix("\" ===")?;
            (!name.is_empty()).then(|| name.to_string())
        })
        .collect()
}

/// Strip quoting-hostile characters from a unit name for the separator line.
pub fn cleaned_name(name: &str) -> String {
    name.trim()
        .chars()
        .filter(|c| *c != '"' && !c.is_control())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsio::mock::MockFileSystem;

    fn appender(fs: &MockFileSystem, inputs: HashMap<String, PathBuf>) -> Appender {
        Appender::new(
            Arc::new(fs.clone()),
            PathBuf::from("/job/combined_results.txt"),
            Duration::from_secs(30),
            10,
            inputs,
        )
    }

    #[test]
    fn drain_appends_in_fifo_order_with_separators() {
        let fs = MockFileSystem::new();
        fs.add_file("/results/a.out", "alpha\n");
        fs.add_file("/results/b.out", "beta");

        let app = appender(&fs, HashMap::new());
        let t0 = Instant::now();
        app.observe_at("a", PathBuf::from("/results/a.out"), t0);
        app.observe_at("b", PathBuf::from("/results/b.out"), t0);

        let outcome = app.drain_at(true, t0);
        assert_eq!(
            outcome,
            DrainOutcome::Drained {
                appended: 2,
                had_errors: false
            }
        );

        let combined = fs.contents_of("/job/combined_results.txt").unwrap();
        assert_eq!(
            combined,
            "=== \"a\" ===\nalpha\n=== \"b\" ===\nbeta\n"
        );
        assert!(!fs.exists(Path::new("/results/a.out")));
        assert!(!fs.exists(Path::new("/results/b.out")));
    }

    #[test]
    fn paired_inputs_are_deleted() {
        let fs = MockFileSystem::new();
        fs.add_file("/results/a.out", "x\n");
        fs.add_file("/inputs/a.mzML", "raw");

        let mut inputs = HashMap::new();
        inputs.insert("a".to_string(), PathBuf::from("/inputs/a.mzML"));

        let app = appender(&fs, inputs);
        app.observe_at("a", PathBuf::from("/results/a.out"), Instant::now());
        app.drain(true);

        assert!(!fs.exists(Path::new("/inputs/a.mzML")));
    }

    #[test]
    fn per_item_error_is_skipped_and_reported() {
        let fs = MockFileSystem::new();
        fs.add_file("/results/a.out", "ok\n");
        fs.add_file("/results/b.out", "broken\n");
        fs.fail_reads_for("/results/b.out");
        fs.add_file("/results/c.out", "ok too\n");

        let app = appender(&fs, HashMap::new());
        let t0 = Instant::now();
        for name in ["a", "b", "c"] {
            app.observe_at(name, PathBuf::from(format!("/results/{name}.out")), t0);
        }

        let outcome = app.drain_at(true, t0);
        assert_eq!(
            outcome,
            DrainOutcome::Drained {
                appended: 2,
                had_errors: true
            }
        );

        let combined = fs.contents_of("/job/combined_results.txt").unwrap();
        assert!(combined.contains("=== \"a\" ==="));
        assert!(!combined.contains("=== \"b\" ==="));
        assert!(combined.contains("=== \"c\" ==="));
    }

    #[test]
    fn cleaned_name_strips_quotes_and_controls() {
        assert_eq!(cleaned_name("  samp\"le_01\t"), "sample_01");
    }

    /// Filesystem whose reads park on a barrier, so a test can hold a drain
    /// open mid-flight.
    #[derive(Debug)]
    struct ParkedReadFs {
        inner: MockFileSystem,
        entered: Arc<std::sync::Barrier>,
        release: Arc<std::sync::Barrier>,
    }

    impl crate::fsio::FileSystem for ParkedReadFs {
        fn read_to_string(&self, path: &Path) -> anyhow::Result<String> {
            self.entered.wait();
            self.release.wait();
            self.inner.read_to_string(path)
        }
        fn write(&self, path: &Path, contents: &[u8]) -> anyhow::Result<()> {
            self.inner.write(path, contents)
        }
        fn append(&self, path: &Path, contents: &[u8]) -> anyhow::Result<()> {
            self.inner.append(path, contents)
        }
        fn remove_file(&self, path: &Path) -> anyhow::Result<()> {
            self.inner.remove_file(path)
        }
        fn rename(&self, from: &Path, to: &Path) -> anyhow::Result<()> {
            self.inner.rename(from, to)
        }
        fn exists(&self, path: &Path) -> bool {
            self.inner.exists(path)
        }
        fn read_dir(&self, path: &Path) -> anyhow::Result<Vec<std::path::PathBuf>> {
            self.inner.read_dir(path)
        }
    }

    #[test]
    fn concurrent_drain_returns_busy_without_blocking() {
        let inner = MockFileSystem::new();
        inner.add_file("/results/a.out", "x\n");
        let entered = Arc::new(std::sync::Barrier::new(2));
        let release = Arc::new(std::sync::Barrier::new(2));
        let fs = ParkedReadFs {
            inner,
            entered: Arc::clone(&entered),
            release: Arc::clone(&release),
        };

        let app = Arc::new(Appender::new(
            Arc::new(fs),
            PathBuf::from("/job/combined_results.txt"),
            Duration::ZERO,
            10,
            HashMap::new(),
        ));
        app.observe_at("a", PathBuf::from("/results/a.out"), Instant::now());

        let held = Arc::clone(&app);
        let worker = std::thread::spawn(move || held.drain(true));

        // The worker is parked inside its read: the flag is held.
        entered.wait();
        assert_eq!(app.drain(true), DrainOutcome::Busy);
        release.wait();

        let outcome = worker.join().expect("drain thread");
        assert_eq!(
            outcome,
            DrainOutcome::Drained {
                appended: 1,
                had_errors: false
            }
        );
    }

    #[test]
    fn seed_recovers_units_from_separators() {
        let fs = MockFileSystem::new();
        fs.add_file(
            "/job/combined_results.txt",
            "=== \"a\" ===\nalpha\n=== \"b\" ===\nbeta\nnot a separator\n",
        );

        let app = appender(&fs, HashMap::new());
        assert_eq!(app.seed_from_consolidated(), 2);
        assert_eq!(app.total_observed(), 2);
        assert!(app.is_observed("a"));

        // A re-detection of a recovered unit is not re-queued.
        assert!(!app.observe_at("a", PathBuf::from("/results/a.out"), Instant::now()));
    }
}

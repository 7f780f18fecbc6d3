// src/appender/queue.rs

//! FIFO queue of detected result fragments.
//!
//! Pure state: the async shell feeds in detection timestamps, so eligibility
//! and dedupe behaviour are deterministic under test. Items stay in detection
//! order and are never re-ordered once queued.

use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// A result fragment observed on disk, waiting to be consolidated.
#[derive(Debug, Clone)]
pub struct ArtifactCandidate {
    /// Stable work-unit name.
    pub name: String,
    /// Path of the fragment file.
    pub path: PathBuf,
    pub detected_at: Instant,
}

/// Detection-ordered queue with per-name dedupe and a bounded rolling window
/// of per-unit production times for median-rate reporting. The window is fed
/// as fragments are consolidated, not as they are detected, so the median
/// only covers units that actually made it into the combined file.
#[derive(Debug)]
pub struct ArtifactQueue {
    queue: VecDeque<ArtifactCandidate>,
    /// Every name ever observed, queued or already drained.
    known: HashSet<String>,
    durations: VecDeque<Duration>,
    window: usize,
    /// Detection stamp of the most recently consolidated fragment; anchors
    /// the next per-unit duration.
    last_consolidated: Option<Instant>,
    total_observed: u64,
}

impl ArtifactQueue {
    pub fn new(rate_window: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            known: HashSet::new(),
            durations: VecDeque::new(),
            window: rate_window.max(1),
            last_consolidated: None,
            total_observed: 0,
        }
    }

    /// Enqueue a newly detected fragment. Idempotent per name: a repeat
    /// observation (watcher + periodic scan overlap) is skipped.
    ///
    /// Returns `true` if the fragment was newly enqueued.
    pub fn observe(&mut self, name: &str, path: PathBuf, now: Instant) -> bool {
        if self.known.contains(name) {
            return false;
        }
        self.known.insert(name.to_string());
        self.total_observed += 1;

        self.queue.push_back(ArtifactCandidate {
            name: name.to_string(),
            path,
            detected_at: now,
        });
        true
    }

    /// Remove and return the fragments a drain may consume right now, in
    /// FIFO detection order.
    ///
    /// Without `flush_all`, only items older than `hold_off` are taken; the
    /// queue is detection-ordered, so a younger head means nothing behind it
    /// is eligible either.
    pub fn take_eligible(
        &mut self,
        flush_all: bool,
        hold_off: Duration,
        now: Instant,
    ) -> Vec<ArtifactCandidate> {
        let mut taken = Vec::new();
        while let Some(front) = self.queue.front() {
            let old_enough =
                flush_all || now.saturating_duration_since(front.detected_at) >= hold_off;
            if !old_enough {
                break;
            }
            // front() just matched, so pop cannot fail.
            if let Some(item) = self.queue.pop_front() {
                if let Some(prev) = self.last_consolidated {
                    self.push_duration(item.detected_at.saturating_duration_since(prev));
                }
                self.last_consolidated = Some(item.detected_at);
                taken.push(item);
            }
        }
        taken
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Total distinct fragments ever observed (queued + drained).
    pub fn total_observed(&self) -> u64 {
        self.total_observed
    }

    pub fn is_known(&self, name: &str) -> bool {
        self.known.contains(name)
    }

    /// Mark units as already consolidated (crash-resume from a partial
    /// consolidated file). They count as observed but are never re-queued.
    pub fn seed_observed<I: IntoIterator<Item = String>>(&mut self, names: I) {
        for name in names {
            if self.known.insert(name) {
                self.total_observed += 1;
            }
        }
    }

    /// Median seconds between consecutive consolidated fragments, if enough
    /// history exists.
    pub fn median_unit_secs(&self) -> Option<f64> {
        if self.durations.is_empty() {
            return None;
        }
        let mut secs: Vec<f64> = self.durations.iter().map(|d| d.as_secs_f64()).collect();
        secs.sort_by(|a, b| a.total_cmp(b));
        let mid = secs.len() / 2;
        let median = if secs.len() % 2 == 0 {
            (secs[mid - 1] + secs[mid]) / 2.0
        } else {
            secs[mid]
        };
        Some(median)
    }

    fn push_duration(&mut self, d: Duration) {
        if self.durations.len() == self.window {
            self.durations.pop_front();
        }
        self.durations.push_back(d);
    }
}

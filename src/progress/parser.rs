// src/progress/parser.rs

//! Console-output progress inference.
//!
//! [`ProgressParser::parse_log`] re-scans the whole run log on every call:
//! it is idempotent and re-entrant, and needs no persistent read offset
//! across process restarts. Matching is best-effort telemetry; every failure
//! path here is logged and swallowed, never surfaced to the job.

use std::path::Path;

use regex::Regex;
use tracing::{debug, warn};

use crate::progress::interp::{frac_within, interp};
use crate::progress::milestone::MilestoneSet;

/// Substrings that mark the run as dead from memory exhaustion. First match
/// latches the line and stops the scan.
const FATAL_MEMORY_MARKERS: &[&str] = &[
    "insufficient memory",
    "outofmemoryerror",
    "out of memory",
    "not enough memory",
];

/// Sub-progress markers recognised inside an interpolated milestone range.
#[derive(Debug)]
struct SubMarkers {
    /// `search slice <m> of <n>` — which sequential processing pass (slab).
    slab: Regex,
    /// `processing file <i> of <n>` — work-unit counter within the slab.
    slice: Regex,
    /// `progress: <x>/<y> (<z>%)` — fractional completion of the current unit.
    unit: Regex,
    /// `start split <n> of <m>` — split-database sub-search begins.
    split_start: Regex,
    /// `done split <n> of <m>` — split-database sub-search finished.
    split_done: Regex,
}

impl SubMarkers {
    fn new() -> Self {
        Self {
            slab: build(r"(?i)^search slice (\d+) of (\d+)"),
            slice: build(r"(?i)^processing file (\d+) of (\d+)"),
            unit: build(r"(?i)progress: (\d+)/(\d+) \((\d+(?:\.\d+)?)%\)"),
            split_start: build(r"(?i)^start split (\d+) of (\d+)"),
            split_done: build(r"(?i)^done split (\d+) of (\d+)"),
        }
    }
}

fn build(pattern: &str) -> Regex {
    // Patterns above are fixed string literals; a failure here is a bug in
    // this file, not a runtime condition.
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid built-in pattern {pattern:?}: {e}"))
}

/// Per-scan state, reset at the start of every `scan_text`.
#[derive(Debug, Default, Clone)]
struct ScanState {
    current_rank: Option<usize>,
    slab: Option<(u32, u32)>,
    slice: Option<(u32, u32)>,
    /// `(index, total, fraction)` from the latest `progress:` marker.
    unit: Option<(u32, u32, f64)>,
    split_active: bool,
    /// 0..=100 along the split-database axis.
    split_frac: f64,
}

/// Maps recognised console markers to a monotonic overall-progress
/// percentage.
#[derive(Debug)]
pub struct ProgressParser {
    set: MilestoneSet,
    markers: SubMarkers,
    /// Monotonic latch: regressions are warned about, never applied.
    reported_percent: f64,
    current_milestone: Option<String>,
    fatal: Option<String>,
}

impl ProgressParser {
    pub fn new(set: MilestoneSet) -> Self {
        Self {
            set,
            markers: SubMarkers::new(),
            reported_percent: 0.0,
            current_milestone: None,
            fatal: None,
        }
    }

    /// Latched overall progress in `0..=100`.
    pub fn percent(&self) -> f64 {
        self.reported_percent
    }

    /// Name of the highest-rank milestone seen so far.
    pub fn current_milestone(&self) -> Option<&str> {
        self.current_milestone.as_deref()
    }

    /// First fatal memory-exhaustion line, if one was seen.
    pub fn fatal_error(&self) -> Option<&str> {
        self.fatal.as_deref()
    }

    /// Re-scan the run log from the start and update the latched percentage.
    ///
    /// A missing or unreadable log is normal early in an attempt; it is
    /// logged at debug and ignored.
    pub fn parse_log(&mut self, path: &Path) {
        match std::fs::read_to_string(path) {
            Ok(text) => self.scan_text(&text),
            Err(e) => {
                debug!(path = ?path, error = %e, "run log not readable yet; skipping parse");
            }
        }
    }

    /// Scan console text line-by-line and update the latched percentage.
    pub fn scan_text(&mut self, text: &str) {
        let mut state = ScanState::default();
        let mut fatal: Option<String> = None;

        for line in text.lines() {
            if let Some(marker) = fatal_marker(line) {
                debug!(marker, line, "fatal memory marker; stopping progress scan");
                fatal = Some(line.trim().to_string());
                break;
            }
            self.scan_line(line, &mut state);
        }

        if let Some(msg) = fatal {
            // First fatal message wins; a rescan re-finds the same first line.
            if self.fatal.is_none() {
                warn!(message = %msg, "tool reported insufficient memory");
            }
            self.fatal = Some(msg);
            return;
        }

        let candidate = self.effective_percent(&state);
        if candidate + f64::EPSILON < self.reported_percent {
            warn!(
                candidate,
                reported = self.reported_percent,
                "computed progress regressed; keeping previous value"
            );
        } else {
            self.reported_percent = candidate;
        }

        self.current_milestone = state
            .current_rank
            .and_then(|r| self.set.get(r))
            .map(|m| m.name.clone());
    }

    fn scan_line(&self, line: &str, state: &mut ScanState) {
        // Split-database axis: explicit current/total slice numbers, mapped
        // onto a fixed reserved sub-range, bypassing milestone math while
        // active.
        if let Some((n, m)) = capture_pair(&self.markers.split_start, line) {
            if m > 0 {
                state.split_active = true;
                state.split_frac = ((n.saturating_sub(1)) as f64 / m as f64) * 100.0;
            }
            return;
        }
        if let Some((n, m)) = capture_pair(&self.markers.split_done, line) {
            if m > 0 {
                state.split_frac = (n.min(m) as f64 / m as f64) * 100.0;
                if n >= m {
                    state.split_active = false;
                }
            }
            return;
        }

        if let Some(milestone) = self.set.match_line(line) {
            match state.current_rank {
                Some(current) if milestone.rank < current => {
                    warn!(
                        milestone = %milestone.name,
                        current_rank = current,
                        "lower-rank milestone after a higher one; not regressing"
                    );
                }
                Some(current) if milestone.rank == current => {}
                _ => {
                    debug!(milestone = %milestone.name, percent = milestone.percent, "milestone reached");
                    state.current_rank = Some(milestone.rank);
                    state.slab = None;
                    state.slice = None;
                    state.unit = None;
                }
            }
            return;
        }

        if let Some(pair) = capture_pair(&self.markers.slab, line) {
            state.slab = Some(pair);
            state.slice = None;
            state.unit = None;
            return;
        }
        if let Some(pair) = capture_pair(&self.markers.slice, line) {
            state.slice = Some(pair);
            state.unit = None;
            return;
        }
        if let Some(caps) = self.markers.unit.captures(line) {
            let parsed = (
                caps[1].parse::<u32>(),
                caps[2].parse::<u32>(),
                caps[3].parse::<f64>(),
            );
            if let (Ok(x), Ok(y), Ok(z)) = parsed {
                state.unit = Some((x, y, z));
            } else {
                debug!(line, "unparseable progress marker; ignoring");
            }
        }
    }

    /// Overall percentage implied by the final scan state.
    fn effective_percent(&self, state: &ScanState) -> f64 {
        if state.split_active || state.split_frac > 0.0 {
            let (lo, hi) = self.set.split_range();
            if state.split_active {
                return interp(lo, hi, state.split_frac);
            }
            // Split finished: fall through to milestone math, but never
            // report less than the completed split range.
            let floor = interp(lo, hi, state.split_frac);
            return floor.max(self.milestone_percent(state));
        }

        self.milestone_percent(state)
    }

    fn milestone_percent(&self, state: &ScanState) -> f64 {
        let Some(rank) = state.current_rank else {
            return 0.0;
        };
        let Some(milestone) = self.set.get(rank) else {
            return 0.0;
        };
        let base = milestone.percent;

        let Some(range) = self.set.sub_range_from(rank) else {
            return base;
        };
        let Some(end) = self.set.get(range.end_rank) else {
            return base;
        };

        // Nested interpolation: unit fraction within slice, slice within
        // slab, slab within the milestone range. Zero counters anywhere mean
        // "report the outer milestone only".
        let Some((x, y, z)) = state.unit else {
            return base;
        };
        let Some(unit_frac) = frac_within(x, y, z) else {
            return base;
        };

        let (si, sn) = state.slice.unwrap_or((1, 1));
        let Some(slice_frac) = frac_within(si, sn, unit_frac) else {
            return base;
        };

        let (bi, bn) = state.slab.unwrap_or((1, 1));
        let Some(slab_frac) = frac_within(bi, bn, slice_frac) else {
            return base;
        };

        interp(base, end.percent, slab_frac)
    }
}

fn fatal_marker(line: &str) -> Option<&'static str> {
    let lower = line.to_lowercase();
    FATAL_MEMORY_MARKERS
        .iter()
        .copied()
        .find(|m| lower.contains(m))
}

fn capture_pair(re: &Regex, line: &str) -> Option<(u32, u32)> {
    let caps = re.captures(line)?;
    let a = caps[1].parse::<u32>().ok()?;
    let b = caps[2].parse::<u32>().ok()?;
    Some((a, b))
}

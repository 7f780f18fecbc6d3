// src/monitor/health.rs

//! Active-worker health tracking for the cluster family.
//!
//! The shell runs the configured status command on its own timer and feeds
//! the raw output here; this module parses recently-active worker
//! identifiers and decides whether the pool has degraded below the minimum
//! active fraction.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use regex::Regex;
use tracing::{debug, warn};

/// Lines like `node-03  running  00:12:41` or `wrk7 BUSY search`; the first
/// token is the worker identifier.
fn status_line_regex() -> Regex {
    Regex::new(r"(?i)^(\S+)\s+(?:running|busy|active)\b")
        .unwrap_or_else(|e| panic!("invalid status line pattern: {e}"))
}

#[derive(Debug)]
pub struct NodeHealth {
    expected: u32,
    recent_window: Duration,
    line_re: Regex,
    /// Last-observed-active timestamp per worker identifier.
    last_seen: HashMap<String, Instant>,
}

impl NodeHealth {
    pub fn new(expected: u32, recent_window: Duration) -> Self {
        Self {
            expected,
            recent_window,
            line_re: status_line_regex(),
            last_seen: HashMap::new(),
        }
    }

    /// Parse one status-command output, updating last-seen times.
    pub fn record_status_output(&mut self, output: &str, now: Instant) {
        let mut seen = 0usize;
        for line in output.lines() {
            if let Some(caps) = self.line_re.captures(line.trim()) {
                self.last_seen.insert(caps[1].to_string(), now);
                seen += 1;
            }
        }
        debug!(seen, known = self.last_seen.len(), "worker status parsed");
    }

    /// Workers observed active within the recent window.
    pub fn active_count(&self, now: Instant) -> usize {
        self.last_seen
            .values()
            .filter(|t| now.saturating_duration_since(**t) <= self.recent_window)
            .count()
    }

    /// Strictly fewer than 50% of the originally-spawned workers recently
    /// active. Exactly half does **not** trigger.
    pub fn below_minimum(&self, now: Instant) -> bool {
        if self.expected == 0 {
            return false;
        }
        let active = self.active_count(now);
        let degraded = (active as u64) * 2 < self.expected as u64;
        if degraded {
            warn!(
                active,
                expected = self.expected,
                "fewer than half of expected workers recently active"
            );
        }
        degraded
    }
}

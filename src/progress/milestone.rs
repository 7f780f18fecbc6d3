// src/progress/milestone.rs

use regex::{Regex, RegexBuilder};
use tracing::warn;

use crate::errors::{FragrunError, Result};

/// A named textual marker in tool output mapped to a known overall-progress
/// percentage.
///
/// Rank equals the milestone's index in its [`MilestoneSet`]; targets are
/// non-decreasing in rank order (enforced at construction).
#[derive(Debug, Clone)]
pub struct Milestone {
    pub name: String,
    pub pattern: Regex,
    pub percent: f64,
    pub rank: usize,
}

/// A region between two milestones where progress is interpolated
/// continuously from slab / slice / unit-fraction markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubRange {
    pub start_rank: usize,
    pub end_rank: usize,
}

/// The compiled milestone table for one tool family, plus its interpolated
/// sub-ranges and the reserved percent range for split-database sub-searches.
#[derive(Debug, Clone)]
pub struct MilestoneSet {
    milestones: Vec<Milestone>,
    sub_ranges: Vec<SubRange>,
    /// `(lo, hi)` percent range the split-database axis maps onto.
    split_range: (f64, f64),
}

impl MilestoneSet {
    /// Build a set from `(name, pattern, percent)` rows in rank order.
    ///
    /// Patterns are compiled case-insensitive and anchored to the start of
    /// the line (informal log text drifts between tool versions; an anchored
    /// prefix survives suffix churn).
    pub fn build(
        rows: &[(&str, &str, f64)],
        sub_ranges: Vec<SubRange>,
        split_range: (f64, f64),
    ) -> Result<Self> {
        let mut milestones = Vec::with_capacity(rows.len());
        let mut last_percent = f64::NEG_INFINITY;

        for (rank, (name, pattern, percent)) in rows.iter().enumerate() {
            if *percent < last_percent {
                return Err(FragrunError::ConfigError(format!(
                    "milestone '{name}' regresses from {last_percent} to {percent}"
                )));
            }
            last_percent = *percent;

            let anchored = if pattern.starts_with('^') {
                pattern.to_string()
            } else {
                format!("^{pattern}")
            };
            let regex = RegexBuilder::new(&anchored)
                .case_insensitive(true)
                .build()
                .map_err(|e| {
                    FragrunError::ConfigError(format!(
                        "milestone '{name}' has invalid pattern '{pattern}': {e}"
                    ))
                })?;

            milestones.push(Milestone {
                name: name.to_string(),
                pattern: regex,
                percent: *percent,
                rank,
            });
        }

        for range in &sub_ranges {
            if range.end_rank <= range.start_rank || range.end_rank >= milestones.len() {
                return Err(FragrunError::ConfigError(format!(
                    "sub-range {}..{} is not a forward span within the milestone table",
                    range.start_rank, range.end_rank
                )));
            }
        }

        Ok(Self {
            milestones,
            sub_ranges,
            split_range,
        })
    }

    pub fn milestones(&self) -> &[Milestone] {
        &self.milestones
    }

    pub fn get(&self, rank: usize) -> Option<&Milestone> {
        self.milestones.get(rank)
    }

    /// The sub-range starting at `rank`, if any.
    pub fn sub_range_from(&self, rank: usize) -> Option<SubRange> {
        self.sub_ranges.iter().copied().find(|r| r.start_rank == rank)
    }

    pub fn split_range(&self) -> (f64, f64) {
        self.split_range
    }

    /// First milestone whose pattern matches `line`, in rank order.
    ///
    /// An invalid match state (no milestones at all) is reported once here
    /// rather than surfacing to the caller; matching is best-effort.
    pub fn match_line(&self, line: &str) -> Option<&Milestone> {
        if self.milestones.is_empty() {
            warn!("milestone set is empty; no progress will be inferred");
            return None;
        }
        self.milestones.iter().find(|m| m.pattern.is_match(line))
    }
}

// src/progress/profile.rs

//! Built-in milestone tables per tool family.
//!
//! These match informal console text, not a stable API, so they are the one
//! place expected to change when a tool version shifts its wording. Job files
//! can override the whole table with `[[milestone]]` entries without touching
//! the parser.

use crate::config::model::MilestoneOverride;
use crate::errors::Result;
use crate::progress::milestone::{MilestoneSet, SubRange};
use crate::types::ToolFamily;

/// Percent range reserved for the split-database sub-search axis.
///
/// Chosen to nest strictly inside the first/main search region of the
/// FragPipe-family table below.
const SPLIT_RANGE: (f64, f64) = (25.0, 75.0);

/// Milestone table for the given family, or one built from job-file
/// overrides when any are present.
pub fn milestone_set(family: ToolFamily, overrides: &[MilestoneOverride]) -> Result<MilestoneSet> {
    if !overrides.is_empty() {
        return from_overrides(overrides);
    }
    match family {
        ToolFamily::FragPipe => fragpipe_set(),
        ToolFamily::Sequest => sequest_set(),
    }
}

fn fragpipe_set() -> Result<MilestoneSet> {
    let rows = [
        ("workflow-loaded", "loading workflow", 2.0),
        ("manifest-checked", "checking manifest files", 5.0),
        ("index-built", "building peptide index", 12.0),
        ("first-search-start", "first search start", 24.0),
        ("first-search-done", "first search done", 50.0),
        ("mass-calibration", "mass calibration", 55.0),
        ("main-search-start", "main search start", 60.0),
        ("main-search-done", "main search done", 80.0),
        ("protein-inference", "running protein inference", 88.0),
        ("report-written", "writing reports", 95.0),
        ("run-complete", "run complete", 100.0),
    ];
    // Interpolated regions: the two search passes dominate wall-clock time.
    let sub_ranges = vec![
        SubRange {
            start_rank: 3,
            end_rank: 4,
        },
        SubRange {
            start_rank: 6,
            end_rank: 7,
        },
    ];
    MilestoneSet::build(&rows, sub_ranges, SPLIT_RANGE)
}

fn sequest_set() -> Result<MilestoneSet> {
    // The cluster family reports progress mostly through artifacts on disk;
    // its console markers are coarse.
    let rows = [
        ("pool-started", "starting search pool", 5.0),
        ("dta-generated", "spectrum extraction complete", 15.0),
        ("search-dispatched", "searches dispatched to nodes", 20.0),
        ("search-complete", "all searches complete", 90.0),
        ("summary-written", "writing summary", 100.0),
    ];
    let sub_ranges = vec![SubRange {
        start_rank: 2,
        end_rank: 3,
    }];
    MilestoneSet::build(&rows, sub_ranges, SPLIT_RANGE)
}

fn from_overrides(overrides: &[MilestoneOverride]) -> Result<MilestoneSet> {
    let rows: Vec<(&str, &str, f64)> = overrides
        .iter()
        .map(|m| (m.name.as_str(), m.pattern.as_str(), m.percent))
        .collect();
    // Overrides carry no sub-range metadata; adjacent milestones still give
    // stepwise progress, just without intra-range interpolation.
    MilestoneSet::build(&rows, vec![], SPLIT_RANGE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_tables_compile() {
        let set = milestone_set(ToolFamily::FragPipe, &[]).unwrap();
        assert_eq!(set.milestones().len(), 11);
        assert!(set.sub_range_from(3).is_some());

        let set = milestone_set(ToolFamily::Sequest, &[]).unwrap();
        assert_eq!(set.milestones().len(), 5);
    }

    #[test]
    fn overrides_replace_builtin_table() {
        let overrides = vec![MilestoneOverride {
            name: "only".into(),
            pattern: "the only marker".into(),
            percent: 50.0,
        }];
        let set = milestone_set(ToolFamily::FragPipe, &overrides).unwrap();
        assert_eq!(set.milestones().len(), 1);
        assert_eq!(set.milestones()[0].percent, 50.0);
    }
}

// tests/progress_scenarios.rs

//! Progress inference over a realistic, growing run log on disk: the parser
//! re-scans the whole file each tick, exactly as the runtime drives it.

mod common;
use crate::common::init_tracing;

use std::error::Error;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use fragrun::progress::{milestone_set, ProgressParser};
use fragrun::types::ToolFamily;

type TestResult = Result<(), Box<dyn Error>>;

fn parser() -> ProgressParser {
    ProgressParser::new(milestone_set(ToolFamily::FragPipe, &[]).expect("builtin table"))
}

fn append(path: &Path, text: &str) {
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .expect("open log");
    f.write_all(text.as_bytes()).expect("append log");
}

#[test]
fn growing_log_yields_monotonic_progress() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let log = dir.path().join("fragrun-run.log");
    let mut p = parser();

    let chunks = [
        "FragPipe v23.1\nLoading workflow closed.workflow\n",
        "Checking manifest files\n",
        "Building peptide index for 2 million peptides\n",
        "First search start\n",
        "processing file 3 of 10\nprogress: 512/1024 (50.0%)\n",
        "First search done\nMass calibration\n",
        "Main search start\nprogress: 100/1024 (9.8%)\n",
        "Main search done\nRunning protein inference\n",
        "Writing reports\nRun complete\n",
    ];

    let mut last = 0.0;
    for chunk in chunks {
        append(&log, chunk);
        p.parse_log(&log);
        assert!(
            p.percent() >= last,
            "progress regressed from {last} to {}",
            p.percent()
        );
        last = p.percent();
    }
    assert_eq!(last, 100.0);
    assert_eq!(p.current_milestone(), Some("run-complete"));
    Ok(())
}

#[test]
fn truncated_rescan_keeps_latched_percentage() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let log = dir.path().join("fragrun-run.log");
    let mut p = parser();

    append(&log, "First search start\nFirst search done\n");
    p.parse_log(&log);
    assert_eq!(p.percent(), 50.0);

    // A rotated/truncated log must not pull the reported value back down.
    std::fs::write(&log, "Loading workflow\n")?;
    p.parse_log(&log);
    assert_eq!(p.percent(), 50.0);
    Ok(())
}

#[test]
fn missing_log_is_tolerated() {
    init_tracing();
    let mut p = parser();
    p.parse_log(Path::new("/nonexistent/fragrun-run.log"));
    assert_eq!(p.percent(), 0.0);
}

#[test]
fn split_database_run_interpolates_on_reserved_range() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let log = dir.path().join("fragrun-run.log");
    let mut p = parser();

    append(&log, "First search start\nstart split 1 of 8\n");
    p.parse_log(&log);
    assert_eq!(p.percent(), 25.0);

    append(&log, "done split 1 of 8\nstart split 5 of 8\n");
    p.parse_log(&log);
    // Four of eight splits behind us: halfway along 25..75.
    assert_eq!(p.percent(), 50.0);

    append(&log, "done split 8 of 8\nFirst search done\nMain search start\n");
    p.parse_log(&log);
    // Split axis complete; milestone math takes over past its 75% floor.
    assert_eq!(p.percent(), 75.0);
    Ok(())
}

#[test]
fn oom_line_latches_across_rescans() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let log = dir.path().join("fragrun-run.log");
    let mut p = parser();

    append(&log, "First search start\nNot enough memory to map spectra\n");
    p.parse_log(&log);
    assert!(p.fatal_error().is_some());

    // Later lines never clear the latch.
    append(&log, "Main search start\n");
    p.parse_log(&log);
    assert!(p.fatal_error().unwrap().contains("Not enough memory"));
    Ok(())
}

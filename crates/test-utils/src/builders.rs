#![allow(dead_code)]

use std::path::{Path, PathBuf};

use fragrun::config::model::{
    AppenderSection, JobFile, JobSection, MilestoneOverride, MonitorSection, RawJobFile,
    ToolSection,
};
use fragrun::types::ToolFamily;

/// Builder for `JobFile` to simplify test setup.
///
/// Defaults describe a minimal single-process (FragPipe-family) job rooted
/// in the given work directory.
pub struct JobFileBuilder {
    raw: RawJobFile,
}

impl JobFileBuilder {
    pub fn new(work_dir: &Path) -> Self {
        Self {
            raw: RawJobFile {
                job: JobSection {
                    work_dir: work_dir.to_path_buf(),
                    manifest: PathBuf::from("units.manifest"),
                    workflow: PathBuf::from("closed.workflow"),
                    results_dir: PathBuf::from("results"),
                    staging_dir: None,
                },
                tool: ToolSection {
                    family: ToolFamily::FragPipe,
                    program: work_dir.join("bin/tool"),
                    memory_gb: 4,
                    threads: 2,
                    tools_dir: None,
                    timeout_minutes: 0,
                },
                monitor: MonitorSection::default(),
                appender: AppenderSection::default(),
                milestone: Vec::new(),
            },
        }
    }

    pub fn family(mut self, family: ToolFamily) -> Self {
        self.raw.tool.family = family;
        self
    }

    pub fn program(mut self, program: &Path) -> Self {
        self.raw.tool.program = program.to_path_buf();
        self
    }

    pub fn staging_dir(mut self, dir: &Path) -> Self {
        self.raw.job.staging_dir = Some(dir.to_path_buf());
        self
    }

    pub fn stall_minutes(mut self, minutes: u64) -> Self {
        self.raw.monitor.stall_minutes = minutes;
        self
    }

    pub fn failure_max(mut self, max: u32) -> Self {
        self.raw.monitor.failure_max = max;
        self
    }

    pub fn cluster(mut self, expected_workers: u32, status_cmd: &str) -> Self {
        self.raw.tool.family = ToolFamily::Sequest;
        self.raw.monitor.expected_workers = expected_workers;
        self.raw.monitor.status_cmd = Some(status_cmd.to_string());
        self
    }

    pub fn hold_off_secs(mut self, secs: u64) -> Self {
        self.raw.appender.hold_off_secs = secs;
        self
    }

    pub fn flush_secs(mut self, secs: u64) -> Self {
        self.raw.appender.flush_secs = secs;
        self
    }

    pub fn artifact_glob(mut self, patterns: &[&str]) -> Self {
        self.raw.appender.artifact_glob = patterns.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn milestone(mut self, name: &str, pattern: &str, percent: f64) -> Self {
        self.raw.milestone.push(MilestoneOverride {
            name: name.to_string(),
            pattern: pattern.to_string(),
            percent,
        });
        self
    }

    pub fn build(self) -> JobFile {
        JobFile::try_from(self.raw).expect("Failed to build valid job file from builder")
    }
}

/// One manifest row in the tool's tab-delimited format.
pub fn manifest_row(input: &str, group: &str, replicate: &str, data_type: &str) -> String {
    format!("{input}\t{group}\t{replicate}\t{data_type}\n")
}

/// Write a minimal on-disk job layout: manifest, workflow file and a dummy
/// tool binary path, so preflight checks pass. Returns the manifest text.
pub fn write_job_fixture(job: &JobFile, inputs: &[&str]) -> String {
    let work_dir = &job.job.work_dir;
    std::fs::create_dir_all(work_dir.join("bin")).expect("create bin dir");
    std::fs::create_dir_all(job.results_dir()).expect("create results dir");
    std::fs::write(&job.tool.program, "#!/bin/sh\n").expect("write tool stub");
    std::fs::write(work_dir.join(&job.job.workflow), "params\n").expect("write workflow");

    let mut manifest = String::new();
    for input in inputs {
        let path = work_dir.join(input);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create input dir");
        }
        std::fs::write(&path, "spectra\n").expect("write input");
        manifest.push_str(&manifest_row(&path.display().to_string(), "g", "", "DDA"));
    }
    std::fs::write(job.manifest_path(), &manifest).expect("write manifest");
    manifest
}

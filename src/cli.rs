// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `fragrun`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "fragrun",
    version,
    about = "Supervise long-running mass-spectrometry search tools.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the job file (TOML).
    ///
    /// Default: `Fragrun.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Fragrun.toml")]
    pub job: String,

    /// Parse + validate, print the resolved tool command line, milestone
    /// table and monitor thresholds, but don't launch anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Ignore any staged partial results and force a clean first attempt.
    #[arg(long)]
    pub no_resume: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `FRAGRUN_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

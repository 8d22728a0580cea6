// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `taskweave`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "taskweave",
    version,
    about = "Run a TOML plan of dependent tasks on a taskweave executor.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the plan file (TOML).
    #[arg(long, value_name = "PATH", default_value = "Taskweave.toml")]
    pub plan: PathBuf,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TASKWEAVE_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse and validate the plan, print it, run nothing.
    #[arg(long)]
    pub dry_run: bool,

    /// Override the plan's concurrency ceiling.
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(usize))]
    pub max_concurrent: Option<usize>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_plan_in_cwd() {
        let args = CliArgs::try_parse_from(["taskweave"]).unwrap();
        assert_eq!(args.plan, PathBuf::from("Taskweave.toml"));
        assert!(!args.dry_run);
        assert_eq!(args.max_concurrent, None);
        assert_eq!(args.log_level, None);
    }

    #[test]
    fn parses_overrides() {
        let args = CliArgs::try_parse_from([
            "taskweave",
            "--plan",
            "plans/nightly.toml",
            "--dry-run",
            "--max-concurrent",
            "3",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(args.plan, PathBuf::from("plans/nightly.toml"));
        assert!(args.dry_run);
        assert_eq!(args.max_concurrent, Some(3));
        assert_eq!(args.log_level, Some(LogLevel::Debug));
    }
}

// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::default_config_path;

/// Command-line arguments for `dacapo`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "dacapo",
    version,
    about = "Run scheduled task queues for many independent instances.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Dacapo.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value_os_t = default_config_path())]
    pub config: PathBuf,

    /// Run every ready instance once, print the report and exit.
    #[arg(long)]
    pub once: bool,

    /// With `--once`, run only this instance.
    #[arg(long, value_name = "NAME", requires = "once")]
    pub instance: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `DACAPO_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print instances and their queues, but don't execute
    /// any commands.
    #[arg(long)]
    pub dry_run: bool,

    /// Print live updates (and the final report) as JSON lines.
    #[arg(long)]
    pub json: bool,
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

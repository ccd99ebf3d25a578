// src/errors.rs

//! Crate-wide error type and result alias.

use std::process::ExitStatus;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DacapoError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("failed to get instance info: {0}")]
    InstanceNotFound(String),

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("empty command after parsing")]
    EmptyCommand,

    #[error("failed to parse command: {0}")]
    CommandParse(#[from] shell_words::ParseError),

    #[error("failed to find python executable for instance: {0}")]
    InterpreterNotFound(String),

    #[error("failed to create {0} pipe")]
    Pipe(&'static str),

    #[error("failed to start command '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The process exited unsuccessfully on its own. `stderr` holds the
    /// captured tail of its error output (possibly empty).
    #[error("{}", command_failed_message(.status, .stderr))]
    CommandFailed { status: ExitStatus, stderr: String },

    #[error("failed to send notification: {0}")]
    Notification(#[from] reqwest::Error),

    #[error("invalid cron expression '{expr}': {source}")]
    Cron {
        expr: String,
        #[source]
        source: cron::error::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn command_failed_message(status: &ExitStatus, stderr: &str) -> String {
    if stderr.is_empty() {
        format!("command failed: {status}")
    } else {
        format!("command failed with {status}:\n{stderr}")
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, DacapoError>;

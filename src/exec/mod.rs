// src/exec/mod.rs

//! Process execution layer.
//!
//! This module runs one task's command with `tokio::process::Command`,
//! streams its output to the live-update channel and reports how it ended.
//!
//! - [`backend`] provides the `CommandExecutor` trait the orchestrator talks
//!   to, so tests can swap in a fake executor.
//! - [`command`] contains `RealExecutor`, the production implementation.
//! - [`output`] drains stdout/stderr line by line and keeps the stderr tail.
//! - [`decode`] turns raw output lines into text (UTF-8, then GBK, then
//!   lossy replacement).

pub mod backend;
pub mod command;
pub mod decode;
pub mod output;

pub use backend::{CancelReceiver, CommandExecutor, CommandRequest, ProcessExit};
pub use command::{RealExecutor, parse_command};
pub use decode::decode_line;
pub use output::StderrTail;

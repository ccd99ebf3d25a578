// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The orchestrator talks to a `CommandExecutor` instead of spawning
//! processes itself. Production code uses [`super::RealExecutor`]; tests
//! provide implementations that script outcomes without touching the OS.

use std::fmt::Debug;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use tokio::sync::oneshot;

use crate::errors::Result;

/// Fires once when the owning task manager is cancelled.
///
/// A closed channel (sender dropped without sending) is **not** a
/// cancellation.
pub type CancelReceiver = oneshot::Receiver<()>;

/// One command to run on behalf of an instance's task.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub instance: String,
    pub task: String,
    /// Shell-style command line, already resolved (no `py ` prefix).
    pub command: String,
    pub work_dir: Option<PathBuf>,
}

/// How a command ended, when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessExit {
    /// Exited with status 0.
    Completed,
    /// Killed because the cancel signal fired.
    ManuallyStopped,
}

/// Trait abstracting how a single command is executed.
///
/// The returned future resolves only after the process has exited and all of
/// its output has been drained.
pub trait CommandExecutor: Send + Sync + Debug {
    fn run_command(
        &self,
        request: CommandRequest,
        cancel: CancelReceiver,
    ) -> Pin<Box<dyn Future<Output = Result<ProcessExit>> + Send + '_>>;
}

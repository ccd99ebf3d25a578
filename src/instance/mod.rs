// src/instance/mod.rs

//! Instance and task records as the orchestration core sees them.
//!
//! - [`queue`] holds the per-instance run queue (`running` / `waiting` /
//!   `stopped`) and its transitions.
//!
//! These records are produced once at the store boundary with concrete
//! types; the core never inspects loosely-typed configuration values.

pub mod queue;

use std::path::PathBuf;

pub use queue::TaskQueue;

/// Canonical instance name type.
pub type InstanceName = String;

/// One shell/Python command belonging to an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// Unique within the owning instance.
    pub name: String,
    /// Inactive tasks are never queued.
    pub active: bool,
    /// Higher runs first.
    pub priority: u32,
    /// Shell-style command line. A leading `py ` is replaced by the
    /// instance's interpreter path at run time.
    pub command: String,
}

/// A configured, runnable unit owning an ordered task list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    pub name: InstanceName,
    /// Only ready instances take part in a full run.
    pub ready: bool,
    /// Background instances run concurrently, foreground ones in sequence.
    pub background: bool,
    /// Working directory of every task process (inherit when `None`).
    pub work_dir: Option<PathBuf>,
    /// Per-instance cron expression for single-instance runs.
    pub cron_expr: Option<String>,
    /// Tasks in template order.
    pub tasks: Vec<Task>,
}

impl Instance {
    pub fn task(&self, name: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.name == name)
    }

    /// Fresh queue for this instance's current task list.
    pub fn task_queue(&self) -> TaskQueue {
        TaskQueue::from_tasks(&self.tasks)
    }
}

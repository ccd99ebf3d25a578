use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status of one instance's task manager.
///
/// - `Pending`: idle, ready to run.
/// - `Running`: a task's process is active.
/// - `Updating`: set by the external updater while it syncs the instance's
///   repository or environment; blocks scheduling.
/// - `Failed`: the last run ended in error; the queue stays frozen until an
///   explicit reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    Pending,
    Running,
    Updating,
    Failed,
}

impl Default for InstanceStatus {
    fn default() -> Self {
        InstanceStatus::Pending
    }
}

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Pending => "pending",
            InstanceStatus::Running => "running",
            InstanceStatus::Updating => "updating",
            InstanceStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do once the scheduler decides the application should close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoAction {
    /// Never close.
    None,
    /// Stop the daemon process.
    #[serde(alias = "close_app")]
    Exit,
    /// Hibernate the host (Windows only).
    Hibernate,
    /// Power off the host.
    Shutdown,
}

impl AutoAction {
    pub fn is_enabled(&self) -> bool {
        *self != AutoAction::None
    }
}

impl Default for AutoAction {
    fn default() -> Self {
        AutoAction::None
    }
}

/// When the auto action fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoActionTrigger {
    /// Right after a full run (StartAll) finishes, if auto-close is armed.
    SchedulerEnd,
    /// On the ticks of `auto_action_cron`, if auto-close is armed.
    Scheduled,
}

impl Default for AutoActionTrigger {
    fn default() -> Self {
        AutoActionTrigger::SchedulerEnd
    }
}

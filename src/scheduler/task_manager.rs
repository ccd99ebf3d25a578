// src/scheduler/task_manager.rs

//! Per-instance run state.

use tokio::sync::oneshot;
use tracing::debug;

use crate::exec::CancelReceiver;
use crate::instance::TaskQueue;
use crate::types::InstanceStatus;

/// Owns one instance's status, run queue and the kill switch of its current
/// process.
///
/// Only the run that attached the process may detach it or mutate the queue
/// during a run; other callers only [`TaskManager::cancel`].
#[derive(Debug)]
pub struct TaskManager {
    pub instance_name: String,
    pub status: InstanceStatus,
    pub queue: TaskQueue,
    /// Error of the last failed run; cleared when a run starts.
    pub last_error: Option<String>,
    cancel_tx: Option<oneshot::Sender<()>>,
    manual_stop: bool,
}

impl TaskManager {
    pub fn new(instance_name: impl Into<String>, queue: TaskQueue) -> Self {
        Self {
            instance_name: instance_name.into(),
            status: InstanceStatus::Pending,
            queue,
            last_error: None,
            cancel_tx: None,
            manual_stop: false,
        }
    }

    /// See [`TaskQueue::switch_run`].
    pub fn switch_run(&mut self) -> Option<String> {
        self.queue.switch_run()
    }

    /// See [`TaskQueue::remove_run`].
    pub fn remove_run(&mut self) {
        self.queue.remove_run();
    }

    /// Request a manual stop: set the flag and kill the current process, if
    /// one is attached. Safe to call any number of times.
    pub fn cancel(&mut self) {
        self.manual_stop = true;
        if let Some(tx) = self.cancel_tx.take() {
            if tx.send(()).is_err() {
                debug!(instance = %self.instance_name, "process already finished while cancelling");
            }
        }
    }

    pub fn is_manually_stopped(&self) -> bool {
        self.manual_stop
    }

    pub fn has_process(&self) -> bool {
        self.cancel_tx.is_some()
    }

    /// Reset per-run state and enter `Running`.
    pub(crate) fn begin_run(&mut self) {
        self.last_error = None;
        self.manual_stop = false;
        self.status = InstanceStatus::Running;
    }

    /// Install the kill switch for a process about to start.
    ///
    /// Returns `None` when a manual stop already arrived, in which case the
    /// process must not be started.
    pub(crate) fn attach_process(&mut self) -> Option<CancelReceiver> {
        if self.manual_stop {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        self.cancel_tx = Some(tx);
        Some(rx)
    }

    pub(crate) fn detach_process(&mut self) {
        self.cancel_tx = None;
    }
}

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use dacapo::broadcast::{Broadcaster, LiveUpdate};
use dacapo::errors::Result;
use dacapo::instance::TaskQueue;
use dacapo::notify::Notifier;
use dacapo::scheduler::RunReport;
use dacapo::types::InstanceStatus;

/// Broadcaster that keeps every update in memory.
#[derive(Debug, Default)]
pub struct RecordingBroadcaster {
    updates: Mutex<Vec<LiveUpdate>>,
}

impl RecordingBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updates(&self) -> Vec<LiveUpdate> {
        self.updates.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.updates.lock().unwrap().clear();
    }

    /// Status updates for one instance (`""` for the global state).
    pub fn statuses_for(&self, instance: &str) -> Vec<InstanceStatus> {
        self.updates()
            .into_iter()
            .filter_map(|u| match u {
                LiveUpdate::State {
                    instance_name,
                    state,
                } if instance_name == instance => Some(state),
                _ => None,
            })
            .collect()
    }

    pub fn queues_for(&self, instance: &str) -> Vec<TaskQueue> {
        self.updates()
            .into_iter()
            .filter_map(|u| match u {
                LiveUpdate::Queue {
                    instance_name,
                    queue,
                } if instance_name == instance => Some(queue),
                _ => None,
            })
            .collect()
    }

    pub fn logs_for(&self, instance: &str) -> Vec<String> {
        self.updates()
            .into_iter()
            .filter_map(|u| match u {
                LiveUpdate::Log {
                    instance_name,
                    content,
                } if instance_name == instance => Some(content),
                _ => None,
            })
            .collect()
    }

    fn push(&self, update: LiveUpdate) {
        self.updates.lock().unwrap().push(update);
    }
}

impl Broadcaster for RecordingBroadcaster {
    fn broadcast_status(&self, instance: &str, status: InstanceStatus) {
        self.push(LiveUpdate::State {
            instance_name: instance.to_string(),
            state: status,
        });
    }

    fn broadcast_queue(&self, instance: &str, queue: &TaskQueue) {
        self.push(LiveUpdate::Queue {
            instance_name: instance.to_string(),
            queue: queue.clone(),
        });
    }

    fn broadcast_log(&self, instance: &str, line: &str) {
        self.push(LiveUpdate::Log {
            instance_name: instance.to_string(),
            content: line.to_string(),
        });
    }
}

/// Notifier that keeps every report it is given.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    reports: Mutex<Vec<RunReport>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<RunReport> {
        self.reports.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn send<'a>(
        &'a self,
        report: &'a RunReport,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        self.reports.lock().unwrap().push(report.clone());
        Box::pin(async { Ok(()) })
    }
}

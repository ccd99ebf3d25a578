// src/instance/queue.rs

//! Per-instance run queue.

use serde::{Deserialize, Serialize};

use super::Task;

/// Run queue of one instance.
///
/// A task name lives in at most one of `running`, `waiting` and `stopped`.
/// `waiting` is ordered by descending priority (ties keep template order);
/// `stopped` records completion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskQueue {
    /// Currently executing task, if any.
    #[serde(
        default,
        serialize_with = "serialize_running",
        deserialize_with = "deserialize_running"
    )]
    pub running: Option<String>,
    pub waiting: Vec<String>,
    pub stopped: Vec<String>,
}

impl TaskQueue {
    /// Build the initial queue from a template-ordered task list.
    ///
    /// Active tasks are queued by descending priority; inactive tasks are
    /// left out entirely.
    pub fn from_tasks(tasks: &[Task]) -> Self {
        let mut active: Vec<&Task> = tasks.iter().filter(|t| t.active).collect();
        // Stable sort keeps template order for equal priorities.
        active.sort_by(|a, b| b.priority.cmp(&a.priority));

        Self {
            running: None,
            waiting: active.into_iter().map(|t| t.name.clone()).collect(),
            stopped: Vec::new(),
        }
    }

    /// Move the running task (if any) to `stopped`, then pop the next waiting
    /// task into `running` and return its name.
    ///
    /// With nothing waiting this only flushes the running task and returns
    /// `None`.
    pub fn switch_run(&mut self) -> Option<String> {
        self.remove_run();

        if self.waiting.is_empty() {
            return None;
        }
        let next = self.waiting.remove(0);
        self.running = Some(next.clone());
        Some(next)
    }

    /// Move the running task (if any) to `stopped`.
    pub fn remove_run(&mut self) {
        if let Some(name) = self.running.take() {
            self.stopped.push(name);
        }
    }

    pub fn has_waiting(&self) -> bool {
        !self.waiting.is_empty()
    }

    /// Nothing running and nothing left to run.
    pub fn is_exhausted(&self) -> bool {
        self.running.is_none() && self.waiting.is_empty()
    }
}

// The live-update wire shape uses "" for "nothing running".
fn serialize_running<S>(running: &Option<String>, s: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    s.serialize_str(running.as_deref().unwrap_or(""))
}

fn deserialize_running<'de, D>(d: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(d)?;
    Ok(if raw.is_empty() { None } else { Some(raw) })
}

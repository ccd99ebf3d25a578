// src/broadcast/mod.rs

//! Live-update channel to observers (UI clients, the CLI printer, tests).
//!
//! Delivery is best effort: the core never waits on observers and never
//! fails because nobody is listening.

use std::fmt::Debug;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use crate::instance::TaskQueue;
use crate::types::InstanceStatus;

/// Fire-and-forget sink for status, queue and log updates.
///
/// An empty `instance` in [`Broadcaster::broadcast_status`] addresses the
/// global scheduler state.
pub trait Broadcaster: Send + Sync + Debug {
    fn broadcast_status(&self, instance: &str, status: InstanceStatus);
    fn broadcast_queue(&self, instance: &str, queue: &TaskQueue);
    fn broadcast_log(&self, instance: &str, line: &str);
}

/// One message on the live-update channel.
///
/// Serialises to the same shapes UI clients expect:
/// `{"type":"state","instance_name":"a","state":"running"}`,
/// `{"type":"queue","instance_name":"a","queue":{...}}`,
/// `{"type":"log","instance_name":"a","content":"..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LiveUpdate {
    State {
        instance_name: String,
        state: InstanceStatus,
    },
    Queue {
        instance_name: String,
        queue: TaskQueue,
    },
    Log {
        instance_name: String,
        content: String,
    },
}

/// [`Broadcaster`] backed by a `tokio::sync::broadcast` channel.
///
/// Slow subscribers lag and lose old messages instead of blocking senders.
#[derive(Debug, Clone)]
pub struct ChannelBroadcaster {
    tx: broadcast::Sender<LiveUpdate>,
}

impl ChannelBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LiveUpdate> {
        self.tx.subscribe()
    }

    fn send(&self, update: LiveUpdate) {
        if self.tx.send(update).is_err() {
            trace!("live update dropped; no subscribers");
        }
    }
}

impl Default for ChannelBroadcaster {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl Broadcaster for ChannelBroadcaster {
    fn broadcast_status(&self, instance: &str, status: InstanceStatus) {
        self.send(LiveUpdate::State {
            instance_name: instance.to_string(),
            state: status,
        });
    }

    fn broadcast_queue(&self, instance: &str, queue: &TaskQueue) {
        self.send(LiveUpdate::Queue {
            instance_name: instance.to_string(),
            queue: queue.clone(),
        });
    }

    fn broadcast_log(&self, instance: &str, line: &str) {
        self.send(LiveUpdate::Log {
            instance_name: instance.to_string(),
            content: line.to_string(),
        });
    }
}

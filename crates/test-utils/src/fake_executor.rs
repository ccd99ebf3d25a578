use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use tokio::sync::Notify;

use dacapo::errors::{DacapoError, Result};
use dacapo::exec::{CancelReceiver, CommandExecutor, CommandRequest, ProcessExit};

/// What the fake process does for a given command line.
#[derive(Debug, Clone)]
pub enum ScriptedOutcome {
    /// Exit 0 immediately.
    Succeed,
    /// Fail with this error text.
    Fail(String),
    /// Run for this long (or until cancelled), then exit 0.
    Sleep(Duration),
    /// Run until [`ScriptedExecutor::release`] or cancellation.
    Block,
}

#[derive(Debug, Default)]
struct Inner {
    scripts: Mutex<HashMap<String, ScriptedOutcome>>,
    releases: Mutex<HashMap<String, Arc<Notify>>>,
    calls: Mutex<Vec<CommandRequest>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

/// A fake executor that:
/// - records every request it receives, in order
/// - plays back a scripted outcome per command (default: succeed)
/// - honours cancellation and tracks how many commands ran at once.
///
/// Clones share state, so a test keeps one handle and gives another to the
/// orchestrator.
#[derive(Debug, Clone, Default)]
pub struct ScriptedExecutor {
    inner: Arc<Inner>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, command: &str, outcome: ScriptedOutcome) -> &Self {
        self.inner
            .scripts
            .lock()
            .unwrap()
            .insert(command.to_string(), outcome);
        self
    }

    /// Let a `Block`ed command exit. A release sent before the command starts
    /// is kept until it does.
    pub fn release(&self, command: &str) {
        self.notify_for(command).notify_one();
    }

    pub fn calls(&self) -> Vec<CommandRequest> {
        self.inner.calls.lock().unwrap().clone()
    }

    /// Commands received so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.command).collect()
    }

    /// `(instance, task)` pairs received so far, in order.
    pub fn started(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .map(|c| (c.instance, c.task))
            .collect()
    }

    pub fn active(&self) -> usize {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Highest number of commands that were running at the same time.
    pub fn max_active(&self) -> usize {
        self.inner.max_active.load(Ordering::SeqCst)
    }

    fn notify_for(&self, command: &str) -> Arc<Notify> {
        self.inner
            .releases
            .lock()
            .unwrap()
            .entry(command.to_string())
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }

    async fn play(&self, request: CommandRequest, mut cancel: CancelReceiver) -> Result<ProcessExit> {
        let outcome = self
            .inner
            .scripts
            .lock()
            .unwrap()
            .get(&request.command)
            .cloned()
            .unwrap_or(ScriptedOutcome::Succeed);
        let release = self.notify_for(&request.command);

        self.inner.calls.lock().unwrap().push(request);
        let now = self.inner.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.max_active.fetch_max(now, Ordering::SeqCst);

        let result = match outcome {
            ScriptedOutcome::Succeed => Ok(ProcessExit::Completed),
            ScriptedOutcome::Fail(message) => Err(DacapoError::Other(anyhow!(message))),
            ScriptedOutcome::Sleep(duration) => tokio::select! {
                _ = tokio::time::sleep(duration) => Ok(ProcessExit::Completed),
                Ok(()) = &mut cancel => Ok(ProcessExit::ManuallyStopped),
            },
            ScriptedOutcome::Block => tokio::select! {
                _ = release.notified() => Ok(ProcessExit::Completed),
                Ok(()) = &mut cancel => Ok(ProcessExit::ManuallyStopped),
            },
        };

        self.inner.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

impl CommandExecutor for ScriptedExecutor {
    fn run_command(
        &self,
        request: CommandRequest,
        cancel: CancelReceiver,
    ) -> Pin<Box<dyn Future<Output = Result<ProcessExit>> + Send + '_>> {
        Box::pin(self.play(request, cancel))
    }
}

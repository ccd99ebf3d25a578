// src/scheduler/runner.rs

//! Orchestration of full runs (StartAll / StopAll) and single-instance runs.
//!
//! A full run partitions the ready instances into background ones, run
//! concurrently under an optional semaphore, and foreground ones, run in
//! strict sequence with instances that are updating deferred to later
//! rounds. Both partitions feed one result channel; once both finish the
//! aggregated report goes to the notifier, the scheduler flips back to
//! pending and the close hook gets a chance to fire.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::broadcast::Broadcaster;
use crate::errors::{DacapoError, Result};
use crate::exec::{CommandExecutor, CommandRequest, ProcessExit};
use crate::instance::TaskQueue;
use crate::notify::Notifier;
use crate::store::InstanceStore;
use crate::types::InstanceStatus;

use super::registry::Registry;
use super::report::{RunReport, RunResult};

/// Error text of a run ended by a manual stop.
pub const MANUALLY_STOPPED: &str = "manually stopped";

const PY_PREFIX: &str = "py ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorOptions {
    /// Cap on concurrently running background instances; 0 = unbounded.
    pub max_bg_concurrent: usize,
    /// Poll interval while an instance is updating.
    pub update_check_interval: Duration,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            max_bg_concurrent: 0,
            update_check_interval: Duration::from_secs(10),
        }
    }
}

/// Start/stop commands as issued by a UI or cron trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerCommand {
    /// `instance: None` is a full run; `auto_close` arms the close hook.
    Start {
        instance: Option<String>,
        auto_close: bool,
    },
    /// `instance: None` stops everything and disarms auto-close.
    Stop { instance: Option<String> },
}

/// Cheap to clone; every clone drives the same registry.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    registry: Arc<Registry>,
    store: Arc<dyn InstanceStore>,
    executor: Arc<dyn CommandExecutor>,
    broadcaster: Arc<dyn Broadcaster>,
    notifier: Option<Arc<dyn Notifier>>,
    options: OrchestratorOptions,
    full_run_active: Arc<AtomicBool>,
}

/// Clears the full-run flag however `start_all` exits.
struct FullRunGuard(Arc<AtomicBool>);

impl Drop for FullRunGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Orchestrator {
    pub fn new(
        registry: Arc<Registry>,
        executor: Arc<dyn CommandExecutor>,
        broadcaster: Arc<dyn Broadcaster>,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            store: registry.store(),
            registry,
            executor,
            broadcaster,
            notifier: None,
            options,
            full_run_active: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    // ---------------------------------------------------------------------
    // Full runs
    // ---------------------------------------------------------------------

    /// Run every ready instance once and return the aggregated report.
    ///
    /// Rejected (empty report) while another full run is in progress.
    pub async fn start_all(&self) -> RunReport {
        if self.full_run_active.swap(true, Ordering::SeqCst) {
            warn!("full run already in progress; ignoring start request");
            return RunReport::default();
        }
        let _guard = FullRunGuard(Arc::clone(&self.full_run_active));

        self.registry.set_running(true);
        self.broadcaster.broadcast_status("", InstanceStatus::Running);
        info!("scheduler started");

        let instances = match self.store.list_ready_instances() {
            Ok(instances) => instances,
            Err(e) => {
                error!(error = %e, "failed to list ready instances");
                self.finish_full_run();
                return RunReport::default();
            }
        };

        let mut background = Vec::new();
        let mut foreground = Vec::new();
        for instance in instances {
            match self.registry.status_of(&instance.name) {
                None => {
                    warn!(instance = %instance.name, "skipping instance without task manager");
                    continue;
                }
                Some(InstanceStatus::Failed) => {
                    info!(instance = %instance.name, "skipping failed instance");
                    continue;
                }
                Some(_) => {}
            }
            if instance.background {
                background.push(instance.name);
            } else {
                foreground.push(instance.name);
            }
        }
        info!(
            background = background.len(),
            foreground = foreground.len(),
            "instances partitioned"
        );

        let (tx, mut rx) = mpsc::unbounded_channel::<RunResult>();

        let bg = {
            let this = self.clone();
            let tx = tx.clone();
            tokio::spawn(async move { this.run_background(background, tx).await })
        };
        let fg = {
            let this = self.clone();
            let tx = tx.clone();
            tokio::spawn(async move { this.run_foreground(foreground, tx).await })
        };
        drop(tx);

        let (bg_res, fg_res) = tokio::join!(bg, fg);
        if let Err(e) = bg_res {
            error!(error = %e, "background partition aborted");
        }
        if let Err(e) = fg_res {
            error!(error = %e, "foreground partition aborted");
        }

        let mut results = Vec::new();
        while let Some(result) = rx.recv().await {
            results.push(result);
        }
        let report = RunReport::from_results(results);
        info!(
            total = report.total_count,
            succeeded = report.success_count,
            failed = report.failed_count,
            "all instances finished"
        );

        if let Some(notifier) = &self.notifier {
            if let Err(e) = notifier.send(&report).await {
                error!(error = %e, "failed to send run notification");
            }
        }

        self.finish_full_run();
        report
    }

    fn finish_full_run(&self) {
        self.registry.set_running(false);
        self.broadcaster.broadcast_status("", InstanceStatus::Pending);
        info!("scheduler stopped");
        self.registry.trigger_close();
    }

    /// Stop the current full run and every running instance.
    ///
    /// The running flag flips first, so no poll or round starts new work;
    /// cancelled runs clean up their own queues.
    pub fn stop_all(&self) {
        info!("stopping all instances");
        self.registry.set_running(false);
        self.broadcaster.broadcast_status("", InstanceStatus::Pending);

        for name in self.registry.cancel_running() {
            info!(instance = %name, "instance stopped manually");
        }

        self.registry.trigger_close();
    }

    /// Cancel one instance's run. Returns `false` for unknown instances.
    pub fn stop_one(&self, name: &str) -> bool {
        let found = self.registry.cancel_task(name);
        if found {
            info!(instance = %name, "stop requested");
        } else {
            warn!(instance = %name, "stop requested for unknown instance");
        }
        found
    }

    async fn run_background(&self, names: Vec<String>, tx: mpsc::UnboundedSender<RunResult>) {
        let semaphore = (self.options.max_bg_concurrent > 0)
            .then(|| Arc::new(Semaphore::new(self.options.max_bg_concurrent)));

        let mut set = JoinSet::new();
        for name in names {
            if !self.registry.is_running() {
                debug!("scheduler stopped; not launching remaining background instances");
                break;
            }
            let this = self.clone();
            let tx = tx.clone();
            let semaphore = semaphore.clone();
            set.spawn(async move {
                let _permit = match semaphore {
                    Some(sem) => match sem.acquire_owned().await {
                        Ok(permit) => Some(permit),
                        Err(_) => return,
                    },
                    None => None,
                };
                let result = this.run_with_check(&name).await;
                let _ = tx.send(result);
            });
        }

        while let Some(res) = set.join_next().await {
            if let Err(e) = res {
                error!(error = %e, "background instance task aborted");
            }
        }
    }

    /// Wait out `Updating`, then run the instance once.
    async fn run_with_check(&self, name: &str) -> RunResult {
        loop {
            if !self.registry.is_running() {
                debug!(instance = %name, "scheduler stopped while waiting");
                return RunResult::failed(name, None, "scheduler stopped");
            }
            match self.registry.status_of(name) {
                None => return RunResult::failed(name, None, "task manager not found"),
                Some(InstanceStatus::Failed) => {
                    let error = self
                        .registry
                        .last_error_of(name)
                        .unwrap_or_else(|| "instance in failed state".to_string());
                    return RunResult::failed(name, None, error);
                }
                Some(InstanceStatus::Updating) => {
                    debug!(instance = %name, "instance updating; waiting");
                    tokio::time::sleep(self.options.update_check_interval).await;
                }
                Some(_) => return self.run_instance(name, true).await,
            }
        }
    }

    async fn run_foreground(&self, names: Vec<String>, tx: mpsc::UnboundedSender<RunResult>) {
        let mut remaining = names;

        while !remaining.is_empty() {
            let mut all_updating = true;
            let mut deferred = Vec::new();

            for name in remaining {
                if !self.registry.is_running() {
                    debug!("scheduler stopped; abandoning foreground instances");
                    return;
                }
                match self.registry.status_of(&name) {
                    None => {
                        all_updating = false;
                        let _ = tx.send(RunResult::failed(&name, None, "task manager not found"));
                    }
                    Some(InstanceStatus::Updating) => {
                        debug!(instance = %name, "instance updating; deferring");
                        deferred.push(name);
                    }
                    Some(_) => {
                        all_updating = false;
                        let result = self.run_instance(&name, true).await;
                        let _ = tx.send(result);
                    }
                }
            }

            remaining = deferred;
            if all_updating && !remaining.is_empty() {
                debug!(waiting = remaining.len(), "all remaining instances updating; waiting");
                tokio::time::sleep(self.options.update_check_interval).await;
            }
        }
    }

    // ---------------------------------------------------------------------
    // Single-instance runs
    // ---------------------------------------------------------------------

    /// Run every waiting task of one instance, in queue order.
    pub async fn start_one(&self, name: &str) -> RunResult {
        self.run_instance(name, false).await
    }

    async fn run_instance(&self, name: &str, within_full_run: bool) -> RunResult {
        let queue = match self.begin_instance_run(name, within_full_run) {
            Ok(queue) => queue,
            Err(result) => {
                warn!(instance = %name, error = %result.error, "instance not started");
                return result;
            }
        };

        info!(instance = %name, "instance run started");
        self.broadcaster.broadcast_status(name, InstanceStatus::Running);
        self.broadcaster.broadcast_queue(name, &queue);

        loop {
            let step = self.registry.with_manager(name, |tm| {
                if tm.queue.has_waiting() {
                    tm.switch_run().map(|task| (task, tm.queue.clone()))
                } else {
                    None
                }
            });
            let (task_name, queue) = match step {
                None => {
                    return self.fail(name, None, DacapoError::InstanceNotFound(name.to_string()));
                }
                Some(None) => break,
                Some(Some(step)) => step,
            };
            self.broadcaster.broadcast_queue(name, &queue);

            let request = match self.resolve_task(name, &task_name) {
                Ok(request) => request,
                Err(e) => return self.fail(name, Some(&task_name), e),
            };

            let cancel = match self.registry.with_manager(name, |tm| tm.attach_process()) {
                Some(Some(rx)) => rx,
                Some(None) => return self.finish_manual_stop(name, &task_name),
                None => {
                    return self.fail(
                        name,
                        Some(&task_name),
                        DacapoError::InstanceNotFound(name.to_string()),
                    );
                }
            };

            info!(instance = %name, task = %task_name, command = %request.command, "task started");
            let outcome = self.executor.run_command(request, cancel).await;

            let manual = self
                .registry
                .with_manager(name, |tm| {
                    tm.detach_process();
                    tm.is_manually_stopped()
                })
                .unwrap_or(false);

            match outcome {
                Ok(ProcessExit::Completed) => {
                    info!(instance = %name, task = %task_name, "task finished");
                }
                Ok(ProcessExit::ManuallyStopped) => {
                    return self.finish_manual_stop(name, &task_name);
                }
                Err(e) if manual => {
                    debug!(instance = %name, error = %e, "task error after manual stop");
                    return self.finish_manual_stop(name, &task_name);
                }
                Err(e) => return self.fail(name, Some(&task_name), e),
            }
        }

        let queue = self.registry.with_manager(name, |tm| {
            tm.switch_run();
            tm.status = InstanceStatus::Pending;
            tm.queue.clone()
        });
        self.broadcaster.broadcast_status(name, InstanceStatus::Pending);
        if let Some(queue) = queue {
            self.broadcaster.broadcast_queue(name, &queue);
        }
        info!(instance = %name, "instance run finished");
        RunResult::succeeded(name)
    }

    /// Validate the manager and move it to `Running`; nothing is mutated on
    /// rejection.
    fn begin_instance_run(
        &self,
        name: &str,
        within_full_run: bool,
    ) -> std::result::Result<TaskQueue, RunResult> {
        let store = &self.store;
        self.registry.with_state(|state| {
            if within_full_run && !state.running {
                return Err(RunResult::failed(name, None, "scheduler stopped"));
            }
            let Some(tm) = state.managers.get_mut(name) else {
                return Err(RunResult::failed(name, None, "task manager not found"));
            };
            match tm.status {
                InstanceStatus::Failed => {
                    let error = tm
                        .last_error
                        .clone()
                        .unwrap_or_else(|| "instance in failed state".to_string());
                    return Err(RunResult::failed(name, None, error));
                }
                InstanceStatus::Updating => {
                    return Err(RunResult::failed(name, None, "instance is updating"));
                }
                InstanceStatus::Running => {
                    return Err(RunResult::failed(name, None, "instance is already running"));
                }
                InstanceStatus::Pending => {}
            }

            if tm.queue.is_exhausted() {
                match store.get_instance(name) {
                    Ok(instance) => {
                        debug!(instance = %name, "queue exhausted; rebuilding from store");
                        tm.queue = instance.task_queue();
                    }
                    Err(e) => warn!(instance = %name, error = %e, "failed to rebuild queue"),
                }
            }

            tm.begin_run();
            Ok(tm.queue.clone())
        })
    }

    /// Fetch the task fresh from the store and build the process request.
    fn resolve_task(&self, name: &str, task_name: &str) -> Result<CommandRequest> {
        let instance = self.store.get_instance(name)?;
        let task = instance
            .task(task_name)
            .ok_or_else(|| DacapoError::TaskNotFound(task_name.to_string()))?;

        let command = match task.command.strip_prefix(PY_PREFIX) {
            Some(rest) => {
                let python = self
                    .store
                    .interpreter_path(name)?
                    .ok_or_else(|| DacapoError::InterpreterNotFound(name.to_string()))?;
                format!("\"{}\" {}", python.display(), rest)
            }
            None => task.command.clone(),
        };

        Ok(CommandRequest {
            instance: name.to_string(),
            task: task_name.to_string(),
            command,
            work_dir: instance.work_dir.clone(),
        })
    }

    fn fail(&self, name: &str, task_name: Option<&str>, err: DacapoError) -> RunResult {
        let message = err.to_string();
        error!(instance = %name, task = ?task_name, error = %message, "instance run failed");

        let queue = self.registry.with_manager(name, |tm| {
            tm.last_error = Some(message.clone());
            tm.status = InstanceStatus::Failed;
            tm.remove_run();
            tm.queue.clone()
        });
        self.broadcaster.broadcast_status(name, InstanceStatus::Failed);
        if let Some(queue) = queue {
            self.broadcaster.broadcast_queue(name, &queue);
        }
        self.broadcaster.broadcast_log(name, &message);

        RunResult::failed(name, task_name, message)
    }

    fn finish_manual_stop(&self, name: &str, task_name: &str) -> RunResult {
        info!(instance = %name, task = %task_name, "instance run stopped manually");

        let queue = self.registry.with_manager(name, |tm| {
            tm.remove_run();
            tm.status = InstanceStatus::Pending;
            tm.last_error = None;
            tm.queue.clone()
        });
        self.broadcaster.broadcast_status(name, InstanceStatus::Pending);
        if let Some(queue) = queue {
            self.broadcaster.broadcast_queue(name, &queue);
        }

        RunResult::failed(name, Some(task_name), MANUALLY_STOPPED)
    }

    // ---------------------------------------------------------------------
    // Commands, updates, observers
    // ---------------------------------------------------------------------

    /// Apply a start/stop command. Starts run on their own task; the handle
    /// is returned so callers can await completion.
    pub fn dispatch(&self, command: SchedulerCommand) -> Option<JoinHandle<()>> {
        match command {
            SchedulerCommand::Start {
                instance: None,
                auto_close,
            } => {
                if auto_close {
                    self.registry.set_auto_close(true);
                }
                let this = self.clone();
                Some(tokio::spawn(async move {
                    this.start_all().await;
                }))
            }
            SchedulerCommand::Start {
                instance: Some(name),
                ..
            } => {
                let this = self.clone();
                Some(tokio::spawn(async move {
                    this.start_one(&name).await;
                }))
            }
            SchedulerCommand::Stop { instance: None } => {
                self.registry.set_auto_close(false);
                self.stop_all();
                None
            }
            SchedulerCommand::Stop {
                instance: Some(name),
            } => {
                self.stop_one(&name);
                None
            }
        }
    }

    /// Mark an instance as updating. Refused while it is running.
    pub fn begin_update(&self, name: &str) -> bool {
        let accepted = self.registry.with_manager(name, |tm| {
            if tm.status == InstanceStatus::Running {
                return false;
            }
            tm.status = InstanceStatus::Updating;
            true
        });
        match accepted {
            Some(true) => {
                info!(instance = %name, "instance updating");
                self.broadcaster.broadcast_status(name, InstanceStatus::Updating);
                true
            }
            Some(false) => {
                warn!(instance = %name, "cannot update a running instance");
                false
            }
            None => {
                warn!(instance = %name, "update requested for unknown instance");
                false
            }
        }
    }

    /// End an update: back to `Pending`, or `Failed` with the error recorded.
    pub fn finish_update(&self, name: &str, outcome: std::result::Result<(), String>) -> bool {
        let status = match outcome {
            Ok(()) => InstanceStatus::Pending,
            Err(_) => InstanceStatus::Failed,
        };
        let error = outcome.err();

        let found = self
            .registry
            .with_manager(name, |tm| {
                tm.status = status;
                tm.last_error = error.clone();
            })
            .is_some();
        if !found {
            warn!(instance = %name, "update finished for unknown instance");
            return false;
        }

        info!(instance = %name, status = ?status, "instance update finished");
        self.broadcaster.broadcast_status(name, status);
        if let Some(error) = error {
            self.broadcaster.broadcast_log(name, &error);
        }
        true
    }

    /// Back to `Pending` with a fresh queue and no recorded error. Refused
    /// while the instance is running.
    pub fn reset(&self, name: &str) -> bool {
        let instance = match self.store.get_instance(name) {
            Ok(instance) => instance,
            Err(e) => {
                warn!(instance = %name, error = %e, "cannot reset instance");
                return false;
            }
        };

        let queue = self.registry.with_manager(name, |tm| {
            if tm.status == InstanceStatus::Running {
                return None;
            }
            tm.status = InstanceStatus::Pending;
            tm.last_error = None;
            tm.queue = instance.task_queue();
            Some(tm.queue.clone())
        });
        match queue.flatten() {
            Some(queue) => {
                info!(instance = %name, "instance reset");
                self.broadcaster.broadcast_status(name, InstanceStatus::Pending);
                self.broadcaster.broadcast_queue(name, &queue);
                true
            }
            None => {
                warn!(instance = %name, "cannot reset a running or unknown instance");
                false
            }
        }
    }

    /// Re-broadcast every queue and status, then the global state, for an
    /// observer that just connected.
    pub fn replay_state(&self) {
        for (name, queue) in self.registry.task_queues() {
            self.broadcaster.broadcast_queue(&name, &queue);
        }
        for (name, status) in self.registry.statuses() {
            self.broadcaster.broadcast_status(&name, status);
        }
        let global = if self.registry.is_running() {
            InstanceStatus::Running
        } else {
            InstanceStatus::Pending
        };
        self.broadcaster.broadcast_status("", global);
    }
}

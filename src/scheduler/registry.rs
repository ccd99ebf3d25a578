// src/scheduler/registry.rs

//! Keyed collection of task managers plus the global scheduler flags.
//!
//! Every access first reconciles the managers with the instance store:
//! instances that appeared get a fresh `Pending` manager, instances that
//! vanished lose theirs. Tracked managers are never reset by reconciliation.
//!
//! The state lives behind one `std::sync::Mutex` that is only ever held for
//! short, non-async sections.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use crate::instance::TaskQueue;
use crate::store::InstanceStore;
use crate::types::InstanceStatus;

use super::task_manager::TaskManager;

/// Callback fired when the scheduler decides the application should close.
pub type CloseHook = Arc<dyn Fn() + Send + Sync>;

/// Point-in-time copy of one manager's observable state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerSnapshot {
    pub status: InstanceStatus,
    pub queue: TaskQueue,
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
pub(crate) struct RegistryState {
    pub(crate) managers: HashMap<String, TaskManager>,
    /// A full run (StartAll) is in progress.
    pub(crate) running: bool,
    pub(crate) cron_expr: Option<String>,
    /// Fire the close hook when the current run ends.
    pub(crate) auto_close: bool,
}

pub struct Registry {
    store: Arc<dyn InstanceStore>,
    state: Mutex<RegistryState>,
    close_hook: Mutex<Option<CloseHook>>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("store", &self.store)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Registry {
    pub fn new(store: Arc<dyn InstanceStore>) -> Self {
        let registry = Self {
            store,
            state: Mutex::new(RegistryState::default()),
            close_hook: Mutex::new(None),
        };
        registry.sync_with_store();
        registry
    }

    pub fn store(&self) -> Arc<dyn InstanceStore> {
        Arc::clone(&self.store)
    }

    /// Reconcile managers with the store without doing anything else.
    pub fn sync_with_store(&self) {
        self.with_state(|_| ());
    }

    /// Lock, reconcile, then run `f` on the state.
    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut RegistryState) -> R) -> R {
        let mut state = self.lock_state();
        reconcile(&mut state, self.store.as_ref());
        f(&mut state)
    }

    /// Run `f` on one manager; `None` if the instance is not tracked.
    pub fn with_manager<R>(&self, name: &str, f: impl FnOnce(&mut TaskManager) -> R) -> Option<R> {
        self.with_state(|state| state.managers.get_mut(name).map(f))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.with_state(|state| state.managers.contains_key(name))
    }

    /// Tracked instance names, sorted.
    pub fn instance_names(&self) -> Vec<String> {
        self.with_state(|state| {
            let mut names: Vec<String> = state.managers.keys().cloned().collect();
            names.sort();
            names
        })
    }

    pub fn status_of(&self, name: &str) -> Option<InstanceStatus> {
        self.with_manager(name, |tm| tm.status)
    }

    pub fn queue_of(&self, name: &str) -> Option<TaskQueue> {
        self.with_manager(name, |tm| tm.queue.clone())
    }

    pub fn last_error_of(&self, name: &str) -> Option<String> {
        self.with_manager(name, |tm| tm.last_error.clone()).flatten()
    }

    pub fn snapshot(&self, name: &str) -> Option<ManagerSnapshot> {
        self.with_manager(name, |tm| ManagerSnapshot {
            status: tm.status,
            queue: tm.queue.clone(),
            last_error: tm.last_error.clone(),
        })
    }

    /// Status of every tracked instance.
    pub fn statuses(&self) -> BTreeMap<String, InstanceStatus> {
        self.with_state(|state| {
            state
                .managers
                .iter()
                .map(|(name, tm)| (name.clone(), tm.status))
                .collect()
        })
    }

    /// Queue of every tracked instance.
    pub fn task_queues(&self) -> BTreeMap<String, TaskQueue> {
        self.with_state(|state| {
            state
                .managers
                .iter()
                .map(|(name, tm)| (name.clone(), tm.queue.clone()))
                .collect()
        })
    }

    /// Replace queues wholesale (e.g. reordered by a UI). Unknown names are
    /// ignored; running instances keep their queue.
    pub fn update_queues(&self, queues: BTreeMap<String, TaskQueue>) {
        self.with_state(|state| {
            for (name, queue) in queues {
                match state.managers.get_mut(&name) {
                    Some(tm) if tm.status == InstanceStatus::Running => {
                        warn!(instance = %name, "refusing to replace queue of a running instance");
                    }
                    Some(tm) => tm.queue = queue,
                    None => debug!(instance = %name, "ignoring queue for unknown instance"),
                }
            }
        });
    }

    /// Returns `false` if the instance is not tracked.
    pub fn set_status(&self, name: &str, status: InstanceStatus) -> bool {
        self.with_manager(name, |tm| tm.status = status).is_some()
    }

    /// Cancel one instance's current run. Returns `false` if the instance is
    /// not tracked.
    pub fn cancel_task(&self, name: &str) -> bool {
        self.with_manager(name, TaskManager::cancel).is_some()
    }

    /// Cancel every instance currently `Running`; returns their names.
    pub fn cancel_running(&self) -> Vec<String> {
        self.with_state(|state| {
            let mut cancelled = Vec::new();
            for (name, tm) in state.managers.iter_mut() {
                if tm.status == InstanceStatus::Running {
                    tm.cancel();
                    cancelled.push(name.clone());
                }
            }
            cancelled.sort();
            cancelled
        })
    }

    pub fn is_running(&self) -> bool {
        self.lock_state().running
    }

    pub fn set_running(&self, running: bool) {
        self.lock_state().running = running;
    }

    pub fn cron_expr(&self) -> Option<String> {
        self.lock_state().cron_expr.clone()
    }

    pub fn set_cron_expr(&self, expr: Option<String>) {
        self.lock_state().cron_expr = expr;
    }

    pub fn auto_close(&self) -> bool {
        self.lock_state().auto_close
    }

    pub fn set_auto_close(&self, armed: bool) {
        self.lock_state().auto_close = armed;
    }

    pub fn set_close_hook(&self, hook: Option<CloseHook>) {
        *self
            .close_hook
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = hook;
    }

    /// Fire the close hook if auto-close is armed. Disarms it first so the
    /// hook fires at most once per arming.
    pub fn trigger_close(&self) -> bool {
        let armed = {
            let mut state = self.lock_state();
            std::mem::replace(&mut state.auto_close, false)
        };
        if !armed {
            debug!("auto close not armed");
            return false;
        }

        let hook = self
            .close_hook
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        match hook {
            Some(hook) => {
                info!("auto close triggered");
                hook();
                true
            }
            None => {
                debug!("auto close armed but no close hook installed");
                false
            }
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn reconcile(state: &mut RegistryState, store: &dyn InstanceStore) {
    let names = match store.instance_names() {
        Ok(names) => names,
        Err(e) => {
            warn!(error = %e, "failed to list instances; keeping current managers");
            return;
        }
    };
    let known: HashSet<&str> = names.iter().map(String::as_str).collect();

    state.managers.retain(|name, tm| {
        if known.contains(name.as_str()) {
            return true;
        }
        info!(instance = %name, "instance removed; dropping its task manager");
        tm.cancel();
        false
    });

    for name in &names {
        if state.managers.contains_key(name) {
            continue;
        }
        match store.get_instance(name) {
            Ok(instance) => {
                debug!(instance = %name, "creating task manager");
                state
                    .managers
                    .insert(name.clone(), TaskManager::new(name.clone(), instance.task_queue()));
            }
            Err(e) => warn!(instance = %name, error = %e, "failed to load instance"),
        }
    }
}

// src/store/memory.rs

//! In-memory instance store.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use anyhow::anyhow;

use crate::config::model::{ConfigFile, InstanceConfig};
use crate::config::validate::non_empty;
use crate::errors::{DacapoError, Result};
use crate::instance::{Instance, Task};

use super::InstanceStore;

#[derive(Debug, Clone)]
struct StoredInstance {
    instance: Instance,
    env_name: Option<String>,
    python_exec: Option<PathBuf>,
}

/// Ordered, lock-guarded map of instances.
///
/// Supports upserts and removals at any time; the registry reconciles its
/// task managers against the current contents on every access.
#[derive(Debug)]
pub struct MemoryStore {
    envs_dir: PathBuf,
    instances: RwLock<BTreeMap<String, StoredInstance>>,
}

impl MemoryStore {
    pub fn new(envs_dir: impl Into<PathBuf>) -> Self {
        Self {
            envs_dir: envs_dir.into(),
            instances: RwLock::new(BTreeMap::new()),
        }
    }

    /// Build a store holding every instance of a validated config.
    pub fn from_config(cfg: &ConfigFile) -> Self {
        let store = Self::new(cfg.settings.envs_dir.clone());
        {
            let mut map = store.write_map();
            for (name, ic) in cfg.instance.iter() {
                map.insert(name.clone(), stored_from_config(name, ic));
            }
        }
        store
    }

    /// Insert or replace an instance.
    pub fn upsert(
        &self,
        instance: Instance,
        env_name: Option<String>,
        python_exec: Option<PathBuf>,
    ) {
        self.write_map().insert(
            instance.name.clone(),
            StoredInstance {
                instance,
                env_name,
                python_exec,
            },
        );
    }

    /// Remove an instance; returns whether it existed.
    pub fn remove(&self, name: &str) -> bool {
        self.write_map().remove(name).is_some()
    }

    /// Apply `edit` to one stored instance.
    pub fn update_instance<F>(&self, name: &str, edit: F) -> Result<()>
    where
        F: FnOnce(&mut Instance),
    {
        let mut map = self.write_map();
        let stored = map
            .get_mut(name)
            .ok_or_else(|| DacapoError::InstanceNotFound(name.to_string()))?;
        edit(&mut stored.instance);
        Ok(())
    }

    fn read_map(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, StoredInstance>> {
        self.instances.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_map(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, StoredInstance>> {
        self.instances.write().unwrap_or_else(|e| e.into_inner())
    }
}

fn stored_from_config(name: &str, ic: &InstanceConfig) -> StoredInstance {
    let tasks = ic
        .tasks
        .iter()
        .map(|t| Task {
            name: t.name.clone(),
            active: t.active,
            priority: t.priority,
            command: t.command.clone(),
        })
        .collect();

    StoredInstance {
        instance: Instance {
            name: name.to_string(),
            ready: ic.ready,
            background: ic.background,
            work_dir: ic.work_dir.clone(),
            cron_expr: non_empty(&ic.cron_expr).map(str::to_string),
            tasks,
        },
        env_name: non_empty(&ic.env_name).map(str::to_string),
        python_exec: ic
            .python_exec
            .clone()
            .filter(|p| !p.as_os_str().is_empty()),
    }
}

/// Interpreter inside a virtual environment directory.
pub fn venv_python(envs_dir: &Path, env_name: &str) -> PathBuf {
    let venv = envs_dir.join(env_name);
    if cfg!(windows) {
        venv.join("Scripts").join("python.exe")
    } else {
        venv.join("bin").join("python")
    }
}

impl InstanceStore for MemoryStore {
    fn instance_names(&self) -> Result<Vec<String>> {
        Ok(self.read_map().keys().cloned().collect())
    }

    fn list_instances(&self) -> Result<Vec<Instance>> {
        Ok(self
            .read_map()
            .values()
            .map(|s| s.instance.clone())
            .collect())
    }

    fn get_instance(&self, name: &str) -> Result<Instance> {
        self.read_map()
            .get(name)
            .map(|s| s.instance.clone())
            .ok_or_else(|| DacapoError::InstanceNotFound(name.to_string()))
    }

    fn interpreter_path(&self, name: &str) -> Result<Option<PathBuf>> {
        let map = self.read_map();
        let stored = map
            .get(name)
            .ok_or_else(|| DacapoError::InstanceNotFound(name.to_string()))?;

        let path = match (&stored.python_exec, &stored.env_name) {
            (Some(exec), _) => exec.clone(),
            (None, Some(env)) => venv_python(&self.envs_dir, env),
            (None, None) => return Ok(None),
        };

        let absolute = std::path::absolute(&path)
            .map_err(|e| anyhow!("failed to get absolute path of {:?}: {e}", path))?;
        Ok(Some(absolute))
    }
}

// src/store/mod.rs

//! Instance store interface.
//!
//! The orchestration core never owns instance metadata; it reads it through
//! [`InstanceStore`] every time it needs it, so edits made between tasks are
//! picked up by tasks that have not started yet.
//!
//! - [`memory`] provides [`MemoryStore`], the store used by the daemon,
//!   filled from the validated config file.

pub mod memory;

use std::fmt::Debug;
use std::path::PathBuf;

use crate::errors::Result;
use crate::instance::Instance;

pub use memory::MemoryStore;

/// Read access to instance metadata.
pub trait InstanceStore: Send + Sync + Debug {
    /// Names of every known instance.
    fn instance_names(&self) -> Result<Vec<String>>;

    /// Every known instance, ready or not.
    fn list_instances(&self) -> Result<Vec<Instance>>;

    /// Instances marked ready.
    fn list_ready_instances(&self) -> Result<Vec<Instance>> {
        Ok(self
            .list_instances()?
            .into_iter()
            .filter(|i| i.ready)
            .collect())
    }

    /// Fails with `InstanceNotFound` for unknown names.
    fn get_instance(&self, name: &str) -> Result<Instance>;

    /// Absolute interpreter path for `py `-prefixed commands, or `None` when
    /// the instance has no interpreter configured.
    fn interpreter_path(&self, name: &str) -> Result<Option<PathBuf>>;
}

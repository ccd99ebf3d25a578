// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::types::{AutoAction, AutoActionTrigger};

/// Top-level configuration as read from a TOML file (unvalidated).
///
/// ```toml
/// [settings]
/// scheduler_cron = "0 4 * * *"
/// max_bg_concurrent = 2
///
/// [instance.alpha]
/// background = true
/// work_dir = "./alpha"
///
/// [[instance.alpha.task]]
/// name = "daily"
/// priority = 5
/// command = "py main.py --task daily"
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    /// Global behaviour from `[settings]`.
    #[serde(default)]
    pub settings: Settings,

    /// All instances from `[instance.<name>]`, keyed by instance name.
    #[serde(default)]
    pub instance: BTreeMap<String, InstanceConfig>,
}

/// A validated configuration. Only constructible through
/// `ConfigFile::try_from(RawConfigFile)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub settings: Settings,
    pub instance: BTreeMap<String, InstanceConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        settings: Settings,
        instance: BTreeMap<String, InstanceConfig>,
    ) -> Self {
        Self { settings, instance }
    }
}

/// `[settings]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Run every ready instance once when the daemon starts.
    #[serde(default)]
    pub run_on_startup: bool,

    /// Cron expression (5 or 6 fields) for full runs.
    #[serde(default)]
    pub scheduler_cron: Option<String>,

    /// Cap on concurrently running background instances; 0 = unbounded.
    #[serde(default)]
    pub max_bg_concurrent: usize,

    /// How long to sleep between polls while an instance is updating.
    #[serde(default = "default_update_check_interval_secs")]
    pub update_check_interval_secs: u64,

    /// Root directory holding one Python virtual environment per `env_name`.
    #[serde(default = "default_envs_dir")]
    pub envs_dir: PathBuf,

    /// How many characters of stderr to keep for failure messages.
    #[serde(default = "default_stderr_tail_chars")]
    pub stderr_tail_chars: usize,

    /// ServerChan push key; empty disables notifications.
    #[serde(default)]
    pub serverchan_sendkey: String,

    #[serde(default)]
    pub auto_action: AutoAction,

    #[serde(default)]
    pub auto_action_trigger: AutoActionTrigger,

    /// Cron expression used when `auto_action_trigger = "scheduled"`.
    #[serde(default)]
    pub auto_action_cron: Option<String>,
}

fn default_update_check_interval_secs() -> u64 {
    10
}

fn default_envs_dir() -> PathBuf {
    PathBuf::from("envs")
}

fn default_stderr_tail_chars() -> usize {
    2000
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            run_on_startup: false,
            scheduler_cron: None,
            max_bg_concurrent: 0,
            update_check_interval_secs: default_update_check_interval_secs(),
            envs_dir: default_envs_dir(),
            stderr_tail_chars: default_stderr_tail_chars(),
            serverchan_sendkey: String::new(),
            auto_action: AutoAction::default(),
            auto_action_trigger: AutoActionTrigger::default(),
            auto_action_cron: None,
        }
    }
}

/// `[instance.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct InstanceConfig {
    #[serde(default = "default_true")]
    pub ready: bool,

    #[serde(default)]
    pub background: bool,

    #[serde(default)]
    pub work_dir: Option<PathBuf>,

    /// Name of the virtual environment under `settings.envs_dir`.
    #[serde(default)]
    pub env_name: Option<String>,

    /// Explicit interpreter path; wins over `env_name`.
    #[serde(default)]
    pub python_exec: Option<PathBuf>,

    /// Per-instance cron expression.
    #[serde(default)]
    pub cron_expr: Option<String>,

    /// `[[instance.<name>.task]]` entries, in template order.
    #[serde(default, rename = "task")]
    pub tasks: Vec<TaskConfig>,
}

/// `[[instance.<name>.task]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    pub name: String,

    #[serde(default = "default_true")]
    pub active: bool,

    #[serde(default)]
    pub priority: u32,

    pub command: String,
}

fn default_true() -> bool {
    true
}

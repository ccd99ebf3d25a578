use std::collections::BTreeMap;
use std::path::PathBuf;

use dacapo::config::{ConfigFile, InstanceConfig, RawConfigFile, Settings, TaskConfig};
use dacapo::errors::Result;
use dacapo::instance::{Instance, Task};

/// Builder for `Task`. Active with priority 0 unless told otherwise.
pub struct TaskBuilder {
    task: Task,
}

impl TaskBuilder {
    pub fn new(name: &str, command: &str) -> Self {
        Self {
            task: Task {
                name: name.to_string(),
                active: true,
                priority: 0,
                command: command.to_string(),
            },
        }
    }

    pub fn priority(mut self, priority: u32) -> Self {
        self.task.priority = priority;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.task.active = false;
        self
    }

    pub fn build(self) -> Task {
        self.task
    }
}

/// Builder for `Instance`. Ready, foreground and task-less by default.
pub struct InstanceBuilder {
    instance: Instance,
}

impl InstanceBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            instance: Instance {
                name: name.to_string(),
                ready: true,
                background: false,
                work_dir: None,
                cron_expr: None,
                tasks: Vec::new(),
            },
        }
    }

    pub fn background(mut self) -> Self {
        self.instance.background = true;
        self
    }

    pub fn not_ready(mut self) -> Self {
        self.instance.ready = false;
        self
    }

    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.instance.work_dir = Some(dir.into());
        self
    }

    pub fn cron(mut self, expr: &str) -> Self {
        self.instance.cron_expr = Some(expr.to_string());
        self
    }

    pub fn task(mut self, task: Task) -> Self {
        self.instance.tasks.push(task);
        self
    }

    /// Shorthand for an active priority-0 task.
    pub fn simple_task(self, name: &str, command: &str) -> Self {
        self.task(TaskBuilder::new(name, command).build())
    }

    pub fn build(self) -> Instance {
        self.instance
    }
}

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                settings: Settings::default(),
                instance: BTreeMap::new(),
            },
        }
    }

    pub fn settings(mut self, edit: impl FnOnce(&mut Settings)) -> Self {
        edit(&mut self.config.settings);
        self
    }

    pub fn with_instance(mut self, instance: Instance) -> Self {
        let cfg = InstanceConfig {
            ready: instance.ready,
            background: instance.background,
            work_dir: instance.work_dir,
            env_name: None,
            python_exec: None,
            cron_expr: instance.cron_expr,
            tasks: instance
                .tasks
                .into_iter()
                .map(|t| TaskConfig {
                    name: t.name,
                    active: t.active,
                    priority: t.priority,
                    command: t.command,
                })
                .collect(),
        };
        self.config.instance.insert(instance.name, cfg);
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn try_build(self) -> Result<ConfigFile> {
        ConfigFile::try_from(self.config)
    }

    pub fn build(self) -> ConfigFile {
        self.try_build()
            .expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// src/config/validate.rs

use std::collections::HashSet;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{DacapoError, Result};
use crate::schedule::parse_cron;
use crate::types::AutoActionTrigger;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::DacapoError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.settings, raw.instance))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_settings(cfg)?;
    validate_instances(cfg)?;
    Ok(())
}

fn validate_settings(cfg: &RawConfigFile) -> Result<()> {
    let settings = &cfg.settings;

    if settings.update_check_interval_secs == 0 {
        return Err(DacapoError::ConfigError(
            "[settings].update_check_interval_secs must be >= 1 (got 0)".to_string(),
        ));
    }

    if let Some(expr) = non_empty(&settings.scheduler_cron) {
        check_cron("[settings].scheduler_cron", expr)?;
    }

    match non_empty(&settings.auto_action_cron) {
        Some(expr) => check_cron("[settings].auto_action_cron", expr)?,
        None if settings.auto_action_trigger == AutoActionTrigger::Scheduled => {
            return Err(DacapoError::ConfigError(
                "[settings].auto_action_trigger = \"scheduled\" requires auto_action_cron"
                    .to_string(),
            ));
        }
        None => {}
    }

    Ok(())
}

fn validate_instances(cfg: &RawConfigFile) -> Result<()> {
    for (name, instance) in cfg.instance.iter() {
        if name.trim().is_empty() {
            return Err(DacapoError::ConfigError(
                "instance names must not be empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for task in instance.tasks.iter() {
            if task.name.trim().is_empty() {
                return Err(DacapoError::ConfigError(format!(
                    "instance '{}' has a task with an empty name",
                    name
                )));
            }
            if !seen.insert(task.name.as_str()) {
                return Err(DacapoError::ConfigError(format!(
                    "instance '{}' has duplicate task '{}'",
                    name, task.name
                )));
            }
        }

        if let Some(expr) = non_empty(&instance.cron_expr) {
            check_cron(&format!("[instance.{}].cron_expr", name), expr)?;
        }
    }
    Ok(())
}

fn check_cron(field: &str, expr: &str) -> Result<()> {
    parse_cron(expr)
        .map(|_| ())
        .map_err(|e| DacapoError::ConfigError(format!("{field}: {e}")))
}

pub(crate) fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

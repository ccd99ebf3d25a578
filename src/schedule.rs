// src/schedule.rs

//! Cron triggers for the daemon.
//!
//! Expressions are evaluated in local time. Five-field expressions get a
//! leading seconds field of `0`.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use cron::Schedule;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::config::validate::non_empty;
use crate::errors::{DacapoError, Result};
use crate::scheduler::{CloseHook, Orchestrator, SchedulerCommand};
use crate::types::AutoActionTrigger;

/// Accept both the classic 5-field form and the 6-field form with seconds.
pub fn normalize_cron(expr: &str) -> String {
    let expr = expr.trim();
    if expr.split_whitespace().count() == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    }
}

pub fn parse_cron(expr: &str) -> Result<Schedule> {
    Schedule::from_str(&normalize_cron(expr)).map_err(|source| DacapoError::Cron {
        expr: expr.to_string(),
        source,
    })
}

/// Next fire time strictly after `after` (or after now).
pub fn next_fire(schedule: &Schedule, after: Option<&DateTime<Local>>) -> Option<DateTime<Local>> {
    match after {
        Some(after) => schedule.after(after).next(),
        None => schedule.upcoming(Local).next(),
    }
}

/// Running cron jobs. Dropping the set stops every job.
#[derive(Debug, Default)]
pub struct CronJobs {
    jobs: Vec<(String, JoinHandle<()>)>,
}

impl CronJobs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a job calling `action` on every tick of `schedule`.
    pub fn add<F>(&mut self, name: impl Into<String>, schedule: Schedule, action: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let name = name.into();
        let handle = tokio::spawn(run_job(name.clone(), schedule, action));
        self.jobs.push((name, handle));
    }

    pub fn names(&self) -> Vec<&str> {
        self.jobs.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn shutdown(&mut self) {
        for (name, handle) in self.jobs.drain(..) {
            debug!(job = %name, "stopping cron job");
            handle.abort();
        }
    }
}

impl Drop for CronJobs {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run_job<F>(name: String, schedule: Schedule, action: F)
where
    F: Fn() + Send + Sync + 'static,
{
    let mut last: Option<DateTime<Local>> = None;
    loop {
        let Some(next) = next_fire(&schedule, last.as_ref()) else {
            info!(job = %name, "cron schedule has no upcoming fire time");
            return;
        };
        info!(job = %name, next = %next.to_rfc3339(), "cron job armed");

        let wait = (next - Local::now()).to_std().unwrap_or(Duration::ZERO);
        tokio::time::sleep(wait).await;

        debug!(job = %name, "cron job fired");
        action();
        last = Some(next);
    }
}

/// Arm every cron job the settings and the store ask for.
///
/// - `scheduler_cron` (unless `run_on_startup`): arm auto-close and start a
///   full run.
/// - per-instance `cron_expr` on ready instances: single-instance run.
/// - any auto action but `none`: with trigger `scheduler_end`, `close`
///   becomes the registry's close hook; with `scheduled`, a job on
///   `auto_action_cron` calls it whenever auto-close is armed.
pub fn arm_cron_jobs(
    settings: &Settings,
    orchestrator: &Orchestrator,
    close: CloseHook,
) -> Result<CronJobs> {
    let mut jobs = CronJobs::new();
    let registry = Arc::clone(orchestrator.registry());

    if let Some(expr) = non_empty(&settings.scheduler_cron) {
        if settings.run_on_startup {
            info!("run_on_startup set; scheduler cron ignored");
        } else {
            let schedule = parse_cron(expr)?;
            registry.set_cron_expr(Some(expr.to_string()));
            let orchestrator = orchestrator.clone();
            jobs.add("scheduler", schedule, move || {
                orchestrator.dispatch(SchedulerCommand::Start {
                    instance: None,
                    auto_close: true,
                });
            });
        }
    }

    for instance in registry.store().list_ready_instances()? {
        let Some(expr) = non_empty(&instance.cron_expr) else {
            continue;
        };
        let schedule = parse_cron(expr)?;
        let orchestrator = orchestrator.clone();
        let name = instance.name.clone();
        jobs.add(format!("instance:{}", instance.name), schedule, move || {
            orchestrator.dispatch(SchedulerCommand::Start {
                instance: Some(name.clone()),
                auto_close: false,
            });
        });
    }

    if !settings.auto_action.is_enabled() {
        debug!("auto action disabled");
    } else {
        match settings.auto_action_trigger {
            AutoActionTrigger::SchedulerEnd => {
                registry.set_close_hook(Some(close));
            }
            AutoActionTrigger::Scheduled => match non_empty(&settings.auto_action_cron) {
                Some(expr) => {
                    let schedule = parse_cron(expr)?;
                    let registry = Arc::clone(&registry);
                    jobs.add("auto-action", schedule, move || {
                        if registry.auto_close() {
                            registry.set_auto_close(false);
                            close();
                        } else {
                            debug!("auto close not armed; skipping scheduled action");
                        }
                    });
                }
                None => warn!("scheduled auto action without auto_action_cron; ignoring"),
            },
        }
    }

    info!(jobs = ?jobs.names(), "cron jobs armed");
    Ok(jobs)
}

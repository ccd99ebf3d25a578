// src/lib.rs

pub mod broadcast;
pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod instance;
pub mod logging;
pub mod notify;
pub mod power;
pub mod schedule;
pub mod scheduler;
pub mod store;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{broadcast as channel, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::broadcast::{ChannelBroadcaster, LiveUpdate};
use crate::cli::CliArgs;
use crate::config::{ConfigFile, Settings, load_and_validate};
use crate::exec::RealExecutor;
use crate::notify::ServerChanNotifier;
use crate::schedule::arm_cron_jobs;
use crate::scheduler::{
    CloseHook, Orchestrator, OrchestratorOptions, Registry, RunReport, RunResult, SchedulerCommand,
};
use crate::store::{InstanceStore, MemoryStore};
use crate::types::{AutoAction, InstanceStatus};

/// How long the daemon waits for cancelled runs to wind down on exit.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// High-level entry point used by `main.rs`. Returns the process exit code.
///
/// This wires together:
/// - config loading
/// - instance store, registry and live-update channel
/// - executor and notifier
/// - cron jobs (daemon mode)
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<i32> {
    let cfg = load_and_validate(&args.config)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(0);
    }

    let store: Arc<dyn InstanceStore> = Arc::new(MemoryStore::from_config(&cfg));
    let registry = Arc::new(Registry::new(store));
    let broadcaster = Arc::new(ChannelBroadcaster::default());
    let printer = spawn_printer(broadcaster.subscribe(), args.json);

    let executor = Arc::new(RealExecutor::new(
        broadcaster.clone(),
        cfg.settings.stderr_tail_chars,
    ));
    let orchestrator = Orchestrator::new(
        Arc::clone(&registry),
        executor,
        broadcaster.clone(),
        options_from_settings(&cfg.settings),
    )
    .with_notifier(Arc::new(ServerChanNotifier::new(
        cfg.settings.serverchan_sendkey.clone(),
    )));

    if args.once {
        let outcome = match args.instance.as_deref() {
            Some(name) => Outcome::Single(orchestrator.start_one(name).await),
            None => Outcome::Full(orchestrator.start_all().await),
        };

        // Closing the channel lets the printer flush what is left.
        drop(orchestrator);
        drop(registry);
        drop(broadcaster);
        if let Err(e) = printer.await {
            warn!(error = %e, "live update printer failed");
        }

        outcome.print(args.json)?;
        return Ok(if outcome.success() { 0 } else { 1 });
    }

    run_daemon(&cfg, &orchestrator).await?;
    printer.abort();
    Ok(0)
}

async fn run_daemon(cfg: &ConfigFile, orchestrator: &Orchestrator) -> Result<()> {
    let (close_tx, mut close_rx) = mpsc::unbounded_channel::<()>();
    let close: CloseHook = Arc::new(move || {
        let _ = close_tx.send(());
    });

    let mut jobs = arm_cron_jobs(&cfg.settings, orchestrator, close)?;

    if cfg.settings.run_on_startup {
        info!("run_on_startup set; starting all instances");
        orchestrator.dispatch(SchedulerCommand::Start {
            instance: None,
            auto_close: true,
        });
    }

    info!("dacapo daemon running; press Ctrl-C to stop");
    let action = cfg.settings.auto_action;
    loop {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    warn!(error = %e, "failed to listen for Ctrl-C");
                }
                info!("shutdown requested; stopping all instances");
                orchestrator.dispatch(SchedulerCommand::Stop { instance: None });
                break;
            }
            // Disabled when no close action is configured (sender dropped).
            Some(()) = close_rx.recv() => {
                if action == AutoAction::Exit {
                    info!("auto action: exiting");
                    break;
                }
                // Hibernate and shutdown act on the host; the daemon keeps
                // its schedule for when the machine comes back.
                if let Err(e) = power::perform(action).await {
                    warn!(?action, error = %e, "auto action failed");
                }
            }
        }
    }

    jobs.shutdown();
    wait_until_idle(orchestrator.registry(), SHUTDOWN_GRACE).await;
    Ok(())
}

async fn wait_until_idle(registry: &Registry, grace: Duration) {
    let idle = async {
        while registry
            .statuses()
            .values()
            .any(|s| *s == InstanceStatus::Running)
        {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    };
    if tokio::time::timeout(grace, idle).await.is_err() {
        warn!("instances still running at shutdown");
    }
}

pub fn options_from_settings(settings: &Settings) -> OrchestratorOptions {
    OrchestratorOptions {
        max_bg_concurrent: settings.max_bg_concurrent,
        update_check_interval: Duration::from_secs(settings.update_check_interval_secs),
    }
}

/// Print live updates until the channel closes.
fn spawn_printer(mut rx: channel::Receiver<LiveUpdate>, json: bool) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(update) => print_update(&update, json),
                Err(channel::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "live update printer lagging");
                }
                Err(channel::error::RecvError::Closed) => break,
            }
        }
        debug!("live update printer finished");
    })
}

fn print_update(update: &LiveUpdate, json: bool) {
    if json {
        match serde_json::to_string(update) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!(error = %e, "failed to serialise live update"),
        }
        return;
    }
    if let LiveUpdate::Log {
        instance_name,
        content,
    } = update
    {
        println!("[{instance_name}] {content}");
    }
}

enum Outcome {
    Single(RunResult),
    Full(RunReport),
}

impl Outcome {
    fn success(&self) -> bool {
        match self {
            Outcome::Single(r) => r.success,
            Outcome::Full(r) => r.success,
        }
    }

    fn print(&self, json: bool) -> Result<()> {
        if json {
            let line = match self {
                Outcome::Single(r) => serde_json::to_string(r)?,
                Outcome::Full(r) => serde_json::to_string(r)?,
            };
            println!("{line}");
            return Ok(());
        }

        let results: &[RunResult] = match self {
            Outcome::Single(r) => std::slice::from_ref(r),
            Outcome::Full(r) => {
                println!(
                    "run finished: {}/{} succeeded",
                    r.success_count, r.total_count
                );
                r.results.as_slice()
            }
        };
        for r in results {
            if r.success {
                println!("  ok      {}", r.name);
            } else {
                match r.task_name.as_deref() {
                    Some(task) => println!("  failed  {} [{}]: {}", r.name, task, r.error),
                    None => println!("  failed  {}: {}", r.name, r.error),
                }
            }
        }
        Ok(())
    }
}

/// Dry-run output: settings, instances, partitions and initial queues.
fn print_dry_run(cfg: &ConfigFile) {
    let settings = &cfg.settings;
    println!("dacapo dry-run");
    println!("  settings.run_on_startup = {}", settings.run_on_startup);
    if let Some(expr) = settings.scheduler_cron.as_deref() {
        println!("  settings.scheduler_cron = {expr}");
    }
    println!("  settings.max_bg_concurrent = {}", settings.max_bg_concurrent);
    println!(
        "  settings.auto_action = {:?} ({:?})",
        settings.auto_action, settings.auto_action_trigger
    );
    println!();

    let store = MemoryStore::from_config(cfg);
    let instances = match store.list_instances() {
        Ok(instances) => instances,
        Err(e) => {
            println!("failed to list instances: {e}");
            return;
        }
    };

    println!("instances ({}):", instances.len());
    for instance in instances {
        let partition = if instance.background {
            "background"
        } else {
            "foreground"
        };
        println!("  - {} ({partition})", instance.name);
        if !instance.ready {
            println!("      ready: false");
        }
        if let Some(dir) = instance.work_dir.as_ref() {
            println!("      work_dir: {}", dir.display());
        }
        if let Some(expr) = instance.cron_expr.as_deref() {
            println!("      cron: {expr}");
        }
        match store.interpreter_path(&instance.name) {
            Ok(Some(python)) => println!("      python: {}", python.display()),
            Ok(None) => {}
            Err(e) => println!("      python: <error: {e}>"),
        }
        println!("      queue: {:?}", instance.task_queue().waiting);
        for task in instance.tasks.iter() {
            let inactive = if task.active { "" } else { " (inactive)" };
            println!(
                "      task {} [priority {}]{inactive}: {}",
                task.name, task.priority, task.command
            );
        }
    }

    debug!("dry-run complete (no execution)");
}

use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{Local, TimeZone, Timelike};

use dacapo::config::Settings;
use dacapo::errors::DacapoError;
use dacapo::schedule::{CronJobs, arm_cron_jobs, next_fire, normalize_cron, parse_cron};
use dacapo::scheduler::CloseHook;
use dacapo::types::{AutoAction, AutoActionTrigger};
use dacapo_test_utils::{InstanceBuilder, TestHarness, init_tracing, wait_until};

type TestResult = Result<(), Box<dyn Error>>;

fn noop_close() -> CloseHook {
    Arc::new(|| {})
}

#[test]
fn five_field_expressions_gain_a_seconds_field() {
    assert_eq!(normalize_cron("0 4 * * *"), "0 0 4 * * *");
    assert_eq!(normalize_cron("  */5 * * * *  "), "0 */5 * * * *");
    assert_eq!(normalize_cron("30 0 4 * * *"), "30 0 4 * * *");
}

#[test]
fn invalid_expression_reports_the_input() {
    match parse_cron("not a cron") {
        Err(DacapoError::Cron { expr, .. }) => assert_eq!(expr, "not a cron"),
        other => panic!("Expected Cron error, got: {:?}", other.map(|_| ())),
    }
}

#[test]
fn next_fire_follows_the_schedule() -> TestResult {
    let schedule = parse_cron("0 4 * * *")?;
    let after = Local
        .with_ymd_and_hms(2024, 1, 10, 5, 0, 0)
        .single()
        .ok_or("ambiguous local time")?;

    let next = next_fire(&schedule, Some(&after)).ok_or("no next fire time")?;
    assert_eq!(next.hour(), 4);
    assert_eq!(next.minute(), 0);
    assert!(next > after);
    assert!(next - after <= chrono::Duration::hours(24));

    assert!(next_fire(&schedule, None).is_some());
    Ok(())
}

#[tokio::test]
async fn cron_job_fires_until_shut_down() -> TestResult {
    init_tracing();
    let fired = Arc::new(AtomicUsize::new(0));
    let mut jobs = CronJobs::new();

    let counter = fired.clone();
    jobs.add("tick", parse_cron("* * * * * *")?, move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(jobs.names(), vec!["tick"]);

    wait_until(|| fired.load(Ordering::SeqCst) >= 1).await;
    jobs.shutdown();
    assert!(jobs.is_empty());
    Ok(())
}

#[tokio::test]
async fn scheduler_and_instance_jobs_are_armed() -> TestResult {
    init_tracing();
    let h = TestHarness::new(vec![
        InstanceBuilder::new("alpha").cron("0 6 * * *").build(),
        InstanceBuilder::new("beta").build(),
        InstanceBuilder::new("gamma")
            .not_ready()
            .cron("0 7 * * *")
            .build(),
    ]);
    let settings = Settings {
        scheduler_cron: Some("0 4 * * *".to_string()),
        ..Settings::default()
    };

    let jobs = arm_cron_jobs(&settings, &h.orchestrator, noop_close())?;

    assert_eq!(jobs.names(), vec!["scheduler", "instance:alpha"]);
    assert_eq!(h.registry.cron_expr().as_deref(), Some("0 4 * * *"));
    Ok(())
}

#[tokio::test]
async fn run_on_startup_replaces_the_scheduler_cron() -> TestResult {
    init_tracing();
    let h = TestHarness::new(Vec::new());
    let settings = Settings {
        run_on_startup: true,
        scheduler_cron: Some("0 4 * * *".to_string()),
        ..Settings::default()
    };

    let jobs = arm_cron_jobs(&settings, &h.orchestrator, noop_close())?;

    assert!(jobs.is_empty());
    assert_eq!(h.registry.cron_expr(), None);
    Ok(())
}

#[tokio::test]
async fn exit_at_scheduler_end_installs_the_close_hook() -> TestResult {
    init_tracing();
    let h = TestHarness::new(Vec::new());
    let settings = Settings {
        auto_action: AutoAction::Exit,
        auto_action_trigger: AutoActionTrigger::SchedulerEnd,
        ..Settings::default()
    };
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    let close: CloseHook = Arc::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let jobs = arm_cron_jobs(&settings, &h.orchestrator, close)?;
    assert!(jobs.is_empty());

    h.registry.set_auto_close(true);
    assert!(h.registry.trigger_close());
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn scheduled_exit_gets_its_own_job_and_leaves_the_registry_hook_empty() -> TestResult {
    init_tracing();
    let h = TestHarness::new(Vec::new());
    let settings = Settings {
        auto_action: AutoAction::Exit,
        auto_action_trigger: AutoActionTrigger::Scheduled,
        auto_action_cron: Some("0 30 6 * * *".to_string()),
        ..Settings::default()
    };

    let jobs = arm_cron_jobs(&settings, &h.orchestrator, noop_close())?;

    assert_eq!(jobs.names(), vec!["auto-action"]);
    h.registry.set_auto_close(true);
    assert!(!h.registry.trigger_close());
    Ok(())
}

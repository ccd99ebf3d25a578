use std::error::Error;
use std::path::PathBuf;

use dacapo::instance::Instance;
use dacapo::scheduler::MANUALLY_STOPPED;
use dacapo::types::InstanceStatus;
use dacapo_test_utils::{
    InstanceBuilder, ScriptedOutcome, TaskBuilder, TestHarness, init_tracing, wait_until,
    with_timeout,
};

type TestResult = Result<(), Box<dyn Error>>;

/// `first` (priority 3), `second` (2), `third` (1).
fn three_task_instance(name: &str) -> Instance {
    InstanceBuilder::new(name)
        .task(TaskBuilder::new("first", "echo first").priority(3).build())
        .task(TaskBuilder::new("second", "echo second").priority(2).build())
        .task(TaskBuilder::new("third", "echo third").priority(1).build())
        .build()
}

#[tokio::test]
async fn successful_run_drains_queue_and_returns_to_pending() -> TestResult {
    init_tracing();
    let h = TestHarness::new(vec![three_task_instance("alpha")]);

    let result = with_timeout(h.orchestrator.start_one("alpha")).await;

    assert!(result.success, "unexpected failure: {:?}", result);
    assert_eq!(
        h.executor.commands(),
        vec!["echo first", "echo second", "echo third"]
    );

    let snap = h.registry.snapshot("alpha").ok_or("alpha not tracked")?;
    assert_eq!(snap.status, InstanceStatus::Pending);
    assert_eq!(snap.queue.running, None);
    assert!(snap.queue.waiting.is_empty());
    assert_eq!(snap.queue.stopped, vec!["first", "second", "third"]);
    assert_eq!(snap.last_error, None);

    assert_eq!(
        h.broadcaster.statuses_for("alpha"),
        vec![InstanceStatus::Running, InstanceStatus::Pending]
    );
    let last_queue = h.broadcaster.queues_for("alpha").pop().ok_or("no queue update")?;
    assert_eq!(last_queue, snap.queue);
    Ok(())
}

#[tokio::test]
async fn failing_task_freezes_queue_and_records_error() -> TestResult {
    init_tracing();
    let h = TestHarness::new(vec![three_task_instance("alpha")]);
    h.executor
        .script("echo second", ScriptedOutcome::Fail("boom".to_string()));

    let result = with_timeout(h.orchestrator.start_one("alpha")).await;

    assert!(!result.success);
    assert_eq!(result.task_name.as_deref(), Some("second"));
    assert_eq!(result.error, "boom");
    assert_eq!(h.executor.commands(), vec!["echo first", "echo second"]);

    let snap = h.registry.snapshot("alpha").ok_or("alpha not tracked")?;
    assert_eq!(snap.status, InstanceStatus::Failed);
    assert_eq!(snap.last_error.as_deref(), Some("boom"));
    assert_eq!(snap.queue.running, None);
    assert_eq!(snap.queue.waiting, vec!["third"]);
    assert_eq!(snap.queue.stopped, vec!["first", "second"]);

    assert_eq!(
        h.broadcaster.statuses_for("alpha"),
        vec![InstanceStatus::Running, InstanceStatus::Failed]
    );
    assert!(h.broadcaster.logs_for("alpha").contains(&"boom".to_string()));
    Ok(())
}

#[tokio::test]
async fn failed_instance_is_rejected_without_running_anything() -> TestResult {
    init_tracing();
    let h = TestHarness::new(vec![three_task_instance("alpha")]);
    h.executor
        .script("echo first", ScriptedOutcome::Fail("first broke".to_string()));

    let first = with_timeout(h.orchestrator.start_one("alpha")).await;
    assert!(!first.success);
    let queue_after_failure = h.registry.queue_of("alpha").ok_or("alpha not tracked")?;

    let second = with_timeout(h.orchestrator.start_one("alpha")).await;

    assert!(!second.success);
    assert_eq!(second.error, "first broke");
    assert_eq!(second.task_name, None);
    assert_eq!(h.executor.commands().len(), 1);
    assert_eq!(h.registry.queue_of("alpha"), Some(queue_after_failure));
    assert_eq!(h.registry.status_of("alpha"), Some(InstanceStatus::Failed));
    Ok(())
}

#[tokio::test]
async fn updating_instance_is_rejected_without_mutation() -> TestResult {
    init_tracing();
    let h = TestHarness::new(vec![three_task_instance("alpha")]);
    h.registry.set_status("alpha", InstanceStatus::Updating);
    let before = h.registry.snapshot("alpha").ok_or("alpha not tracked")?;

    let result = with_timeout(h.orchestrator.start_one("alpha")).await;

    assert!(!result.success);
    assert!(result.error.contains("updating"), "got: {}", result.error);
    assert!(h.executor.calls().is_empty());
    assert_eq!(h.registry.snapshot("alpha"), Some(before));
    assert!(h.broadcaster.statuses_for("alpha").is_empty());
    Ok(())
}

#[tokio::test]
async fn unknown_instance_is_rejected() -> TestResult {
    init_tracing();
    let h = TestHarness::new(Vec::new());

    let result = with_timeout(h.orchestrator.start_one("ghost")).await;

    assert!(!result.success);
    assert_eq!(result.error, "task manager not found");
    assert!(h.executor.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn cancel_returns_instance_to_pending_and_keeps_waiting_tasks() -> TestResult {
    init_tracing();
    let h = TestHarness::new(vec![three_task_instance("alpha")]);
    h.executor.script("echo first", ScriptedOutcome::Block);

    let run = {
        let orchestrator = h.orchestrator.clone();
        tokio::spawn(async move { orchestrator.start_one("alpha").await })
    };
    wait_until(|| h.executor.active() == 1).await;
    assert_eq!(h.registry.status_of("alpha"), Some(InstanceStatus::Running));

    assert!(h.orchestrator.stop_one("alpha"));
    let result = with_timeout(run).await?;

    assert!(!result.success);
    assert_eq!(result.error, MANUALLY_STOPPED);
    assert_eq!(result.task_name.as_deref(), Some("first"));
    assert_eq!(h.executor.commands(), vec!["echo first"]);

    let snap = h.registry.snapshot("alpha").ok_or("alpha not tracked")?;
    assert_eq!(snap.status, InstanceStatus::Pending);
    assert_eq!(snap.last_error, None);
    assert_eq!(snap.queue.running, None);
    assert_eq!(snap.queue.stopped, vec!["first"]);
    assert_eq!(snap.queue.waiting, vec!["second", "third"]);

    // The next start resumes with the untouched waiting tasks.
    let resumed = with_timeout(h.orchestrator.start_one("alpha")).await;
    assert!(resumed.success);
    assert_eq!(
        h.executor.commands(),
        vec!["echo first", "echo second", "echo third"]
    );
    Ok(())
}

#[tokio::test]
async fn second_start_while_running_is_rejected() -> TestResult {
    init_tracing();
    let h = TestHarness::new(vec![three_task_instance("alpha")]);
    h.executor.script("echo first", ScriptedOutcome::Block);

    let run = {
        let orchestrator = h.orchestrator.clone();
        tokio::spawn(async move { orchestrator.start_one("alpha").await })
    };
    wait_until(|| h.executor.active() == 1).await;

    let rejected = with_timeout(h.orchestrator.start_one("alpha")).await;
    assert!(!rejected.success);
    assert!(rejected.error.contains("already running"));
    assert_eq!(h.executor.max_active(), 1);

    h.executor.release("echo first");
    let result = with_timeout(run).await?;
    assert!(result.success);
    assert_eq!(h.executor.max_active(), 1);
    Ok(())
}

#[tokio::test]
async fn exhausted_queue_is_rebuilt_for_the_next_run() -> TestResult {
    init_tracing();
    let h = TestHarness::new(vec![three_task_instance("alpha")]);

    assert!(with_timeout(h.orchestrator.start_one("alpha")).await.success);
    assert!(with_timeout(h.orchestrator.start_one("alpha")).await.success);

    assert_eq!(h.executor.commands().len(), 6);
    let snap = h.registry.snapshot("alpha").ok_or("alpha not tracked")?;
    assert_eq!(snap.queue.stopped, vec!["first", "second", "third"]);
    Ok(())
}

#[tokio::test]
async fn edits_between_tasks_are_picked_up() -> TestResult {
    init_tracing();
    let h = TestHarness::new(vec![three_task_instance("alpha")]);
    h.executor.script("echo first", ScriptedOutcome::Block);

    let run = {
        let orchestrator = h.orchestrator.clone();
        tokio::spawn(async move { orchestrator.start_one("alpha").await })
    };
    wait_until(|| h.executor.active() == 1).await;

    h.store.update_instance("alpha", |instance| {
        for task in instance.tasks.iter_mut() {
            if task.name == "second" {
                task.command = "echo changed".to_string();
            }
        }
    })?;
    h.executor.release("echo first");

    let result = with_timeout(run).await?;
    assert!(result.success);
    assert_eq!(
        h.executor.commands(),
        vec!["echo first", "echo changed", "echo third"]
    );
    Ok(())
}

#[tokio::test]
async fn task_removed_mid_run_fails_the_instance() -> TestResult {
    init_tracing();
    let h = TestHarness::new(vec![three_task_instance("alpha")]);
    h.executor.script("echo first", ScriptedOutcome::Block);

    let run = {
        let orchestrator = h.orchestrator.clone();
        tokio::spawn(async move { orchestrator.start_one("alpha").await })
    };
    wait_until(|| h.executor.active() == 1).await;

    h.store
        .update_instance("alpha", |instance| instance.tasks.retain(|t| t.name != "second"))?;
    h.executor.release("echo first");

    let result = with_timeout(run).await?;
    assert!(!result.success);
    assert_eq!(result.task_name.as_deref(), Some("second"));
    assert_eq!(result.error, "task not found: second");
    assert_eq!(h.registry.status_of("alpha"), Some(InstanceStatus::Failed));
    Ok(())
}

#[tokio::test]
async fn work_dir_is_passed_to_the_executor() -> TestResult {
    init_tracing();
    let instance = InstanceBuilder::new("alpha")
        .work_dir("/srv/alpha")
        .simple_task("only", "echo hi")
        .build();
    let h = TestHarness::new(vec![instance]);

    assert!(with_timeout(h.orchestrator.start_one("alpha")).await.success);

    let calls = h.executor.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].instance, "alpha");
    assert_eq!(calls[0].task, "only");
    assert_eq!(calls[0].work_dir, Some(PathBuf::from("/srv/alpha")));
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn py_prefix_resolves_to_configured_interpreter() -> TestResult {
    init_tracing();
    let h = TestHarness::new(Vec::new());
    let instance = InstanceBuilder::new("alpha")
        .simple_task("daily", "py main.py --task daily")
        .build();
    h.store
        .upsert(instance, None, Some(PathBuf::from("/opt/python/bin/python")));

    let result = with_timeout(h.orchestrator.start_one("alpha")).await;

    assert!(result.success, "unexpected failure: {:?}", result);
    assert_eq!(
        h.executor.commands(),
        vec!["\"/opt/python/bin/python\" main.py --task daily"]
    );
    Ok(())
}

#[tokio::test]
async fn py_prefix_without_interpreter_fails_fast() -> TestResult {
    init_tracing();
    let instance = InstanceBuilder::new("alpha")
        .simple_task("daily", "py main.py")
        .build();
    let h = TestHarness::new(vec![instance]);

    let result = with_timeout(h.orchestrator.start_one("alpha")).await;

    assert!(!result.success);
    assert_eq!(result.task_name.as_deref(), Some("daily"));
    assert!(result.error.contains("python"), "got: {}", result.error);
    assert!(h.executor.calls().is_empty());
    assert_eq!(h.registry.status_of("alpha"), Some(InstanceStatus::Failed));
    Ok(())
}

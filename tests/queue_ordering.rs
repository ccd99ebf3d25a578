use dacapo::instance::TaskQueue;
use dacapo_test_utils::{InstanceBuilder, TaskBuilder};

#[test]
fn queue_runs_tasks_by_descending_priority() {
    let instance = InstanceBuilder::new("alpha")
        .task(TaskBuilder::new("A", "echo a").priority(3).build())
        .task(TaskBuilder::new("B", "echo b").priority(5).build())
        .task(TaskBuilder::new("C", "echo c").priority(1).build())
        .build();

    let mut queue = instance.task_queue();
    assert_eq!(queue.waiting, vec!["B", "A", "C"]);

    let mut order = Vec::new();
    while let Some(task) = queue.switch_run() {
        order.push(task);
    }

    assert_eq!(order, vec!["B", "A", "C"]);
    assert_eq!(queue.running, None);
    assert!(queue.waiting.is_empty());
    assert_eq!(queue.stopped, vec!["B", "A", "C"]);
}

#[test]
fn equal_priorities_keep_template_order() {
    let instance = InstanceBuilder::new("alpha")
        .simple_task("first", "echo 1")
        .task(TaskBuilder::new("urgent", "echo u").priority(2).build())
        .simple_task("second", "echo 2")
        .simple_task("third", "echo 3")
        .build();

    let queue = instance.task_queue();
    assert_eq!(queue.waiting, vec!["urgent", "first", "second", "third"]);
}

#[test]
fn inactive_tasks_are_left_out_of_a_fresh_queue() {
    let instance = InstanceBuilder::new("alpha")
        .task(TaskBuilder::new("A", "echo a").priority(1).build())
        .task(TaskBuilder::new("B", "echo b").priority(5).inactive().build())
        .task(TaskBuilder::new("C", "echo c").priority(9).build())
        .build();

    let queue = instance.task_queue();
    assert_eq!(queue.running, None);
    assert_eq!(queue.waiting, vec!["C", "A"]);
    assert!(queue.stopped.is_empty());

    let json = serde_json::to_value(&queue).unwrap();
    assert_eq!(
        json,
        serde_json::json!({ "running": "", "waiting": ["C", "A"], "stopped": [] })
    );
}

#[test]
fn switch_run_with_nothing_waiting_only_flushes_running() {
    let mut queue = TaskQueue {
        running: Some("last".to_string()),
        waiting: Vec::new(),
        stopped: vec!["earlier".to_string()],
    };

    assert_eq!(queue.switch_run(), None);
    assert_eq!(queue.running, None);
    assert!(queue.waiting.is_empty());
    assert_eq!(queue.stopped, vec!["earlier", "last"]);
    assert!(queue.is_exhausted());
}

#[test]
fn remove_run_without_running_task_is_a_no_op() {
    let mut queue = TaskQueue {
        running: None,
        waiting: vec!["next".to_string()],
        stopped: Vec::new(),
    };

    queue.remove_run();

    assert_eq!(queue.running, None);
    assert_eq!(queue.waiting, vec!["next"]);
    assert!(queue.stopped.is_empty());
    assert!(queue.has_waiting());
    assert!(!queue.is_exhausted());
}

#[test]
fn queue_wire_shape_round_trips_empty_running() {
    let queue: TaskQueue =
        serde_json::from_str(r#"{"running":"","waiting":["a"],"stopped":["b"]}"#).unwrap();
    assert_eq!(queue.running, None);
    assert_eq!(queue.waiting, vec!["a"]);
    assert_eq!(queue.stopped, vec!["b"]);

    let queue: TaskQueue =
        serde_json::from_str(r#"{"running":"x","waiting":[],"stopped":[]}"#).unwrap();
    assert_eq!(queue.running.as_deref(), Some("x"));
}

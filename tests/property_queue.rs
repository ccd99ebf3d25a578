use proptest::prelude::*;

use dacapo::instance::{Task, TaskQueue};

// Strategy: up to 12 tasks with small priorities so ties are common.
fn tasks_strategy() -> impl Strategy<Value = Vec<Task>> {
    proptest::collection::vec((0u32..4, any::<bool>()), 0..12).prop_map(|specs| {
        specs
            .into_iter()
            .enumerate()
            .map(|(i, (priority, active))| Task {
                name: format!("task_{i}"),
                active,
                priority,
                command: format!("echo {i}"),
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn fresh_queue_is_stable_priority_order_of_active_tasks(tasks in tasks_strategy()) {
        let queue = TaskQueue::from_tasks(&tasks);

        let mut expected: Vec<&Task> = tasks.iter().filter(|t| t.active).collect();
        expected.sort_by(|a, b| b.priority.cmp(&a.priority));
        let expected: Vec<String> = expected.into_iter().map(|t| t.name.clone()).collect();

        prop_assert_eq!(&queue.waiting, &expected);
        prop_assert!(queue.running.is_none());
        prop_assert!(queue.stopped.is_empty());

        // Template index never decreases within one priority.
        for pair in queue.waiting.windows(2) {
            let a = tasks.iter().position(|t| t.name == pair[0]).unwrap();
            let b = tasks.iter().position(|t| t.name == pair[1]).unwrap();
            if tasks[a].priority == tasks[b].priority {
                prop_assert!(a < b);
            } else {
                prop_assert!(tasks[a].priority > tasks[b].priority);
            }
        }
    }

    #[test]
    fn draining_visits_every_active_task_exactly_once(tasks in tasks_strategy()) {
        let mut queue = TaskQueue::from_tasks(&tasks);
        let initial = queue.waiting.clone();

        let mut visited = Vec::new();
        while let Some(task) = queue.switch_run() {
            // At most one task is ever running.
            prop_assert_eq!(queue.running.as_deref(), Some(task.as_str()));
            prop_assert!(!queue.waiting.contains(&task));
            prop_assert!(!queue.stopped.contains(&task));
            visited.push(task);
        }

        prop_assert_eq!(&visited, &initial);
        prop_assert_eq!(&queue.stopped, &initial);
        prop_assert!(queue.is_exhausted());
    }
}

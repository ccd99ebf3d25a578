use std::sync::Arc;
use std::time::Duration;

use dacapo::instance::Instance;
use dacapo::scheduler::{Orchestrator, OrchestratorOptions, Registry};
use dacapo::store::MemoryStore;

use crate::fake_executor::ScriptedExecutor;
use crate::recording::{RecordingBroadcaster, RecordingNotifier};

/// Orchestrator wired to an in-memory store and fake collaborators.
pub struct TestHarness {
    pub store: Arc<MemoryStore>,
    pub registry: Arc<Registry>,
    pub broadcaster: Arc<RecordingBroadcaster>,
    pub executor: ScriptedExecutor,
    pub notifier: Arc<RecordingNotifier>,
    pub orchestrator: Orchestrator,
}

impl TestHarness {
    /// Unbounded background concurrency, 20ms update poll interval.
    pub fn new(instances: Vec<Instance>) -> Self {
        Self::with_options(
            instances,
            OrchestratorOptions {
                max_bg_concurrent: 0,
                update_check_interval: Duration::from_millis(20),
            },
        )
    }

    pub fn with_options(instances: Vec<Instance>, options: OrchestratorOptions) -> Self {
        let store = Arc::new(MemoryStore::new("envs"));
        for instance in instances {
            store.upsert(instance, None, None);
        }

        let registry = Arc::new(Registry::new(store.clone()));
        let broadcaster = Arc::new(RecordingBroadcaster::new());
        let executor = ScriptedExecutor::new();
        let notifier = Arc::new(RecordingNotifier::new());

        let orchestrator = Orchestrator::new(
            registry.clone(),
            Arc::new(executor.clone()),
            broadcaster.clone(),
            options,
        )
        .with_notifier(notifier.clone());

        Self {
            store,
            registry,
            broadcaster,
            executor,
            notifier,
            orchestrator,
        }
    }
}

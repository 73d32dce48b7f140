//! One-stop supervisor harness for integration tests: fakes wired into an
//! [`AgentContext`] with fast poll cadences.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use redfleet::context::AgentContext;
use redfleet::instance::{ProcessBackend, ReadinessChecker, ReadinessPolicy};
use redfleet::monitor::PollTiming;
use redfleet::store::{DescriptorStore, MemoryStore};
use redfleet::supervisor::{TaskSupervisor, TaskState};

use crate::fakes::{FakeBackend, FakeControl, FakeControlFactory, RecordingSink, ScriptedReadiness};

/// Default port base used by harness-built supervisors.
pub const TEST_BASE_PORT: u16 = 7000;

pub struct TestHarness {
    pub supervisor: Arc<TaskSupervisor>,
    pub store: Arc<MemoryStore>,
    pub backend: FakeBackend,
    pub control: Arc<FakeControl>,
    pub readiness: Arc<ScriptedReadiness>,
    pub status_rx: mpsc::UnboundedReceiver<(String, TaskState)>,
}

impl TestHarness {
    /// Harness with an always-ready readiness checker.
    pub fn new() -> Self {
        Self::with_readiness(ScriptedReadiness::ready(), 50)
    }

    /// Harness with a custom readiness script and check budget.
    pub fn with_readiness(readiness: ScriptedReadiness, max_checks: u32) -> Self {
        let store = Arc::new(MemoryStore::new());
        let backend = FakeBackend::new();
        let control = Arc::new(FakeControl::default());
        let readiness = Arc::new(readiness);
        let (sink, status_rx) = RecordingSink::new();

        let ctx = Arc::new(AgentContext {
            store: Arc::clone(&store) as Arc<dyn DescriptorStore>,
            backend: Arc::new(backend.clone()) as Arc<dyn ProcessBackend>,
            control: Arc::new(FakeControlFactory {
                control: Arc::clone(&control),
            }),
            readiness: Arc::clone(&readiness) as Arc<dyn ReadinessChecker>,
            readiness_policy: ReadinessPolicy {
                interval: Duration::from_millis(2),
                max_checks,
            },
            timing: PollTiming {
                settle: Duration::ZERO,
                command_poll: Duration::from_millis(10),
                stats_poll: Duration::from_millis(25),
            },
            host_ip: "127.0.0.1".to_string(),
            base_port: TEST_BASE_PORT,
        });

        let supervisor = Arc::new(TaskSupervisor::new(ctx, sink));

        Self {
            supervisor,
            store,
            backend,
            control,
            readiness,
            status_rx,
        }
    }

    /// Wait for the next status update, bounded.
    pub async fn next_status(&mut self) -> (String, TaskState) {
        tokio::time::timeout(Duration::from_secs(5), self.status_rx.recv())
            .await
            .expect("timed out waiting for a status update")
            .expect("status channel closed")
    }

    /// Poll until `pred` is true, bounded.
    pub async fn wait_until<F>(&self, pred: F)
    where
        F: Fn() -> bool,
    {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while !pred() {
            assert!(
                tokio::time::Instant::now() < deadline,
                "condition not reached within 5 seconds"
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

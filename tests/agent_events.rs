// tests/agent_events.rs

//! Orchestrator event dispatch: the agent loop drives the supervisor without
//! blocking on individual launches.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use redfleet::agent::{Agent, OrchestratorEvent};
use redfleet::supervisor::TaskState;
use redfleet_test_utils::harness::TestHarness;
use redfleet_test_utils::init_tracing;

#[tokio::test]
async fn event_loop_dispatches_launch_kill_and_shutdown() {
    init_tracing();
    let mut h = TestHarness::new();

    let (event_tx, event_rx) = mpsc::channel::<OrchestratorEvent>(16);
    let agent = Agent::new(Arc::clone(&h.supervisor), event_rx);
    let agent_handle = tokio::spawn(agent.run());

    event_tx.send(OrchestratorEvent::Registered).await.unwrap();
    event_tx
        .send(OrchestratorEvent::Launch {
            task_id: "t1".to_string(),
            payload: "256 Master".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(
        h.next_status().await,
        ("t1".to_string(), TaskState::Running)
    );

    event_tx
        .send(OrchestratorEvent::Kill {
            task_id: "t1".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(h.next_status().await, ("t1".to_string(), TaskState::Failed));
    assert_eq!(h.backend.kills(), vec!["t1".to_string()]);

    event_tx.send(OrchestratorEvent::Shutdown).await.unwrap();
    timeout(Duration::from_secs(3), agent_handle)
        .await
        .expect("agent loop did not exit after Shutdown")
        .expect("agent task panicked")
        .expect("agent loop returned an error");
}

#[tokio::test]
async fn event_loop_exits_when_the_channel_closes() {
    init_tracing();
    let h = TestHarness::new();

    let (event_tx, event_rx) = mpsc::channel::<OrchestratorEvent>(4);
    let agent = Agent::new(Arc::clone(&h.supervisor), event_rx);
    let agent_handle = tokio::spawn(agent.run());

    drop(event_tx);
    timeout(Duration::from_secs(3), agent_handle)
        .await
        .expect("agent loop did not exit on channel close")
        .expect("agent task panicked")
        .expect("agent loop returned an error");
}

// tests/replica_bringup.rs

//! Replica and promoted-replica bring-up: readiness polling, promotion, and
//! the bounded-stall path.

use redfleet::descriptor::{HostPort, InstanceState, Role};
use redfleet::store::DescriptorStore;
use redfleet::supervisor::TaskState;
use redfleet_test_utils::fakes::ScriptedReadiness;
use redfleet_test_utils::harness::TestHarness;
use redfleet_test_utils::init_tracing;

#[tokio::test]
async fn replica_waits_for_readiness_before_running() {
    init_tracing();
    let readiness = ScriptedReadiness::ready();
    readiness.push_verdicts(&[false, false, false]);
    let mut h = TestHarness::with_readiness(readiness, 50);

    h.supervisor.launch("t2", "256 SlaveOf 10.0.0.9:6379");
    assert_eq!(
        h.next_status().await,
        ("t2".to_string(), TaskState::Running)
    );

    // Three not-ready verdicts, then the fourth check passes.
    assert_eq!(h.readiness.checks(), 4);

    let plans = h.backend.plans();
    assert_eq!(
        plans[0].replica_of,
        Some(HostPort {
            host: "10.0.0.9".to_string(),
            port: 6379,
        })
    );

    let desc = h.store.get_descriptor("t2").await.unwrap().unwrap();
    assert_eq!(desc.role, Role::Replica);
    assert_eq!(desc.state, InstanceState::Running);
    assert_eq!(desc.replica_of.unwrap().to_string(), "10.0.0.9:6379");
}

#[tokio::test]
async fn promoted_replica_promotes_after_sync_and_keeps_upstream() {
    init_tracing();
    let readiness = ScriptedReadiness::ready();
    readiness.push_verdicts(&[false]);
    let mut h = TestHarness::with_readiness(readiness, 50);

    h.supervisor.launch("t3", "256 Master-SlaveOf 10.0.0.9:6379");
    assert_eq!(
        h.next_status().await,
        ("t3".to_string(), TaskState::Running)
    );

    assert_eq!(h.readiness.checks(), 2);
    assert!(h.control.commands().iter().any(|c| c == "promote"));

    let desc = h.store.get_descriptor("t3").await.unwrap().unwrap();
    assert_eq!(desc.role, Role::PromotedReplica);
    assert_eq!(desc.state, InstanceState::Running);
    // Promotion does not clear the original upstream.
    assert_eq!(desc.replica_of.unwrap().to_string(), "10.0.0.9:6379");
}

#[tokio::test]
async fn stalled_replica_reports_error_and_kills_the_process() {
    init_tracing();
    let mut h = TestHarness::with_readiness(ScriptedReadiness::never_ready(), 3);

    h.supervisor.launch("t2", "256 SlaveOf 10.0.0.9:6379");
    assert_eq!(h.next_status().await, ("t2".to_string(), TaskState::Error));

    // Exactly the budgeted number of checks, then the spawned process is
    // reaped rather than leaked.
    assert_eq!(h.readiness.checks(), 3);
    assert_eq!(h.backend.kills(), vec!["t2".to_string()]);
    assert_eq!(h.supervisor.active_tasks(), 0);

    let desc = h.store.get_descriptor("t2").await.unwrap().unwrap();
    assert_ne!(desc.state, InstanceState::Running);
}

#[tokio::test]
async fn primary_launch_never_polls_readiness() {
    init_tracing();
    let mut h = TestHarness::new();

    h.supervisor.launch("t1", "256 Master");
    assert_eq!(
        h.next_status().await,
        ("t1".to_string(), TaskState::Running)
    );
    assert_eq!(h.readiness.checks(), 0);
    assert!(!h.control.commands().iter().any(|c| c == "promote"));
}

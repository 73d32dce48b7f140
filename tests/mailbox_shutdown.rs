// tests/mailbox_shutdown.rs

//! The store-mediated command channel: graceful stop via the mailbox, the
//! failed-stop acknowledgment, and the stats cadence.

use std::time::Duration;

use redfleet::descriptor::{InstanceState, MAILBOX_SHUTDOWN, MAILBOX_SHUTDOWN_ERROR};
use redfleet::instance::ProcessExit;
use redfleet::store::DescriptorStore;
use redfleet::supervisor::TaskState;
use redfleet_test_utils::harness::TestHarness;
use redfleet_test_utils::init_tracing;

#[tokio::test]
async fn shutdown_command_triggers_graceful_stop_and_finished() {
    init_tracing();
    let mut h = TestHarness::new();

    h.supervisor.launch("t1", "256 Master");
    assert_eq!(
        h.next_status().await,
        ("t1".to_string(), TaskState::Running)
    );

    // Scheduler asks for a graceful stop through the mailbox.
    h.store.put_mailbox("t1", MAILBOX_SHUTDOWN).await.unwrap();
    h.wait_until(|| h.control.commands().iter().any(|c| c == "shutdown"))
        .await;

    // The command was consumed, not left to re-trigger.
    assert_eq!(h.store.mailbox_value("t1").as_deref(), Some(""));

    // The server obeys and exits cleanly: FINISHED.
    h.backend.send_exit(
        "t1",
        ProcessExit {
            success: true,
            code: Some(0),
        },
    );
    assert_eq!(
        h.next_status().await,
        ("t1".to_string(), TaskState::Finished)
    );

    let desc = h.store.get_descriptor("t1").await.unwrap().unwrap();
    assert_eq!(desc.state, InstanceState::Finished);
    assert_ne!(
        h.store.mailbox_value("t1").as_deref(),
        Some(MAILBOX_SHUTDOWN_ERROR)
    );
    assert_eq!(h.supervisor.active_tasks(), 0);
}

#[tokio::test]
async fn graceful_stop_exits_the_monitor_loop() {
    init_tracing();
    let mut h = TestHarness::new();

    h.supervisor.launch("t1", "256 Master");
    assert_eq!(
        h.next_status().await,
        ("t1".to_string(), TaskState::Running)
    );

    h.store.put_mailbox("t1", MAILBOX_SHUTDOWN).await.unwrap();
    h.wait_until(|| h.control.commands().iter().any(|c| c == "shutdown"))
        .await;

    // Once the stop succeeded the loop is gone: no further polling.
    tokio::time::sleep(Duration::from_millis(40)).await;
    let count = h.control.command_count();
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(h.control.command_count(), count);
}

#[tokio::test]
async fn failed_graceful_stop_acks_and_keeps_polling() {
    init_tracing();
    let mut h = TestHarness::new();
    h.control.script_shutdown_failure();

    h.supervisor.launch("t1", "256 Master");
    assert_eq!(
        h.next_status().await,
        ("t1".to_string(), TaskState::Running)
    );

    h.store.put_mailbox("t1", MAILBOX_SHUTDOWN).await.unwrap();

    // The failure is acknowledged to the scheduler through the mailbox.
    h.wait_until(|| {
        h.store.mailbox_value("t1").as_deref() == Some(MAILBOX_SHUTDOWN_ERROR)
    })
    .await;

    // And the loop keeps running.
    let count = h.control.command_count();
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(h.control.command_count() > count);

    // A later exit, even a clean one, is a failure: the stop never happened.
    h.backend.send_exit(
        "t1",
        ProcessExit {
            success: true,
            code: Some(0),
        },
    );
    assert_eq!(h.next_status().await, ("t1".to_string(), TaskState::Failed));
}

#[tokio::test]
async fn stats_snapshots_persist_on_cadence() {
    init_tracing();
    let mut h = TestHarness::new();

    h.supervisor.launch("t1", "256 Master");
    assert_eq!(
        h.next_status().await,
        ("t1".to_string(), TaskState::Running)
    );

    h.wait_until(|| h.store.stats_blob("t1").is_some()).await;
    let blob = h.store.stats_blob("t1").unwrap();
    assert!(blob.contains("# memory"));
    assert!(blob.contains("# cpu"));
    assert!(blob.contains("# stats"));
}

#[tokio::test]
async fn failed_info_section_skips_the_cycle_then_recovers() {
    init_tracing();
    let mut h = TestHarness::new();
    h.control.script_info_failures(3);

    h.supervisor.launch("t1", "256 Master");
    assert_eq!(
        h.next_status().await,
        ("t1".to_string(), TaskState::Running)
    );

    // The first cycles abort on the scripted failures; a later cycle lands.
    h.wait_until(|| h.store.stats_blob("t1").is_some()).await;
}

// src/monitor/poll_loop.rs

//! Steady-state monitoring loop.
//!
//! One loop per running instance, selecting among three sources with
//! first-ready-wins semantics:
//!
//! 1. the monitor's stop channel: exit immediately;
//! 2. a command-poll tick (~100 ms): read the scheduler mailbox from the
//!    store and run the graceful-stop procedure on `SHUTDOWN`;
//! 3. a stats-poll tick (~1 s): collect INFO sections from the live
//!    instance and persist a stats snapshot.
//!
//! Both timers are created once at loop entry. Stats and mailbox polling are
//! independent; no ordering between them is guaranteed.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::descriptor::{
    InstanceDescriptor, InstanceState, InstanceStats, MAILBOX_SHUTDOWN, MAILBOX_SHUTDOWN_ERROR,
};
use crate::instance::control::ControlChannel;
use crate::store::DescriptorStore;

use super::persist_descriptor;

/// Cadences of the monitoring loop.
#[derive(Debug, Clone, Copy)]
pub struct PollTiming {
    /// Delay before the first control-channel contact, giving the server a
    /// moment to start accepting connections.
    pub settle: Duration,
    /// Mailbox (command) poll period.
    pub command_poll: Duration,
    /// Stats poll period.
    pub stats_poll: Duration,
}

impl Default for PollTiming {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(1),
            command_poll: Duration::from_millis(100),
            stats_poll: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum MailboxOutcome {
    Continue,
    StopLoop,
}

pub async fn run(
    descriptor: Arc<Mutex<InstanceDescriptor>>,
    store: Arc<dyn DescriptorStore>,
    control: Arc<dyn ControlChannel>,
    mut stop_rx: tokio::sync::mpsc::Receiver<()>,
    timing: PollTiming,
) {
    let name = {
        let desc = descriptor.lock().unwrap_or_else(|e| e.into_inner());
        desc.name.clone()
    };

    if !timing.settle.is_zero() {
        tokio::time::sleep(timing.settle).await;
    }
    match control.ping().await {
        Ok(()) => debug!(instance = %name, "control channel established"),
        Err(err) => warn!(instance = %name, error = %err, "instance not answering ping yet"),
    }

    let mut command_tick = tokio::time::interval(timing.command_poll);
    let mut stats_tick = tokio::time::interval(timing.stats_poll);
    command_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    stats_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(instance = %name, "monitor loop started");

    loop {
        tokio::select! {
            _ = stop_rx.recv() => {
                debug!(instance = %name, "stop signal received");
                break;
            }
            _ = command_tick.tick() => {
                let outcome =
                    check_mailbox(&descriptor, &store, control.as_ref(), &name).await;
                if outcome == MailboxOutcome::StopLoop {
                    break;
                }
            }
            _ = stats_tick.tick() => {
                update_stats(&descriptor, &store, control.as_ref(), &name).await;
            }
        }
    }

    info!(instance = %name, "monitor loop finished");
}

/// Read the scheduler mailbox and act on a `SHUTDOWN` command.
///
/// The command is consumed (the store mailbox is cleared) before the stop is
/// attempted, so a crash/restart does not re-trigger the stop on every later
/// poll; the in-memory descriptor keeps the last observed command for exit
/// classification. A failed stop writes `SHUTDOWN_ERROR` back for the
/// scheduler and leaves the loop running.
async fn check_mailbox(
    descriptor: &Arc<Mutex<InstanceDescriptor>>,
    store: &Arc<dyn DescriptorStore>,
    control: &dyn ControlChannel,
    name: &str,
) -> MailboxOutcome {
    let message = match store.get_mailbox(name).await {
        Ok(Some(message)) => message,
        Ok(None) => return MailboxOutcome::Continue,
        Err(err) => {
            warn!(instance = %name, error = %err, "failed to read mailbox from store");
            return MailboxOutcome::Continue;
        }
    };

    if message != MAILBOX_SHUTDOWN {
        if !message.is_empty() && message != MAILBOX_SHUTDOWN_ERROR {
            debug!(instance = %name, message = %message, "ignoring unknown mailbox command");
        }
        return MailboxOutcome::Continue;
    }

    info!(instance = %name, "shutdown command received from scheduler");
    {
        let mut desc = descriptor.lock().unwrap_or_else(|e| e.into_inner());
        desc.mailbox = MAILBOX_SHUTDOWN.to_string();
    }
    if let Err(err) = store.put_mailbox(name, "").await {
        warn!(instance = %name, error = %err, "failed to clear consumed mailbox command");
    }

    match control.shutdown().await {
        Ok(()) => {
            info!(instance = %name, "instance shut down gracefully");
            {
                let mut desc = descriptor.lock().unwrap_or_else(|e| e.into_inner());
                desc.state = InstanceState::Stopping;
            }
            persist_descriptor(store, descriptor, "stopping transition").await;
            MailboxOutcome::StopLoop
        }
        Err(err) => {
            warn!(instance = %name, error = %err, "graceful shutdown failed");
            // The scheduler reads this acknowledgment and can fall back to a
            // kill on the task.
            {
                let mut desc = descriptor.lock().unwrap_or_else(|e| e.into_inner());
                desc.mailbox = MAILBOX_SHUTDOWN_ERROR.to_string();
            }
            if let Err(err) = store.put_mailbox(name, MAILBOX_SHUTDOWN_ERROR).await {
                warn!(
                    instance = %name,
                    error = %err,
                    "failed to write shutdown-error acknowledgment"
                );
            }
            MailboxOutcome::Continue
        }
    }
}

/// Collect one stats snapshot and persist it. A failed INFO section aborts
/// this cycle's update; the loop continues.
async fn update_stats(
    descriptor: &Arc<Mutex<InstanceDescriptor>>,
    store: &Arc<dyn DescriptorStore>,
    control: &dyn ControlChannel,
    name: &str,
) {
    let mut sections = Vec::with_capacity(3);
    for section in ["memory", "cpu", "stats"] {
        match control.info(section).await {
            Ok(body) => sections.push(body),
            Err(err) => {
                warn!(
                    instance = %name,
                    section,
                    error = %err,
                    "stats collection failed; skipping this cycle"
                );
                return;
            }
        }
    }
    let others = sections.pop().unwrap_or_default();
    let cpu = sections.pop().unwrap_or_default();
    let memory = sections.pop().unwrap_or_default();
    let stats = InstanceStats {
        memory,
        cpu,
        others,
    };

    {
        let mut desc = descriptor.lock().unwrap_or_else(|e| e.into_inner());
        desc.stats = Some(stats.clone());
    }
    if let Err(err) = store.put_stats(name, &stats).await {
        warn!(instance = %name, error = %err, "failed to sync stats to store");
    }
}

// src/monitor/mod.rs

//! Per-instance lifecycle monitor.
//!
//! An [`InstanceMonitor`] owns one store-process from spawn to termination:
//!
//! - **Bring-up** is role-based. A primary is spawned and immediately
//!   committed as running. A replica is spawned, then the readiness predicate
//!   is polled (bounded by the context's [`ReadinessPolicy`]) until the sync
//!   from its upstream completes. A promoted replica additionally receives a
//!   promote command before being committed.
//! - **Steady state** runs in [`poll_loop`], a second concurrent unit owned
//!   by the same monitor, started only after the instance is confirmed
//!   running.
//! - **Teardown** happens either through the scheduler mailbox (graceful
//!   stop, handled inside the poll loop) or through the supervisor's forced
//!   kill (handled by the supervision unit holding the process).
//!
//! The two units communicate only through the monitor's private stop channel
//! and the shared store.

pub mod poll_loop;

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::context::AgentContext;
use crate::descriptor::{
    InstanceAddress, InstanceDescriptor, InstanceState, LaunchSpec, Role,
};
use crate::errors::{AgentError, Result};
use crate::instance::{InstanceProcess, SpawnPlan};
use crate::instance::control::ControlChannel;
use crate::store::DescriptorStore;

pub use poll_loop::PollTiming;

pub struct InstanceMonitor {
    ctx: Arc<AgentContext>,
    descriptor: Arc<Mutex<InstanceDescriptor>>,
    address: InstanceAddress,
    control: Arc<dyn ControlChannel>,
    process: Option<Box<dyn InstanceProcess>>,
    stop_tx: mpsc::Sender<()>,
    stop_rx: Option<mpsc::Receiver<()>>,
}

impl InstanceMonitor {
    pub fn new(ctx: Arc<AgentContext>, name: &str, spec: &LaunchSpec, port: u16) -> Self {
        let address = InstanceAddress {
            ip: ctx.host_ip.clone(),
            port,
        };
        let control = ctx.control.channel_for(&address);
        let descriptor = Arc::new(Mutex::new(InstanceDescriptor::from_spec(name, spec)));
        let (stop_tx, stop_rx) = mpsc::channel(1);
        Self {
            ctx,
            descriptor,
            address,
            control,
            process: None,
            stop_tx,
            stop_rx: Some(stop_rx),
        }
    }

    /// Shared handle to the in-memory descriptor.
    pub fn descriptor(&self) -> Arc<Mutex<InstanceDescriptor>> {
        Arc::clone(&self.descriptor)
    }

    /// Sender half of the monitor's private stop channel.
    pub fn stop_handle(&self) -> mpsc::Sender<()> {
        self.stop_tx.clone()
    }

    /// Hand the process to the supervision unit for exit-waiting and kill
    /// delivery. Present exactly once after a successful [`start`].
    ///
    /// [`start`]: InstanceMonitor::start
    pub fn take_process(&mut self) -> Option<Box<dyn InstanceProcess>> {
        self.process.take()
    }

    /// Role-based bring-up. On success the descriptor is committed to the
    /// store as running, with address and pid populated.
    pub async fn start(&mut self) -> Result<()> {
        let (name, role, replica_of) = {
            let desc = self.descriptor.lock().unwrap_or_else(|e| e.into_inner());
            (desc.name.clone(), desc.role, desc.replica_of.clone())
        };

        self.transition(InstanceState::Starting).await;

        let plan = SpawnPlan {
            name: name.clone(),
            port: self.address.port,
            replica_of,
        };
        let process = self.ctx.backend.spawn(&plan).await?;
        let pid = process.pid();
        self.process = Some(process);
        info!(
            instance = %name,
            role = ?role,
            port = self.address.port,
            pid,
            "instance process spawned"
        );

        if role.replicates_at_start() {
            if let Err(err) = self.wait_for_sync(&name).await {
                self.abort_spawned(&name).await;
                return Err(err);
            }
        }

        if role == Role::PromotedReplica {
            if let Err(err) = self.control.promote().await {
                self.abort_spawned(&name).await;
                return Err(err);
            }
            info!(instance = %name, "replica promoted to primary");
        }

        {
            let mut desc = self.descriptor.lock().unwrap_or_else(|e| e.into_inner());
            desc.state = InstanceState::Running;
            desc.address = Some(self.address.clone());
            desc.os_pid = pid;
        }
        persist_descriptor(&self.ctx.store, &self.descriptor, "running commit").await;
        Ok(())
    }

    /// Spawn the steady-state poll loop as its own task. Returns `None` if it
    /// was already started.
    pub fn spawn_poll_loop(&mut self) -> Option<JoinHandle<()>> {
        let stop_rx = self.stop_rx.take()?;
        Some(tokio::spawn(poll_loop::run(
            Arc::clone(&self.descriptor),
            Arc::clone(&self.ctx.store),
            Arc::clone(&self.control),
            stop_rx,
            self.ctx.timing,
        )))
    }

    /// Poll the readiness predicate until the replica has caught up, bounded
    /// by the context's policy. Checker errors count as "not ready": a
    /// transient INFO failure must not fail a sync that would pass on the
    /// next poll.
    async fn wait_for_sync(&self, name: &str) -> Result<()> {
        let policy = self.ctx.readiness_policy;
        let mut checks = 0u32;
        loop {
            checks += 1;
            let synced = match self.ctx.readiness.is_synced(self.control.as_ref()).await {
                Ok(synced) => synced,
                Err(err) => {
                    debug!(instance = %name, error = %err, "readiness check failed");
                    false
                }
            };
            if synced {
                debug!(instance = %name, checks, "replica sync complete");
                return Ok(());
            }
            if checks >= policy.max_checks {
                return Err(AgentError::ReplicationStall {
                    name: name.to_string(),
                    attempts: checks,
                });
            }
            tokio::time::sleep(policy.interval).await;
        }
    }

    /// Kill an already-spawned process after a failed bring-up so a stalled
    /// replica does not leak.
    async fn abort_spawned(&mut self, name: &str) {
        if let Some(process) = self.process.as_mut() {
            if let Err(err) = process.kill().await {
                warn!(
                    instance = %name,
                    error = %err,
                    "failed to kill instance after aborted bring-up"
                );
            }
        }
    }

    async fn transition(&self, state: InstanceState) {
        {
            let mut desc = self.descriptor.lock().unwrap_or_else(|e| e.into_inner());
            desc.state = state;
        }
        persist_descriptor(&self.ctx.store, &self.descriptor, "state transition").await;
    }
}

/// Best-effort descriptor write: store failures are telemetry losses, logged
/// and never retried.
pub(crate) async fn persist_descriptor(
    store: &Arc<dyn DescriptorStore>,
    descriptor: &Arc<Mutex<InstanceDescriptor>>,
    what: &str,
) {
    let snapshot = descriptor
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .clone();
    if let Err(err) = store.put_descriptor(&snapshot).await {
        warn!(instance = %snapshot.name, error = %err, "store write failed ({what})");
    }
}

// src/instance/backend.rs

//! Pluggable process-spawning backend.
//!
//! The monitor talks to a `ProcessBackend` instead of `tokio::process`
//! directly. Production uses [`RedisProcessBackend`]; tests provide a fake
//! that hands out scripted process handles.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::debug;

use crate::descriptor::HostPort;
use crate::errors::{AgentError, Result};

/// What to spawn: one instance bound to `port`, optionally replicating from
/// `replica_of`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnPlan {
    pub name: String,
    pub port: u16,
    pub replica_of: Option<HostPort>,
}

/// Terminal result of a process, as seen by the exit classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    pub success: bool,
    pub code: Option<i32>,
}

impl ProcessExit {
    /// A clean, zero-status exit.
    pub fn clean(&self) -> bool {
        self.success
    }

    /// An exit forced by a termination signal (no exit code).
    pub fn killed() -> Self {
        Self {
            success: false,
            code: None,
        }
    }
}

/// Handle to one spawned instance process.
#[async_trait]
pub trait InstanceProcess: Send + Sync {
    /// OS pid, if the process is (or was) alive.
    fn pid(&self) -> Option<u32>;

    /// Wait for the process to exit.
    async fn wait(&mut self) -> Result<ProcessExit>;

    /// Send a hard termination signal. Safe to call on an already-dead
    /// process.
    async fn kill(&mut self) -> Result<()>;
}

/// Trait abstracting how instance processes are spawned.
#[async_trait]
pub trait ProcessBackend: Send + Sync {
    async fn spawn(&self, plan: &SpawnPlan) -> Result<Box<dyn InstanceProcess>>;
}

/// Production backend: spawns `redis-server` on the plan's port, with
/// `--replicaof` when the plan names an upstream.
pub struct RedisProcessBackend {
    bin: String,
}

impl RedisProcessBackend {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }
}

#[async_trait]
impl ProcessBackend for RedisProcessBackend {
    async fn spawn(&self, plan: &SpawnPlan) -> Result<Box<dyn InstanceProcess>> {
        let mut cmd = Command::new(&self.bin);
        cmd.arg("--port").arg(plan.port.to_string());
        if let Some(upstream) = &plan.replica_of {
            cmd.arg("--replicaof")
                .arg(&upstream.host)
                .arg(upstream.port.to_string());
        }
        cmd.stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            AgentError::SpawnFailure(format!(
                "spawning '{}' for instance '{}': {e}",
                self.bin, plan.name
            ))
        })?;

        drain_output(&mut child, &plan.name);

        Ok(Box::new(RedisProcess { child }))
    }
}

/// Consume stdout/stderr so pipe buffers don't fill; log at debug.
fn drain_output(child: &mut Child, name: &str) {
    if let Some(stdout) = child.stdout.take() {
        let instance = name.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(instance = %instance, "stdout: {}", line);
            }
        });
    }
    if let Some(stderr) = child.stderr.take() {
        let instance = name.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(instance = %instance, "stderr: {}", line);
            }
        });
    }
}

struct RedisProcess {
    child: Child,
}

#[async_trait]
impl InstanceProcess for RedisProcess {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    async fn wait(&mut self) -> Result<ProcessExit> {
        let status = self.child.wait().await?;
        Ok(ProcessExit {
            success: status.success(),
            code: status.code(),
        })
    }

    async fn kill(&mut self) -> Result<()> {
        self.child.kill().await?;
        Ok(())
    }
}

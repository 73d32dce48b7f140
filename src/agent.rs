// src/agent.rs

//! Orchestrator-facing event loop.
//!
//! The orchestrator's driver layer (external) feeds [`OrchestratorEvent`]s
//! into an mpsc channel; the agent dispatches them to the supervisor. Launch
//! and kill handling never block this loop (supervision runs in per-task
//! spawned units), so the dispatch path stays responsive no matter how slow
//! an individual bring-up is.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::errors::Result;
use crate::supervisor::TaskSupervisor;

/// Callbacks delivered by the orchestrator.
#[derive(Debug, Clone)]
pub enum OrchestratorEvent {
    /// The agent registered with the orchestrator.
    Registered,
    /// Launch one instance for `task_id` with the scheduler's payload
    /// (`"<capacity> <role> [<upstream>]"`).
    Launch { task_id: String, payload: String },
    /// Force-kill the instance for `task_id`.
    Kill { task_id: String },
    /// Free-form framework message.
    Message(String),
    /// Orchestrator-side error report.
    Error(String),
    /// Stop the agent event loop.
    Shutdown,
}

pub struct Agent {
    supervisor: Arc<TaskSupervisor>,
    events: mpsc::Receiver<OrchestratorEvent>,
}

impl Agent {
    pub fn new(supervisor: Arc<TaskSupervisor>, events: mpsc::Receiver<OrchestratorEvent>) -> Self {
        Self { supervisor, events }
    }

    /// Main event loop. Exits on `Shutdown` or when the event channel
    /// closes.
    pub async fn run(mut self) -> Result<()> {
        info!("agent event loop started");

        while let Some(event) = self.events.recv().await {
            debug!(?event, "agent received event");
            match event {
                OrchestratorEvent::Registered => {
                    info!("registered with orchestrator");
                }
                OrchestratorEvent::Launch { task_id, payload } => {
                    self.supervisor.launch(&task_id, &payload);
                }
                OrchestratorEvent::Kill { task_id } => {
                    self.supervisor.kill(&task_id);
                }
                OrchestratorEvent::Message(message) => {
                    info!(message = %message, "framework message");
                }
                OrchestratorEvent::Error(message) => {
                    error!(message = %message, "orchestrator reported an error");
                }
                OrchestratorEvent::Shutdown => {
                    info!(
                        active = self.supervisor.active_tasks(),
                        "shutdown requested; agent event loop exiting"
                    );
                    break;
                }
            }
        }

        info!("agent event loop finished");
        Ok(())
    }
}

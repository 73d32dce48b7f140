// src/lib.rs

pub mod agent;
pub mod cli;
pub mod config;
pub mod context;
pub mod descriptor;
pub mod errors;
pub mod instance;
pub mod logging;
pub mod monitor;
pub mod store;
pub mod supervisor;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::info;

use crate::agent::{Agent, OrchestratorEvent};
use crate::cli::CliArgs;
use crate::context::AgentContext;
use crate::supervisor::{LogStatusSink, TaskSupervisor};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading (file + CLI overrides)
/// - the distributed store (fatal if the backend can't be set up)
/// - the agent context passed to supervisor and monitors
/// - the orchestrator event loop
/// - Ctrl-C handling
///
/// The orchestrator driver layer is external; it integrates by feeding
/// [`OrchestratorEvent`]s into the channel created here.
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = config::load(&args)?;

    // Store setup failure is unrecoverable at agent init.
    let store = store::open(&cfg.store)?;
    info!(backend = %cfg.store.backend, "descriptor store ready");

    let ctx = Arc::new(AgentContext::production(&cfg, store));
    info!(
        host_ip = %ctx.host_ip,
        base_port = ctx.base_port,
        "agent context initialised"
    );

    let (event_tx, event_rx) = mpsc::channel::<OrchestratorEvent>(64);

    // Ctrl-C → graceful shutdown of the event loop.
    {
        let tx = event_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            let _ = tx.send(OrchestratorEvent::Shutdown).await;
        });
    }

    let supervisor = Arc::new(TaskSupervisor::new(ctx, Arc::new(LogStatusSink)));
    let agent = Agent::new(supervisor, event_rx);
    agent.run().await?;
    Ok(())
}

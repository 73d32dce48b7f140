// src/supervisor.rs

//! Task-level lifecycle glue.
//!
//! The [`TaskSupervisor`] bridges orchestrator callbacks to instance
//! monitors: it parses launch payloads, assigns ports, keeps a registry of
//! live tasks, runs one supervision unit per task, and reports status
//! transitions back through a [`StatusSink`]: `RUNNING`/`ERROR` once for the
//! launch outcome and `FINISHED`/`FAILED` once for the terminal outcome.
//!
//! Launch and kill may arrive concurrently from the orchestrator, so the
//! registry is mutex-guarded and the launch counter is atomic. Neither call
//! blocks on the supervised process: all waiting happens inside the per-task
//! supervision unit.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::context::AgentContext;
use crate::descriptor::{InstanceState, LaunchSpec, MAILBOX_SHUTDOWN};
use crate::monitor::{persist_descriptor, InstanceMonitor};

/// Task status as reported to the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Running,
    Error,
    Finished,
    Failed,
}

/// Where status updates go. Production logs them for the driver layer; tests
/// record them.
pub trait StatusSink: Send + Sync {
    fn report(&self, task_id: &str, state: TaskState);
}

/// Default sink: structured log lines.
#[derive(Debug, Default)]
pub struct LogStatusSink;

impl StatusSink for LogStatusSink {
    fn report(&self, task_id: &str, state: TaskState) {
        info!(task = %task_id, state = ?state, "status update");
    }
}

struct TaskHandle {
    kill_tx: mpsc::Sender<()>,
}

type Registry = Arc<Mutex<HashMap<String, TaskHandle>>>;

pub struct TaskSupervisor {
    ctx: Arc<AgentContext>,
    sink: Arc<dyn StatusSink>,
    registry: Registry,
    launch_index: AtomicU32,
}

impl TaskSupervisor {
    pub fn new(ctx: Arc<AgentContext>, sink: Arc<dyn StatusSink>) -> Self {
        Self {
            ctx,
            sink,
            registry: Arc::new(Mutex::new(HashMap::new())),
            launch_index: AtomicU32::new(0),
        }
    }

    /// Number of currently registered tasks.
    pub fn active_tasks(&self) -> usize {
        self.registry.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Handle a launch request. Parsing, registration and port assignment
    /// happen inline; everything that can block runs in a spawned
    /// supervision unit. Reports `ERROR` for payloads that fail validation.
    pub fn launch(&self, task_id: &str, payload: &str) {
        info!(task = %task_id, payload = %payload, "launch requested");

        let spec = match LaunchSpec::parse(payload) {
            Ok(spec) => spec,
            Err(err) => {
                warn!(task = %task_id, error = %err, "rejecting launch");
                self.sink.report(task_id, TaskState::Error);
                return;
            }
        };

        let (kill_tx, kill_rx) = mpsc::channel(1);
        {
            let mut registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
            if registry.contains_key(task_id) {
                warn!(task = %task_id, "task id already registered; rejecting launch");
                self.sink.report(task_id, TaskState::Error);
                return;
            }
            registry.insert(task_id.to_string(), TaskHandle { kill_tx });
        }

        let index = self.launch_index.fetch_add(1, Ordering::SeqCst) + 1;
        let port = self.ctx.base_port.saturating_add(index as u16);
        debug!(task = %task_id, port, launched = index, "instance registered");

        let monitor = InstanceMonitor::new(Arc::clone(&self.ctx), task_id, &spec, port);
        tokio::spawn(supervise(
            task_id.to_string(),
            monitor,
            kill_rx,
            Arc::clone(&self.ctx),
            Arc::clone(&self.sink),
            Arc::clone(&self.registry),
        ));
    }

    /// Deliver a forced-kill signal to a task's process. Emits no status
    /// update; the supervision unit classifies the resulting exit.
    pub fn kill(&self, task_id: &str) {
        let kill_tx = {
            let registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
            registry.get(task_id).map(|handle| handle.kill_tx.clone())
        };
        match kill_tx {
            Some(kill_tx) => {
                if kill_tx.try_send(()).is_err() {
                    debug!(task = %task_id, "kill already pending or task exiting");
                }
                info!(task = %task_id, "kill signal delivered");
            }
            None => warn!(task = %task_id, "kill requested for unknown task id"),
        }
    }
}

/// One task's supervision unit: bring the instance up, report the launch
/// outcome, run the poll loop, wait for the process to exit (or be killed),
/// classify, and report the terminal outcome exactly once.
async fn supervise(
    task_id: String,
    mut monitor: InstanceMonitor,
    mut kill_rx: mpsc::Receiver<()>,
    ctx: Arc<AgentContext>,
    sink: Arc<dyn StatusSink>,
    registry: Registry,
) {
    match monitor.start().await {
        Ok(()) => sink.report(&task_id, TaskState::Running),
        Err(err) => {
            warn!(task = %task_id, error = %err, "instance bring-up failed");
            sink.report(&task_id, TaskState::Error);
            deregister(&registry, &task_id);
            return;
        }
    }

    let descriptor = monitor.descriptor();
    let stop_tx = monitor.stop_handle();
    let _poll_loop = monitor.spawn_poll_loop();
    let Some(mut process) = monitor.take_process() else {
        warn!(task = %task_id, "started instance has no process handle");
        deregister(&registry, &task_id);
        return;
    };

    let exit = tokio::select! {
        exit = process.wait() => exit,
        _ = kill_rx.recv() => {
            info!(task = %task_id, "forced kill requested");
            if let Err(err) = process.kill().await {
                warn!(task = %task_id, error = %err, "failed to kill instance process");
            }
            process.wait().await
        }
    };

    let clean = match exit {
        Ok(exit) => {
            info!(task = %task_id, code = ?exit.code, "instance process exited");
            exit.clean()
        }
        Err(err) => {
            warn!(task = %task_id, error = %err, "failed to reap instance process");
            false
        }
    };

    // FINISHED only for a clean exit during a scheduler-requested shutdown;
    // everything else (crash, kill, non-zero exit) is FAILED.
    let mailbox = {
        let desc = descriptor.lock().unwrap_or_else(|e| e.into_inner());
        desc.mailbox.clone()
    };
    let terminal = if clean && mailbox == MAILBOX_SHUTDOWN {
        TaskState::Finished
    } else {
        TaskState::Failed
    };

    if terminal == TaskState::Failed {
        // A graceful stop winds the poll loop down itself; every other exit
        // must stop it here.
        let _ = stop_tx.try_send(());
    }

    {
        let mut desc = descriptor.lock().unwrap_or_else(|e| e.into_inner());
        desc.state = match terminal {
            TaskState::Finished => InstanceState::Finished,
            _ => InstanceState::Failed,
        };
    }
    persist_descriptor(&ctx.store, &descriptor, "terminal transition").await;

    deregister(&registry, &task_id);
    sink.report(&task_id, terminal);
}

fn deregister(registry: &Registry, task_id: &str) {
    registry
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .remove(task_id);
}

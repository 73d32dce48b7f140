//! Fake implementations of the agent's pluggable seams.
//!
//! - [`FakeBackend`] records spawn plans and hands out processes whose exits
//!   the test controls.
//! - [`FakeControl`] records control commands and scripts shutdown/info
//!   outcomes.
//! - [`ScriptedReadiness`] queues readiness verdicts and counts checks.
//! - [`RecordingSink`] forwards status updates to the test over a channel.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use redfleet::descriptor::InstanceAddress;
use redfleet::errors::{AgentError, Result};
use redfleet::instance::{
    ControlChannel, ControlFactory, InstanceProcess, ProcessBackend, ProcessExit,
    ReadinessChecker, SpawnPlan,
};
use redfleet::supervisor::{StatusSink, TaskState};

/// Fake process backend.
#[derive(Clone, Default)]
pub struct FakeBackend {
    state: Arc<Mutex<FakeBackendState>>,
}

#[derive(Default)]
struct FakeBackendState {
    next_pid: u32,
    plans: Vec<SpawnPlan>,
    exits: HashMap<String, mpsc::UnboundedSender<ProcessExit>>,
    kills: Vec<String>,
    fail_next: bool,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next spawn fail with `SpawnFailure`.
    pub fn fail_next_spawn(&self) {
        self.state.lock().unwrap().fail_next = true;
    }

    /// Spawn plans seen so far, in order.
    pub fn plans(&self) -> Vec<SpawnPlan> {
        self.state.lock().unwrap().plans.clone()
    }

    /// Instance names that received a kill signal, in order.
    pub fn kills(&self) -> Vec<String> {
        self.state.lock().unwrap().kills.clone()
    }

    /// Make the fake process for `name` exit with the given status.
    pub fn send_exit(&self, name: &str, exit: ProcessExit) {
        let sender = self.state.lock().unwrap().exits.get(name).cloned();
        if let Some(sender) = sender {
            let _ = sender.send(exit);
        }
    }
}

#[async_trait]
impl ProcessBackend for FakeBackend {
    async fn spawn(&self, plan: &SpawnPlan) -> Result<Box<dyn InstanceProcess>> {
        let mut state = self.state.lock().unwrap();
        if state.fail_next {
            state.fail_next = false;
            return Err(AgentError::SpawnFailure(format!(
                "scripted spawn failure for '{}'",
                plan.name
            )));
        }
        state.next_pid += 1;
        let pid = 1000 + state.next_pid;
        state.plans.push(plan.clone());

        let (exit_tx, exit_rx) = mpsc::unbounded_channel();
        state.exits.insert(plan.name.clone(), exit_tx.clone());

        Ok(Box::new(FakeProcess {
            name: plan.name.clone(),
            pid,
            exit_tx,
            exit_rx,
            shared: Arc::clone(&self.state),
        }))
    }
}

struct FakeProcess {
    name: String,
    pid: u32,
    exit_tx: mpsc::UnboundedSender<ProcessExit>,
    exit_rx: mpsc::UnboundedReceiver<ProcessExit>,
    shared: Arc<Mutex<FakeBackendState>>,
}

#[async_trait]
impl InstanceProcess for FakeProcess {
    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }

    async fn wait(&mut self) -> Result<ProcessExit> {
        match self.exit_rx.recv().await {
            Some(exit) => Ok(exit),
            None => Ok(ProcessExit::killed()),
        }
    }

    async fn kill(&mut self) -> Result<()> {
        self.shared.lock().unwrap().kills.push(self.name.clone());
        let _ = self.exit_tx.send(ProcessExit::killed());
        Ok(())
    }
}

/// Fake control channel shared by every instance a test launches.
#[derive(Default)]
pub struct FakeControl {
    state: Mutex<FakeControlState>,
}

#[derive(Default)]
struct FakeControlState {
    commands: Vec<String>,
    shutdown_verdicts: VecDeque<bool>,
    info_failures: u32,
}

impl FakeControl {
    /// Control commands issued so far ("ping", "info <section>", "shutdown",
    /// "promote"), in order.
    pub fn commands(&self) -> Vec<String> {
        self.state.lock().unwrap().commands.clone()
    }

    pub fn command_count(&self) -> usize {
        self.state.lock().unwrap().commands.len()
    }

    /// Script the next shutdown attempt to fail.
    pub fn script_shutdown_failure(&self) {
        self.state
            .lock()
            .unwrap()
            .shutdown_verdicts
            .push_back(false);
    }

    /// Make the next `n` info calls fail.
    pub fn script_info_failures(&self, n: u32) {
        self.state.lock().unwrap().info_failures = n;
    }
}

#[async_trait]
impl ControlChannel for FakeControl {
    async fn ping(&self) -> Result<()> {
        self.state.lock().unwrap().commands.push("ping".to_string());
        Ok(())
    }

    async fn info(&self, section: &str) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.commands.push(format!("info {section}"));
        if state.info_failures > 0 {
            state.info_failures -= 1;
            return Err(AgentError::Control(format!(
                "scripted info failure for section '{section}'"
            )));
        }
        Ok(format!("# {section}\r\nfake_metric:1\r\n"))
    }

    async fn shutdown(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.commands.push("shutdown".to_string());
        if state.shutdown_verdicts.pop_front().unwrap_or(true) {
            Ok(())
        } else {
            Err(AgentError::GracefulStop(
                "scripted shutdown failure".to_string(),
            ))
        }
    }

    async fn promote(&self) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .commands
            .push("promote".to_string());
        Ok(())
    }
}

/// Factory handing every instance the same shared [`FakeControl`].
pub struct FakeControlFactory {
    pub control: Arc<FakeControl>,
}

impl ControlFactory for FakeControlFactory {
    fn channel_for(&self, _addr: &InstanceAddress) -> Arc<dyn ControlChannel> {
        Arc::clone(&self.control) as Arc<dyn ControlChannel>
    }
}

/// Readiness checker with queued verdicts and a check counter.
pub struct ScriptedReadiness {
    verdicts: Mutex<VecDeque<bool>>,
    checks: AtomicU32,
    default_verdict: bool,
}

impl ScriptedReadiness {
    /// Ready unless scripted otherwise.
    pub fn ready() -> Self {
        Self {
            verdicts: Mutex::new(VecDeque::new()),
            checks: AtomicU32::new(0),
            default_verdict: true,
        }
    }

    /// Never ready (until scripted verdicts say so).
    pub fn never_ready() -> Self {
        Self {
            default_verdict: false,
            ..Self::ready()
        }
    }

    /// Queue verdicts consumed before the default applies.
    pub fn push_verdicts(&self, verdicts: &[bool]) {
        self.verdicts.lock().unwrap().extend(verdicts.iter().copied());
    }

    /// How many times the predicate has been polled.
    pub fn checks(&self) -> u32 {
        self.checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReadinessChecker for ScriptedReadiness {
    async fn is_synced(&self, _control: &dyn ControlChannel) -> Result<bool> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        let next = self.verdicts.lock().unwrap().pop_front();
        Ok(next.unwrap_or(self.default_verdict))
    }
}

/// Status sink forwarding every update to the test.
pub struct RecordingSink {
    tx: mpsc::UnboundedSender<(String, TaskState)>,
}

impl RecordingSink {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<(String, TaskState)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

impl StatusSink for RecordingSink {
    fn report(&self, task_id: &str, state: TaskState) {
        let _ = self.tx.send((task_id.to_string(), state));
    }
}

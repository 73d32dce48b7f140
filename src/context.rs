// src/context.rs

//! Shared agent context.
//!
//! One `AgentContext` is constructed at startup and handed to the supervisor
//! and every monitor it creates. All cross-component dependencies (store
//! handle, process backend, control factory, readiness checker) travel
//! through it; there is no package-level shared state.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{AgentConfig, ReadinessKind};
use crate::config::loader::detect_host_ip;
use crate::instance::{
    AlwaysReady, ControlFactory, LinkStatusReady, ProcessBackend, ReadinessChecker,
    ReadinessPolicy, RedisProcessBackend, RespControlFactory,
};
use crate::monitor::PollTiming;
use crate::store::DescriptorStore;

pub struct AgentContext {
    pub store: Arc<dyn DescriptorStore>,
    pub backend: Arc<dyn ProcessBackend>,
    pub control: Arc<dyn ControlFactory>,
    pub readiness: Arc<dyn ReadinessChecker>,
    pub readiness_policy: ReadinessPolicy,
    pub timing: PollTiming,
    /// IP the launched instances advertise in their descriptors.
    pub host_ip: String,
    /// Ports are assigned as `base_port + launch_index`.
    pub base_port: u16,
}

impl AgentContext {
    /// Build the production context: real process backend, RESP control
    /// channels, and the readiness checker selected in the config.
    pub fn production(cfg: &AgentConfig, store: Arc<dyn DescriptorStore>) -> Self {
        let readiness: Arc<dyn ReadinessChecker> = match cfg.replication.readiness {
            ReadinessKind::Always => Arc::new(AlwaysReady),
            ReadinessKind::LinkStatus => Arc::new(LinkStatusReady),
        };
        let host_ip = cfg
            .instance
            .host_ip
            .clone()
            .unwrap_or_else(detect_host_ip);

        Self {
            store,
            backend: Arc::new(RedisProcessBackend::new(cfg.instance.redis_bin.clone())),
            control: Arc::new(RespControlFactory),
            readiness,
            readiness_policy: ReadinessPolicy {
                interval: Duration::from_millis(cfg.replication.check_interval_ms),
                max_checks: cfg.replication.max_checks,
            },
            timing: PollTiming::default(),
            host_ip,
            base_port: cfg.instance.base_port,
        }
    }
}

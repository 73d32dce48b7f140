// src/config/model.rs

use serde::Deserialize;

use crate::errors::{AgentError, Result};

/// Top-level config file model. Every section and field has a default, so an
/// empty (or absent) file is a valid configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub store: StoreConfig,
    pub instance: InstanceConfig,
    pub replication: ReplicationConfig,
}

impl AgentConfig {
    /// Basic sanity checks, run after CLI overrides are applied.
    pub fn validate(&self) -> Result<()> {
        if self.store.backend.is_empty() {
            return Err(AgentError::Config("store.backend must not be empty".into()));
        }
        if self.instance.base_port < 1024 {
            return Err(AgentError::Config(format!(
                "instance.base_port must be >= 1024, got {}",
                self.instance.base_port
            )));
        }
        if self.replication.max_checks == 0 {
            return Err(AgentError::Config(
                "replication.max_checks must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

/// `[store]`: which distributed store backend holds the descriptors.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: String,
    pub endpoint: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            endpoint: String::new(),
        }
    }
}

/// `[instance]`: how store-processes are spawned and addressed.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InstanceConfig {
    /// Binary to spawn for each instance.
    pub redis_bin: String,
    /// Ports are assigned as `base_port + launch_index`.
    pub base_port: u16,
    /// IP advertised in descriptors; auto-detected when unset.
    pub host_ip: Option<String>,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            redis_bin: "redis-server".to_string(),
            base_port: 6379,
            host_ip: None,
        }
    }
}

/// `[replication]`: replica bring-up readiness polling.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    pub readiness: ReadinessKind,
    pub check_interval_ms: u64,
    pub max_checks: u32,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            readiness: ReadinessKind::Always,
            check_interval_ms: 1000,
            max_checks: 600,
        }
    }
}

/// Which readiness predicate replica bring-up polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReadinessKind {
    /// Baseline stub: every replica is immediately considered synced.
    Always,
    /// Probe `INFO replication` for an established upstream link.
    LinkStatus,
}

// src/descriptor.rs

//! Persisted description of one store-process instance.
//!
//! An [`InstanceDescriptor`] is the record the agent keeps in the distributed
//! store for every Redis instance it runs: identity, replication role,
//! network address, runtime state, last stats snapshot, and the mailbox field
//! the scheduler uses as a one-way command channel.
//!
//! The launch payload sent by the scheduler
//! (`"<capacity> <Master|SlaveOf|Master-SlaveOf> [host:port]"`) is parsed
//! exactly once, at the orchestration boundary, into a [`LaunchSpec`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::AgentError;

/// Scheduler-written mailbox command requesting a graceful stop.
pub const MAILBOX_SHUTDOWN: &str = "SHUTDOWN";

/// Agent-written mailbox acknowledgment that a graceful stop failed.
pub const MAILBOX_SHUTDOWN_ERROR: &str = "SHUTDOWN_ERROR";

/// Replication role of an instance.
///
/// A `PromotedReplica` starts life as a replica, syncs from its upstream, and
/// is then commanded to act as a primary (used for capacity scale-ups).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Primary,
    Replica,
    PromotedReplica,
}

impl Role {
    /// Whether this role replicates from an upstream at startup.
    pub fn replicates_at_start(self) -> bool {
        !matches!(self, Role::Primary)
    }
}

/// Runtime state of an instance, as visible to the scheduler.
///
/// Normal progression is monotonic:
/// Pending → Starting → Running → {Stopping → Finished} | Failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
    Pending,
    Starting,
    Running,
    Stopping,
    Finished,
    Failed,
}

/// A `host:port` upstream address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostPort {
    pub host: String,
    pub port: u16,
}

impl FromStr for HostPort {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| AgentError::InvalidSpec(format!("expected host:port, got '{s}'")))?;
        if host.is_empty() {
            return Err(AgentError::InvalidSpec(format!(
                "empty host in upstream address '{s}'"
            )));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| AgentError::InvalidSpec(format!("invalid port in '{s}'")))?;
        Ok(HostPort {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for HostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// The address assigned to a running instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceAddress {
    pub ip: String,
    pub port: u16,
}

impl fmt::Display for InstanceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Last-collected stats snapshot, one blob per INFO section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceStats {
    pub memory: String,
    pub cpu: String,
    pub others: String,
}

/// The persisted record for one instance, keyed by `name` in the store.
///
/// Owned in memory by exactly one monitor at a time; the store copy is the
/// shared, eventually-consistent view the scheduler reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceDescriptor {
    pub name: String,
    pub capacity: u64,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replica_of: Option<HostPort>,
    pub state: InstanceState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<InstanceAddress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<InstanceStats>,
    #[serde(default)]
    pub mailbox: String,
}

impl InstanceDescriptor {
    /// Create a fresh Pending descriptor from a parsed launch spec.
    pub fn from_spec(name: &str, spec: &LaunchSpec) -> Self {
        Self {
            name: name.to_string(),
            capacity: spec.capacity,
            role: spec.role,
            replica_of: spec.replica_of.clone(),
            state: InstanceState::Pending,
            address: None,
            os_pid: None,
            stats: None,
            mailbox: String::new(),
        }
    }
}

/// A validated launch payload.
///
/// - `"<capacity> Master"` → a standalone primary
/// - `"<capacity> SlaveOf <host:port>"` → a replica of the given upstream
/// - `"<capacity> Master-SlaveOf <host:port>"` → a replica that is promoted
///   to primary once it has caught up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub capacity: u64,
    pub role: Role,
    pub replica_of: Option<HostPort>,
}

impl LaunchSpec {
    /// Parse a scheduler launch payload. Malformed payloads fail here, before
    /// any process is spawned.
    pub fn parse(payload: &str) -> Result<Self, AgentError> {
        let tokens: Vec<&str> = payload.split_whitespace().collect();

        let (capacity_str, role_str) = match tokens.as_slice() {
            [cap, role] | [cap, role, _] => (*cap, *role),
            _ => {
                return Err(AgentError::InvalidSpec(format!(
                    "expected 2 or 3 tokens, got {} in '{payload}'",
                    tokens.len()
                )));
            }
        };

        let capacity = capacity_str.parse::<u64>().map_err(|_| {
            AgentError::InvalidSpec(format!("invalid capacity '{capacity_str}'"))
        })?;

        let role = match role_str {
            "Master" => Role::Primary,
            "SlaveOf" => Role::Replica,
            "Master-SlaveOf" => Role::PromotedReplica,
            other => {
                return Err(AgentError::InvalidSpec(format!(
                    "unknown role keyword '{other}'"
                )));
            }
        };

        let replica_of = if role.replicates_at_start() {
            let upstream = tokens.get(2).ok_or_else(|| {
                AgentError::InvalidSpec(format!(
                    "role '{role_str}' requires an upstream address"
                ))
            })?;
            Some(upstream.parse::<HostPort>()?)
        } else {
            if tokens.len() == 3 {
                return Err(AgentError::InvalidSpec(
                    "'Master' takes no upstream address".to_string(),
                ));
            }
            None
        };

        Ok(LaunchSpec {
            capacity,
            role,
            replica_of,
        })
    }
}

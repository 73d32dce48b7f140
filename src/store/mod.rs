// src/store/mod.rs

//! Distributed store interface.
//!
//! The store is the control channel between the central scheduler and the
//! per-node agents: descriptors, stats snapshots, and the command mailbox all
//! live under the instance name as key. It is assumed eventually consistent,
//! with no transactional guarantees across fields, which is why mailbox and
//! stats are separate field-level operations rather than whole-record swaps.
//!
//! Production deployments back this trait with an external store (etcd in the
//! original fleet); in-tree we ship [`MemoryStore`], which is also what the
//! tests run against.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::StoreConfig;
use crate::descriptor::{InstanceDescriptor, InstanceStats};
use crate::errors::{AgentError, Result};

pub use memory::MemoryStore;

/// Durable keyed storage for instance descriptors.
#[async_trait]
pub trait DescriptorStore: Send + Sync {
    /// Persist the full descriptor record under its name.
    async fn put_descriptor(&self, desc: &InstanceDescriptor) -> Result<()>;

    /// Fetch a descriptor record by name.
    async fn get_descriptor(&self, name: &str) -> Result<Option<InstanceDescriptor>>;

    /// Write the mailbox field for an instance.
    async fn put_mailbox(&self, name: &str, message: &str) -> Result<()>;

    /// Read the mailbox field for an instance.
    async fn get_mailbox(&self, name: &str) -> Result<Option<String>>;

    /// Write the stats blob for an instance.
    async fn put_stats(&self, name: &str, stats: &InstanceStats) -> Result<()>;
}

/// Open the store backend named in the config.
///
/// Fatal at agent init: an unknown backend (or a backend that fails its
/// setup) aborts startup.
pub fn open(cfg: &StoreConfig) -> Result<Arc<dyn DescriptorStore>> {
    match cfg.backend.as_str() {
        "memory" => Ok(Arc::new(MemoryStore::new())),
        other => Err(AgentError::StoreInit(format!(
            "unsupported store backend '{other}'"
        ))),
    }
}

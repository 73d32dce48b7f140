// src/store/memory.rs

//! In-memory store backend.
//!
//! Records are held as serialized JSON strings to keep the backend honest
//! about what a durable keyed store can see: writers round-trip through the
//! wire encoding, and field-level mailbox/stats writes never touch the
//! descriptor record.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::descriptor::{InstanceDescriptor, InstanceStats};
use crate::errors::{AgentError, Result};

use super::DescriptorStore;

#[derive(Debug, Default)]
struct StoredRecord {
    descriptor_json: Option<String>,
    mailbox: String,
    stats_json: Option<String>,
}

/// Mutex-guarded keyed storage. Each instance owns a distinct key, so there
/// is no cross-task contention beyond the map lock itself.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, StoredRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the raw stats blob, as the scheduler would.
    pub fn stats_blob(&self, name: &str) -> Option<String> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.get(name).and_then(|r| r.stats_json.clone())
    }

    /// Read the mailbox field without going through the async trait; handy
    /// for synchronous assertions.
    pub fn mailbox_value(&self, name: &str) -> Option<String> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.get(name).map(|r| r.mailbox.clone())
    }
}

#[async_trait]
impl DescriptorStore for MemoryStore {
    async fn put_descriptor(&self, desc: &InstanceDescriptor) -> Result<()> {
        let json = serde_json::to_string(desc)
            .map_err(|e| AgentError::Store(format!("encoding descriptor: {e}")))?;
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.entry(desc.name.clone()).or_default().descriptor_json = Some(json);
        Ok(())
    }

    async fn get_descriptor(&self, name: &str) -> Result<Option<InstanceDescriptor>> {
        let json = {
            let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
            records.get(name).and_then(|r| r.descriptor_json.clone())
        };
        match json {
            Some(json) => {
                let desc = serde_json::from_str(&json)
                    .map_err(|e| AgentError::Store(format!("decoding descriptor: {e}")))?;
                Ok(Some(desc))
            }
            None => Ok(None),
        }
    }

    async fn put_mailbox(&self, name: &str, message: &str) -> Result<()> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.entry(name.to_string()).or_default().mailbox = message.to_string();
        Ok(())
    }

    async fn get_mailbox(&self, name: &str) -> Result<Option<String>> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        Ok(records.get(name).map(|r| r.mailbox.clone()))
    }

    async fn put_stats(&self, name: &str, stats: &InstanceStats) -> Result<()> {
        let json = serde_json::to_string(stats)
            .map_err(|e| AgentError::Store(format!("encoding stats: {e}")))?;
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.entry(name.to_string()).or_default().stats_json = Some(json);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{InstanceState, LaunchSpec};

    fn descriptor(name: &str) -> InstanceDescriptor {
        let spec = LaunchSpec::parse("256 Master").unwrap();
        InstanceDescriptor::from_spec(name, &spec)
    }

    #[tokio::test]
    async fn descriptor_round_trips() {
        let store = MemoryStore::new();
        let mut desc = descriptor("t1");
        desc.state = InstanceState::Running;

        store.put_descriptor(&desc).await.unwrap();
        let loaded = store.get_descriptor("t1").await.unwrap().unwrap();
        assert_eq!(loaded.name, "t1");
        assert_eq!(loaded.state, InstanceState::Running);

        assert!(store.get_descriptor("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn mailbox_writes_do_not_touch_descriptor() {
        let store = MemoryStore::new();
        store.put_descriptor(&descriptor("t1")).await.unwrap();

        store.put_mailbox("t1", "SHUTDOWN").await.unwrap();
        assert_eq!(
            store.get_mailbox("t1").await.unwrap().as_deref(),
            Some("SHUTDOWN")
        );

        let loaded = store.get_descriptor("t1").await.unwrap().unwrap();
        assert!(loaded.mailbox.is_empty());
    }

    #[tokio::test]
    async fn stats_persist_per_key() {
        let store = MemoryStore::new();
        let stats = InstanceStats {
            memory: "used_memory:100".into(),
            cpu: "used_cpu_sys:1".into(),
            others: "total_connections_received:5".into(),
        };
        store.put_stats("t1", &stats).await.unwrap();
        let blob = store.stats_blob("t1").unwrap();
        assert!(blob.contains("used_memory:100"));
        assert!(store.stats_blob("t2").is_none());
    }
}

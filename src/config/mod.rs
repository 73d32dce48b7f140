// src/config/mod.rs

//! Agent configuration: TOML file (`Redfleet.toml`) with serde defaults,
//! overridden by CLI flags.

pub mod loader;
pub mod model;

pub use loader::{load, load_from_path};
pub use model::{AgentConfig, InstanceConfig, ReadinessKind, ReplicationConfig, StoreConfig};

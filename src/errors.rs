// src/errors.rs

//! Crate-wide error taxonomy and helpers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Invalid launch spec: {0}")]
    InvalidSpec(String),

    #[error("Failed to spawn instance process: {0}")]
    SpawnFailure(String),

    #[error("Replica '{name}' did not finish syncing after {attempts} readiness checks")]
    ReplicationStall { name: String, attempts: u32 },

    #[error("Store operation failed: {0}")]
    Store(String),

    #[error("Store setup failed: {0}")]
    StoreInit(String),

    #[error("Graceful shutdown failed: {0}")]
    GracefulStop(String),

    #[error("Control command failed: {0}")]
    Control(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, AgentError>;

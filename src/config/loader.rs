// src/config/loader.rs

use std::fs;
use std::net::UdpSocket;
use std::path::Path;

use tracing::debug;

use crate::cli::CliArgs;
use crate::config::model::AgentConfig;
use crate::errors::Result;

/// Load a configuration file from a given path.
///
/// This only performs TOML deserialization; semantic validation happens in
/// [`AgentConfig::validate`], which [`load`] runs after CLI overrides.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<AgentConfig> {
    let contents = fs::read_to_string(path.as_ref())?;
    let config: AgentConfig = toml::from_str(&contents)?;
    Ok(config)
}

/// Resolve the effective configuration:
///
/// - Read the TOML file if it exists, otherwise start from defaults.
/// - Apply CLI overrides on top.
/// - Validate the result.
pub fn load(args: &CliArgs) -> Result<AgentConfig> {
    let path = Path::new(&args.config);
    let mut config = if path.exists() {
        load_from_path(path)?
    } else {
        debug!(path = %args.config, "config file not found; using defaults");
        AgentConfig::default()
    };

    if let Some(backend) = &args.store_backend {
        config.store.backend = backend.clone();
    }
    if let Some(endpoint) = &args.store_endpoint {
        config.store.endpoint = endpoint.clone();
    }
    if let Some(host_ip) = &args.host_ip {
        config.instance.host_ip = Some(host_ip.clone());
    }
    if let Some(base_port) = args.base_port {
        config.instance.base_port = base_port;
    }

    config.validate()?;
    Ok(config)
}

/// Pick a non-loopback local IPv4 to advertise in descriptors.
///
/// Uses the routing table via a connected UDP socket; no packets are sent.
/// Falls back to loopback when the host has no route out.
pub fn detect_host_ip() -> String {
    let probed = UdpSocket::bind("0.0.0.0:0").and_then(|socket| {
        socket.connect("8.8.8.8:53")?;
        socket.local_addr()
    });
    match probed {
        Ok(addr) => addr.ip().to_string(),
        Err(_) => "127.0.0.1".to_string(),
    }
}

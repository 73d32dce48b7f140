// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for the `redfleet` agent.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "redfleet",
    version,
    about = "Per-node agent for a Redis database-as-a-service fleet.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Redfleet.toml` in the current working directory. A missing
    /// file is not an error; defaults apply.
    #[arg(long, value_name = "PATH", default_value = "Redfleet.toml")]
    pub config: String,

    /// Store backend name (overrides `[store].backend`).
    #[arg(long, value_name = "NAME")]
    pub store_backend: Option<String>,

    /// Store endpoint (overrides `[store].endpoint`).
    #[arg(long, value_name = "ADDR")]
    pub store_endpoint: Option<String>,

    /// IP advertised for launched instances (overrides `[instance].host_ip`).
    #[arg(long, value_name = "IP")]
    pub host_ip: Option<String>,

    /// First instance port; task N gets base + N (overrides
    /// `[instance].base_port`).
    #[arg(long, value_name = "PORT")]
    pub base_port: Option<u16>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `REDFLEET_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

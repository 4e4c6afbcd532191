// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `labctl`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "labctl",
    version,
    about = "Provision a single-node k3s home-lab host over ssh.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// When omitted, `Labctl.toml` in the current directory is used if it
    /// exists, otherwise the built-in defaults.
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Echo every command before it runs (`+ cmd args`) on stderr.
    #[arg(short, long)]
    pub verbose: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `LABCTL_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Override the host from the config file.
    #[arg(long, value_name = "HOST")]
    pub host: Option<String>,

    /// Run only this step (repeatable). Steps still run in their usual order.
    ///
    /// One of: autopatch, k3s, traefik, postgres, cert-manager, registry.
    #[arg(long = "step", value_name = "NAME")]
    pub steps: Vec<String>,

    /// Give up and kill the running command after this many seconds.
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Print the plan, but don't run any commands.
    #[arg(long)]
    pub dry_run: bool,
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

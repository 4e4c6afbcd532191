// src/lib.rs

pub mod cli;
pub mod config;
pub mod credential;
pub mod errors;
pub mod logging;
pub mod machine;
pub mod memo;
pub mod provision;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::{Config, default_config_path, load_or_default};
use crate::errors::LabError;
use crate::machine::SystemMachine;
use crate::machine::trace::{self, TraceSink};
use crate::provision::{Lab, Provisioner, Step, plan};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - command tracing
/// - the memoized machine chain
/// - Ctrl-C and `--timeout` cancellation
/// - the provisioning sequence
pub async fn run(args: CliArgs) -> Result<()> {
    let config = load_config(&args)?;
    let steps = parse_steps(&args.steps)?;

    if args.verbose {
        trace::set(TraceSink::Stderr);
    }

    let cancel = CancellationToken::new();
    let lab = Lab::new(
        config,
        Arc::new(SystemMachine::with_cancel(cancel.clone())),
    );

    if args.dry_run {
        print_dry_run(&lab, &steps);
        return Ok(());
    }

    // Ctrl-C → kill whatever is running and unwind.
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            warn!("interrupted; cancelling");
            cancel.cancel();
        });
    }

    if let Some(secs) = args.timeout {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            warn!(timeout_secs = secs, "deadline reached; cancelling");
            cancel.cancel();
        });
    }

    info!(host = %lab.config().host, "provisioning");
    let provisioner = Provisioner::new(&lab, lab.config());
    let result = provisioner.run(&steps).await;
    cancel.cancel();
    result
}

fn load_config(args: &CliArgs) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => load_or_default(path, true)?,
        None => load_or_default(default_config_path(), false)?,
    };
    if let Some(host) = &args.host {
        debug!(host = %host, "host overridden on the command line");
        let mut raw = config.into_raw();
        raw.host = host.clone();
        config = Config::try_from(raw)?;
    }
    Ok(config)
}

fn parse_steps(names: &[String]) -> Result<Vec<Step>, LabError> {
    names.iter().map(|name| name.parse()).collect()
}

fn print_dry_run(lab: &Lab, steps: &[Step]) {
    let cfg = lab.config();
    println!("labctl dry-run");
    println!("  host = {}", cfg.host);
    println!();

    println!("machines:");
    for (name, prefix) in lab.describe() {
        println!("  - {name}: {prefix}");
    }
    println!();

    let planned = plan(steps);
    println!("steps ({}):", planned.len());
    for step in planned {
        println!("  - {step}: {}", step.description());
    }

    debug!("dry-run complete (no execution)");
}

// src/provision/lab.rs

//! The production machine chain.
//!
//! ```text
//! base ─ Shell(local) ─┬─ Sub(spkez)                          secrets()
//!                      └─ Sub(ssh -i key host --) ─ Shell ─┬─  remote()
//!                                                          └─ Sub(kubectl)  control()
//! ```
//!
//! Each layer is built on first use and memoized, including failures: a
//! second caller never re-fetches the ssh key or re-runs an install.

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use tracing::info;

use crate::config::Config;
use crate::credential::CredentialFile;
use crate::machine::{BoxFuture, Machine, MachineExt, Shell, Sub};
use crate::memo::Memo;
use crate::provision::Machines;

#[derive(Clone)]
struct Remote {
    shell: Arc<Shell>,
    // Referenced by path from the ssh prefix; removed when the last clone drops.
    _key: Arc<CredentialFile>,
}

pub struct Lab {
    config: Config,
    local: Arc<Shell>,
    secrets: Memo<Arc<dyn Machine>>,
    remote: Memo<Remote>,
    control: Memo<Arc<dyn Machine>>,
}

impl Lab {
    /// Build the chain over `base`, which is the machine that actually runs
    /// local programs (a [`SystemMachine`](crate::machine::SystemMachine) in
    /// production).
    pub fn new(config: Config, base: Arc<dyn Machine>) -> Self {
        let mut local = Shell::from_arc(base);
        for name in &config.local.passthrough {
            local.register_passthrough(name.as_str());
        }
        Self {
            config,
            local: Arc::new(local),
            secrets: Memo::new(),
            remote: Memo::new(),
            control: Memo::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Human-readable prefixes of each layer, for `--dry-run`.
    pub fn describe(&self) -> Vec<(&'static str, String)> {
        let cfg = &self.config;
        let mut ssh = vec![cfg.remote.ssh.clone()];
        ssh.extend(cfg.remote.ssh_args.iter().cloned());
        ssh.extend(["-i".to_string(), "<key>".to_string(), cfg.host.clone(), "--".to_string()]);
        let ssh = ssh.join(" ");
        vec![
            ("secrets", cfg.secrets.cli.clone()),
            ("remote", ssh.clone()),
            ("control", format!("{ssh} {}", cfg.remote.control)),
        ]
    }

    async fn build_secrets(&self) -> Result<Arc<dyn Machine>> {
        let cli = &self.config.secrets.cli;

        match self.local.command(cli, ["--version"]).call().await {
            Ok(_) => {}
            Err(err) if err.is_not_found() => {
                info!(cli = %cli, "secrets CLI not found; installing");
                let (program, args) = self
                    .config
                    .secrets
                    .install
                    .split_first()
                    .ok_or_else(|| anyhow!("no install command for {cli}"))?;
                self.local
                    .command(program, args)
                    .exec()
                    .await
                    .with_context(|| format!("could not install {cli}"))?;
                // Look again exactly once; a second miss is an error.
                self.local
                    .command(cli, ["--version"])
                    .call()
                    .await
                    .with_context(|| format!("could not find {cli} after installing it"))?;
            }
            Err(err) => return Err(err).with_context(|| format!("error checking {cli}")),
        }

        Ok(Arc::new(Sub::new(
            Arc::clone(&self.local),
            cli.as_str(),
            Vec::<String>::new(),
        )))
    }

    async fn build_remote(&self) -> Result<Remote> {
        let secrets = self.secrets().await?;
        let cfg = &self.config;

        let key = secrets
            .command("get", [cfg.secrets.ssh_key.as_str()])
            .get()
            .await
            .context("could not get ssh key")?;
        let key_file = CredentialFile::create(format!("{key}\n").as_bytes())
            .context("could not write ssh key")?;

        let mut args = cfg.remote.ssh_args.clone();
        args.extend([
            "-i".to_string(),
            key_file.path().to_string_lossy().into_owned(),
            cfg.host.clone(),
            "--".to_string(),
        ]);

        // The local shell already traces the full ssh command line.
        let ssh = Sub::new(Arc::clone(&self.local), cfg.remote.ssh.as_str(), args).remote_shell();
        let mut shell = Shell::new(ssh).untraced();
        for name in &cfg.remote.passthrough {
            shell.register_passthrough(name.as_str());
        }

        info!(host = %cfg.host, "remote machine ready");
        Ok(Remote {
            shell: Arc::new(shell),
            _key: Arc::new(key_file),
        })
    }

    async fn build_control(&self) -> Result<Arc<dyn Machine>> {
        let remote = self.remote().await?;
        Ok(Arc::new(Sub::new(
            remote,
            self.config.remote.control.as_str(),
            Vec::<String>::new(),
        )))
    }
}

impl Machines for Lab {
    fn secrets(&self) -> BoxFuture<'_, Result<Arc<dyn Machine>>> {
        Box::pin(self.secrets.get_or_init(|| self.build_secrets()))
    }

    fn remote(&self) -> BoxFuture<'_, Result<Arc<Shell>>> {
        Box::pin(async move {
            let remote = self.remote.get_or_init(|| self.build_remote()).await?;
            Ok(remote.shell)
        })
    }

    fn control(&self) -> BoxFuture<'_, Result<Arc<dyn Machine>>> {
        Box::pin(self.control.get_or_init(|| self.build_control()))
    }
}

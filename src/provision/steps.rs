// src/provision/steps.rs

//! The provisioning sequence.
//!
//! Every step is idempotent: re-running the whole sequence against an
//! unchanged host overwrites files and re-applies manifests. The one
//! non-idempotent create (the registry pull secret) is guarded by an
//! existence check.

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::config::Config;
use crate::errors::ErrorKind;
use crate::machine::{Machine, MachineExt, WriteOptions, pipe, trace};
use crate::provision::manifests::{
    AUTOPATCH_CRON, AUTOPATCH_CRON_PATH, AUTOPATCH_PATH, AUTOPATCH_SCRIPT, CERT_MANAGER_URL,
    CLOUDFLARE_SECRET_KEY, CLOUDFLARE_SECRET_NAME, CNPG_OPERATOR_URL, ISSUER, K3S_INSTALL_URL,
    POSTGRES_CLUSTER, REGISTRY, REGISTRY_AUTH_SECRET_NAME, REGISTRY_PULL_SECRET_NAME,
    TRAEFIK_CONFIG, basic_auth_secret, opaque_secret,
};
use crate::provision::{Machines, Step, plan};

/// Runs provisioning steps against a set of machines.
pub struct Provisioner<'a> {
    machines: &'a dyn Machines,
    config: &'a Config,
}

impl<'a> Provisioner<'a> {
    pub fn new(machines: &'a dyn Machines, config: &'a Config) -> Self {
        Self { machines, config }
    }

    /// Run the selected steps (all when empty) in order, stopping at the
    /// first failure.
    pub async fn run(&self, selected: &[Step]) -> Result<()> {
        for step in plan(selected) {
            info!(step = %step, "running step");
            self.run_step(step).await?;
            info!(step = %step, "step finished");
        }
        Ok(())
    }

    pub async fn run_step(&self, step: Step) -> Result<()> {
        match step {
            Step::Autopatch => self.install_autopatch().await,
            Step::K3s => self
                .update_k3s()
                .await
                .context("failed to install or update k3s"),
            Step::Traefik => self
                .setup_traefik()
                .await
                .context("failed to set up traefik"),
            Step::Postgres => self
                .setup_postgres()
                .await
                .context("failed to set up postgres"),
            Step::CertManager => self
                .setup_cert_manager()
                .await
                .context("failed to set up cert-manager"),
            Step::Registry => self
                .setup_container_registry()
                .await
                .context("failed to set up container registry"),
        }
    }

    pub async fn install_autopatch(&self) -> Result<()> {
        let remote = self.machines.remote().await?;
        remote
            .write_file(
                AUTOPATCH_PATH,
                AUTOPATCH_SCRIPT.as_bytes(),
                WriteOptions::mode(0o755),
            )
            .await
            .context("could not install autopatch")?;
        remote
            .write_file(
                AUTOPATCH_CRON_PATH,
                AUTOPATCH_CRON.as_bytes(),
                WriteOptions::default(),
            )
            .await
            .context("could not install autopatch cron job")?;
        Ok(())
    }

    pub async fn update_k3s(&self) -> Result<()> {
        let remote = self.machines.remote().await?;
        pipe(
            remote.command("curl", ["-sfL", K3S_INSTALL_URL]),
            remote.command("sh", ["-s", "-"]),
        )
        .await
        .context("could not update k3s")?;
        Ok(())
    }

    /// k3s ships traefik; this only applies configuration on top of it.
    pub async fn setup_traefik(&self) -> Result<()> {
        let ctl = self.machines.control().await?;
        apply(&*ctl, TRAEFIK_CONFIG)
            .await
            .context("could not configure traefik")?;
        Ok(())
    }

    pub async fn setup_postgres(&self) -> Result<()> {
        let ctl = self.machines.control().await?;
        ctl.command(
            "apply",
            [
                // Server-side apply: the CRDs are too large for the
                // last-applied annotation.
                "--server-side",
                "--force-conflicts",
                "-f",
                CNPG_OPERATOR_URL,
            ],
        )
        .exec()
        .await
        .context("could not install CNPG")?;
        apply(&*ctl, POSTGRES_CLUSTER)
            .await
            .context("could not install PG cluster")?;
        Ok(())
    }

    pub async fn setup_cert_manager(&self) -> Result<()> {
        let ctl = self.machines.control().await?;
        let secrets = self.machines.secrets().await?;

        ctl.command("apply", ["-f", CERT_MANAGER_URL])
            .exec()
            .await
            .context("could not install cert-manager")?;

        let token = secrets
            .command("get", [self.config.cert_manager.cloudflare_secret.as_str()])
            .get()
            .await
            .context("could not get cloudflare API key")?;
        apply(
            &*ctl,
            &opaque_secret(CLOUDFLARE_SECRET_NAME, CLOUDFLARE_SECRET_KEY, &token),
        )
        .await
        .context("could not store cloudflare secret")?;

        apply(&*ctl, ISSUER)
            .await
            .context("could not create cloudflare issuer")?;
        Ok(())
    }

    pub async fn setup_container_registry(&self) -> Result<()> {
        let ctl = self.machines.control().await?;
        let secrets = self.machines.secrets().await?;
        let registry = &self.config.registry;

        let password = secrets
            .command("get", [registry.auth_secret.as_str()])
            .get()
            .await
            .context("could not get registry auth secret")?;
        apply(
            &*ctl,
            &basic_auth_secret(REGISTRY_AUTH_SECRET_NAME, &registry.username, &password),
        )
        .await
        .context("could not store registry auth secret")?;

        apply(&*ctl, REGISTRY)
            .await
            .context("could not install registry")?;

        let exists = ctl
            .command("get", ["secret", REGISTRY_PULL_SECRET_NAME])
            .capture()
            .exec()
            .await;
        match exists {
            Ok(()) => {
                debug!(secret = REGISTRY_PULL_SECRET_NAME, "pull secret already present");
            }
            Err(err) if err.kind() == ErrorKind::Cancelled => {
                return Err(err).context("could not check registry pull secret");
            }
            Err(err) => {
                // A failed lookup means the secret has to be created.
                debug!(error = %err, "pull secret lookup failed; creating it");
                let _quiet = trace::suppress();
                ctl.command(
                    "create",
                    [
                        "secret".to_string(),
                        "docker-registry".to_string(),
                        REGISTRY_PULL_SECRET_NAME.to_string(),
                        format!("--docker-server={}", registry.server),
                        format!("--docker-username={}", registry.username),
                        format!("--docker-password={password}"),
                    ],
                )
                .exec()
                .await
                .context("could not store registry secret")?;
            }
        }
        Ok(())
    }
}

/// `apply -f -` with `manifest` on stdin.
async fn apply<M: Machine + ?Sized>(ctl: &M, manifest: &str) -> Result<(), crate::errors::MachineError> {
    ctl.command("apply", ["-f", "-"]).stdin(manifest).exec().await
}

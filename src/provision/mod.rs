// src/provision/mod.rs

//! Host provisioning.
//!
//! - [`lab`] builds the machine chain (local shell, secrets CLI, ssh,
//!   kubectl) once per run and memoizes each layer.
//! - [`steps`] is the fixed sequence of provisioning steps, written against
//!   the [`Machines`] trait so tests can hand in mocks.
//! - [`manifests`] holds the static payloads.

pub mod lab;
pub mod manifests;
pub mod steps;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::errors::LabError;
use crate::machine::{BoxFuture, Machine, Shell};

pub use lab::Lab;
pub use steps::Provisioner;

/// Source of the machines provisioning steps run against.
pub trait Machines: Send + Sync {
    /// The secrets CLI, e.g. `spkez`.
    fn secrets(&self) -> BoxFuture<'_, anyhow::Result<Arc<dyn Machine>>>;

    /// A shell on the remote host.
    fn remote(&self) -> BoxFuture<'_, anyhow::Result<Arc<Shell>>>;

    /// The cluster control CLI on the remote host, e.g. `kubectl`.
    fn control(&self) -> BoxFuture<'_, anyhow::Result<Arc<dyn Machine>>>;
}

/// One provisioning step. Steps always run in the order of [`Step::ALL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Step {
    Autopatch,
    K3s,
    Traefik,
    Postgres,
    CertManager,
    Registry,
}

impl Step {
    pub const ALL: [Step; 6] = [
        Step::Autopatch,
        Step::K3s,
        Step::Traefik,
        Step::Postgres,
        Step::CertManager,
        Step::Registry,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Step::Autopatch => "autopatch",
            Step::K3s => "k3s",
            Step::Traefik => "traefik",
            Step::Postgres => "postgres",
            Step::CertManager => "cert-manager",
            Step::Registry => "registry",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Step::Autopatch => "install the OS auto-patch script and cron job",
            Step::K3s => "install or update k3s",
            Step::Traefik => "configure the bundled traefik ingress",
            Step::Postgres => "install the CloudNativePG operator and cluster",
            Step::CertManager => "install cert-manager and the Cloudflare issuer",
            Step::Registry => "install the container registry and pull secret",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Step {
    type Err = LabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Step::ALL
            .into_iter()
            .find(|step| step.name() == wanted)
            .ok_or_else(|| LabError::UnknownStep(s.to_string()))
    }
}

/// The steps to run: all of them when `selected` is empty, otherwise the
/// selected ones in canonical order.
pub fn plan(selected: &[Step]) -> Vec<Step> {
    Step::ALL
        .into_iter()
        .filter(|step| selected.is_empty() || selected.contains(step))
        .collect()
}

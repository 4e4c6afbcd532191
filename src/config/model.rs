// src/config/model.rs

use serde::Deserialize;

/// Configuration as read from a TOML file.
///
/// ```toml
/// host = "k8s.lesiw.dev"
///
/// [secrets]
/// cli = "spkez"
/// install = ["go", "install", "lesiw.io/spkez@latest"]
/// ssh_key = "infra/ssh"
///
/// [remote]
/// ssh = "ssh"
/// control = "kubectl"
/// passthrough = ["sh", "curl", "kubectl"]
///
/// [registry]
/// server = "ctr.lesiw.dev"
/// username = "ll"
/// ```
///
/// Every key is optional; an empty file yields the built-in defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default)]
    pub secrets: SecretsSection,

    #[serde(default)]
    pub local: LocalSection,

    #[serde(default)]
    pub remote: RemoteSection,

    #[serde(default)]
    pub cert_manager: CertManagerSection,

    #[serde(default)]
    pub registry: RegistrySection,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            secrets: SecretsSection::default(),
            local: LocalSection::default(),
            remote: RemoteSection::default(),
            cert_manager: CertManagerSection::default(),
            registry: RegistrySection::default(),
        }
    }
}

fn default_host() -> String {
    "k8s.lesiw.dev".to_string()
}

/// `[secrets]`: the secrets CLI and how to bootstrap it.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SecretsSection {
    /// Program name of the secrets CLI.
    pub cli: String,

    /// Command that installs the CLI when it is not found.
    pub install: Vec<String>,

    /// Secret holding the ssh private key for the host.
    pub ssh_key: String,
}

impl Default for SecretsSection {
    fn default() -> Self {
        Self {
            cli: "spkez".to_string(),
            install: vec![
                "go".to_string(),
                "install".to_string(),
                "lesiw.io/spkez@latest".to_string(),
            ],
            ssh_key: "infra/ssh".to_string(),
        }
    }
}

/// `[local]`: commands run on this machine.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LocalSection {
    /// Programs whose streams are connected live.
    pub passthrough: Vec<String>,
}

impl Default for LocalSection {
    fn default() -> Self {
        Self {
            passthrough: vec!["go".to_string(), "spkez".to_string(), "ssh".to_string()],
        }
    }
}

/// `[remote]`: how the host is reached and driven.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RemoteSection {
    /// Remote shell program.
    pub ssh: String,

    /// Extra arguments placed before `-i <key>`.
    pub ssh_args: Vec<String>,

    /// Cluster control CLI run on the host.
    pub control: String,

    /// Remote programs whose streams are connected live.
    pub passthrough: Vec<String>,
}

impl Default for RemoteSection {
    fn default() -> Self {
        Self {
            ssh: "ssh".to_string(),
            ssh_args: Vec::new(),
            control: "kubectl".to_string(),
            passthrough: vec!["sh".to_string(), "curl".to_string(), "kubectl".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CertManagerSection {
    /// Secret holding the Cloudflare API token.
    pub cloudflare_secret: String,
}

impl Default for CertManagerSection {
    fn default() -> Self {
        Self {
            cloudflare_secret: "k8s/cert-manager/cloudflare".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RegistrySection {
    pub server: String,
    pub username: String,

    /// Secret holding the registry password.
    pub auth_secret: String,
}

impl Default for RegistrySection {
    fn default() -> Self {
        Self {
            server: "ctr.lesiw.dev".to_string(),
            username: "ll".to_string(),
            auth_secret: "ctr.lesiw.dev/auth".to_string(),
        }
    }
}

/// Validated configuration. Build it with `Config::try_from(raw)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub secrets: SecretsSection,
    pub local: LocalSection,
    pub remote: RemoteSection,
    pub cert_manager: CertManagerSection,
    pub registry: RegistrySection,
}

impl Config {
    pub(crate) fn new_unchecked(raw: RawConfig) -> Self {
        Self {
            host: raw.host,
            secrets: raw.secrets,
            local: raw.local,
            remote: raw.remote,
            cert_manager: raw.cert_manager,
            registry: raw.registry,
        }
    }

    pub fn into_raw(self) -> RawConfig {
        RawConfig {
            host: self.host,
            secrets: self.secrets,
            local: self.local,
            remote: self.remote,
            cert_manager: self.cert_manager,
            registry: self.registry,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new_unchecked(RawConfig::default())
    }
}

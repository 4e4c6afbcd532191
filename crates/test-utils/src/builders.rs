#![allow(dead_code)]

use labctl::config::{Config, RawConfig};

/// Builder for `Config` to simplify test setup.
pub struct ConfigBuilder {
    config: RawConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfig::default(),
        }
    }

    pub fn host(mut self, host: &str) -> Self {
        self.config.host = host.to_string();
        self
    }

    pub fn secrets_cli(mut self, cli: &str) -> Self {
        self.config.secrets.cli = cli.to_string();
        self
    }

    pub fn install_command(mut self, argv: &[&str]) -> Self {
        self.config.secrets.install = argv.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn ssh_key_secret(mut self, name: &str) -> Self {
        self.config.secrets.ssh_key = name.to_string();
        self
    }

    pub fn ssh_args(mut self, args: &[&str]) -> Self {
        self.config.remote.ssh_args = args.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn registry_username(mut self, username: &str) -> Self {
        self.config.registry.username = username.to_string();
        self
    }

    pub fn raw(self) -> RawConfig {
        self.config
    }

    pub fn build(self) -> Config {
        Config::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

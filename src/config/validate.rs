// src/config/validate.rs

use crate::config::model::{Config, RawConfig};
use crate::errors::{LabError, Result};

impl TryFrom<RawConfig> for Config {
    type Error = crate::errors::LabError;

    fn try_from(raw: RawConfig) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(Config::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfig) -> Result<()> {
    validate_host(cfg)?;
    validate_programs(cfg)?;
    validate_passthrough("local", &cfg.local.passthrough)?;
    validate_passthrough("remote", &cfg.remote.passthrough)?;
    Ok(())
}

fn validate_host(cfg: &RawConfig) -> Result<()> {
    let host = cfg.host.trim();
    if host.is_empty() {
        return Err(LabError::ConfigError("host must not be empty".to_string()));
    }
    // ssh would read a leading dash as an option.
    if host.starts_with('-') || host.contains(char::is_whitespace) {
        return Err(LabError::ConfigError(format!(
            "host '{}' is not a valid host name",
            cfg.host
        )));
    }
    Ok(())
}

fn validate_programs(cfg: &RawConfig) -> Result<()> {
    let programs = [
        ("[secrets].cli", &cfg.secrets.cli),
        ("[secrets].ssh_key", &cfg.secrets.ssh_key),
        ("[remote].ssh", &cfg.remote.ssh),
        ("[remote].control", &cfg.remote.control),
        ("[registry].username", &cfg.registry.username),
    ];
    for (key, value) in programs {
        if value.trim().is_empty() {
            return Err(LabError::ConfigError(format!("{key} must not be empty")));
        }
    }

    if cfg.secrets.install.first().is_none_or(|p| p.trim().is_empty()) {
        return Err(LabError::ConfigError(
            "[secrets].install must name a program".to_string(),
        ));
    }
    Ok(())
}

fn validate_passthrough(section: &str, names: &[String]) -> Result<()> {
    for name in names {
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(LabError::ConfigError(format!(
                "[{section}].passthrough entry '{name}' is not a program name"
            )));
        }
    }
    Ok(())
}

// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{Config, RawConfig};
use crate::errors::{LabError, Result};

/// Load a configuration file and return the raw `RawConfig`.
///
/// This only performs TOML deserialization; use [`load_and_validate`] for
/// the checked form.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfig = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and validate it.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<Config> {
    let raw_config = load_from_path(&path)?;
    let config = Config::try_from(raw_config)?;
    Ok(config)
}

/// Like [`load_and_validate`], except that a missing file yields the
/// built-in defaults when `explicit` is false. A path the user named must
/// exist.
pub fn load_or_default(path: impl AsRef<Path>, explicit: bool) -> Result<Config> {
    let path = path.as_ref();
    match load_and_validate(path) {
        Err(LabError::IoError(e)) if e.kind() == std::io::ErrorKind::NotFound && !explicit => {
            debug!(path = %path.display(), "no config file; using defaults");
            Ok(Config::default())
        }
        other => other,
    }
}

/// `Labctl.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Labctl.toml")
}

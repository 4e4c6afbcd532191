// src/credential.rs

//! Secret material that has to touch disk, e.g. an ssh private key.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use tempfile::TempPath;
use tracing::debug;

/// A temporary file readable only by its owner, removed when dropped.
#[derive(Debug)]
pub struct CredentialFile {
    path: TempPath,
}

impl CredentialFile {
    pub fn create(contents: &[u8]) -> Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix("labctl-key-")
            .tempfile()
            .context("could not create credential file")?;
        restrict_permissions(file.as_file()).context("could not restrict credential file")?;
        file.write_all(contents)
            .and_then(|()| file.flush())
            .context("could not write credential file")?;

        let path = file.into_temp_path();
        debug!(path = %path.display(), "created credential file");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the file now, reporting failure instead of ignoring it.
    pub fn close(self) -> Result<()> {
        self.path.close().context("could not remove credential file")
    }
}

#[cfg(unix)]
fn restrict_permissions(file: &std::fs::File) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_file: &std::fs::File) -> std::io::Result<()> {
    Ok(())
}

// src/errors.rs

//! Crate-wide error types and helpers.
//!
//! - [`MachineError`] is what the execution layer produces. Its
//!   [`ErrorKind`] lets callers branch on "command not found" versus
//!   "ran and failed".
//! - [`LabError`] covers configuration and application-level failures.
//! - Everything above the execution layer uses `anyhow` with
//!   `.context("could not ...")`; [`kind`] recovers the classification
//!   from such a chain.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Classification of a failed invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The program does not exist on the executing side.
    NotFound,
    /// The program ran and exited nonzero.
    Exit,
    /// The execution or piping machinery failed.
    Io,
    /// The run was cancelled while the command was blocked.
    Cancelled,
}

/// Error produced by a [`Machine`](crate::machine::Machine) invocation.
///
/// Messages name the program but never its arguments, which may carry
/// secrets.
#[derive(Error, Debug)]
pub enum MachineError {
    #[error("{program}: command not found")]
    NotFound { program: String },

    #[error("{program} exited with status {code}{}", stderr_suffix(.stderr))]
    Exit {
        program: String,
        code: i32,
        stderr: String,
    },

    #[error("{program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program}: cancelled")]
    Cancelled { program: String },
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}

impl MachineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MachineError::NotFound { .. } => ErrorKind::NotFound,
            MachineError::Exit { .. } => ErrorKind::Exit,
            MachineError::Io { .. } => ErrorKind::Io,
            MachineError::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    pub fn io(program: impl Into<String>, source: std::io::Error) -> Self {
        MachineError::Io {
            program: program.into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// True for an I/O failure caused by the reading end going away.
    pub fn is_broken_pipe(&self) -> bool {
        matches!(
            self,
            MachineError::Io { source, .. } if source.kind() == std::io::ErrorKind::BrokenPipe
        )
    }

    pub fn program(&self) -> &str {
        match self {
            MachineError::NotFound { program }
            | MachineError::Exit { program, .. }
            | MachineError::Io { program, .. }
            | MachineError::Cancelled { program } => program,
        }
    }
}

#[derive(Error, Debug)]
pub enum LabError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Unknown step: {0}")]
    UnknownStep(String),
}

pub type Result<T> = std::result::Result<T, LabError>;

/// An error cached by [`Memo`](crate::memo::Memo) and handed to every caller.
///
/// Displays like the wrapped error and exposes the same source chain.
#[derive(Clone)]
pub struct SharedError(pub Arc<anyhow::Error>);

impl fmt::Debug for SharedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for SharedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl std::error::Error for SharedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

/// Find the execution-layer classification anywhere in an error chain.
pub fn kind(err: &anyhow::Error) -> Option<ErrorKind> {
    for cause in err.chain() {
        if let Some(machine) = cause.downcast_ref::<MachineError>() {
            return Some(machine.kind());
        }
        if let Some(shared) = cause.downcast_ref::<SharedError>() {
            return kind(&shared.0);
        }
    }
    None
}

pub fn is_not_found(err: &anyhow::Error) -> bool {
    kind(err) == Some(ErrorKind::NotFound)
}

pub fn is_cancelled(err: &anyhow::Error) -> bool {
    kind(err) == Some(ErrorKind::Cancelled)
}

// src/machine/mod.rs

//! Command execution layer.
//!
//! Everything that runs a program goes through a [`Machine`]. Machines
//! compose:
//!
//! - [`system`] runs real processes with `tokio::process::Command`.
//! - [`shell`] wraps a machine with passthrough registration, command
//!   tracing and file helpers.
//! - [`sub`] prefixes every invocation with a fixed argument list, which is
//!   how "run through ssh" and "run kubectl" are expressed.
//! - [`pipe`] connects one invocation's stdout to another's stdin.
//! - [`mock`] records invocations and replays canned output for tests.
//! - [`command`] is the builder used to issue invocations ergonomically.
//! - [`trace`] is the process-wide `+ cmd args` echo, with scoped redaction.

pub mod command;
pub mod mock;
pub mod pipe;
pub mod shell;
pub mod sub;
pub mod system;
pub mod trace;

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::errors::MachineError;

pub use command::{Command, call, exec, get};
pub use mock::{Call, Fallback, MockMachine, Response};
pub use pipe::{pipe, pipe_capturing_output};
pub use shell::{Behavior, FileInfo, Shell, WriteOptions};
pub use sub::{Sub, delegate};
pub use system::SystemMachine;

/// Boxed future returned by [`Machine::invoke`].
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Something that can execute a named command.
///
/// Invocations are independent: implementations must not share mutable
/// buffers between calls, so one machine can serve concurrent callers.
pub trait Machine: Send + Sync {
    fn invoke(&self, inv: Invocation) -> BoxFuture<'_, Result<Output, MachineError>>;
}

impl<M: Machine + ?Sized> Machine for Arc<M> {
    fn invoke(&self, inv: Invocation) -> BoxFuture<'_, Result<Output, MachineError>> {
        (**self).invoke(inv)
    }
}

impl<M: Machine + ?Sized> Machine for Box<M> {
    fn invoke(&self, inv: Invocation) -> BoxFuture<'_, Result<Output, MachineError>> {
        (**self).invoke(inv)
    }
}

/// Where an invocation's stdin comes from.
#[derive(Default)]
pub enum Input {
    /// Empty stdin.
    #[default]
    None,
    /// The caller's own stdin.
    Inherit,
    /// A fixed payload.
    Bytes(Vec<u8>),
    /// A stream, read to EOF.
    Reader(Box<dyn AsyncRead + Send + Unpin>),
}

impl Input {
    pub fn is_none(&self) -> bool {
        matches!(self, Input::None)
    }
}

impl fmt::Debug for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Input::None => f.write_str("None"),
            Input::Inherit => f.write_str("Inherit"),
            Input::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            Input::Reader(_) => f.write_str("Reader(..)"),
        }
    }
}

impl From<Vec<u8>> for Input {
    fn from(bytes: Vec<u8>) -> Self {
        Input::Bytes(bytes)
    }
}

impl From<&[u8]> for Input {
    fn from(bytes: &[u8]) -> Self {
        Input::Bytes(bytes.to_vec())
    }
}

impl From<String> for Input {
    fn from(s: String) -> Self {
        Input::Bytes(s.into_bytes())
    }
}

impl From<&str> for Input {
    fn from(s: &str) -> Self {
        Input::Bytes(s.as_bytes().to_vec())
    }
}

/// Where an invocation's stdout goes.
#[derive(Default)]
pub enum Sink {
    /// The caller has no preference. A [`Shell`] resolves this to
    /// [`Sink::Inherit`] for passthrough commands; everything else captures.
    #[default]
    Default,
    /// Buffer into [`Output::stdout`].
    Capture,
    /// Route live to the caller's own stdout.
    Inherit,
    /// Throw away.
    Null,
    /// Copy into a stream, which is shut down once the program exits.
    Stream(Box<dyn AsyncWrite + Send + Unpin>),
}

impl fmt::Debug for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sink::Default => f.write_str("Default"),
            Sink::Capture => f.write_str("Capture"),
            Sink::Inherit => f.write_str("Inherit"),
            Sink::Null => f.write_str("Null"),
            Sink::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// A single command invocation. Built per call and consumed by `invoke`.
#[derive(Debug, Default)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Input,
    pub stdout: Sink,
    pub env: Vec<(String, String)>,
    pub current_dir: Option<PathBuf>,
}

impl Invocation {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }
}

/// Result of a successful invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Output {
    /// Captured stdout; empty unless the sink was [`Sink::Capture`].
    pub stdout: Vec<u8>,
    /// Captured stderr, kept for diagnostics.
    pub stderr: Vec<u8>,
    pub code: i32,
}

impl Output {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

/// Extension giving every machine the [`Command`] builder.
pub trait MachineExt: Machine {
    fn command<I, S>(&self, program: &str, args: I) -> Command<'_, Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Command::new(self, program, args)
    }
}

impl<M: Machine + ?Sized> MachineExt for M {}

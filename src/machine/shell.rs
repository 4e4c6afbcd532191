// src/machine/shell.rs

//! `Shell`: a machine wrapper that adds passthrough dispatch, command
//! tracing and file helpers built purely on command execution.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};

use crate::errors::MachineError;
use crate::machine::{
    BoxFuture, Input, Invocation, Machine, MachineExt, Output, Sink, trace,
};

/// `stat -c` format: octal mode and size. A single word, so it survives
/// being re-split by a remote shell.
const STAT_FORMAT: &str = "%a:%s";

/// Mode applied by [`Shell::write_file`] when none is requested.
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// How a shell treats a program by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Behavior {
    /// Output is buffered unless the caller routes it elsewhere.
    #[default]
    Capture,
    /// Interactive or high-volume program: streams are connected live.
    Passthrough,
}

/// Options for [`Shell::write_file`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    pub mode: Option<u32>,
}

impl WriteOptions {
    pub fn mode(mode: u32) -> Self {
        Self { mode: Some(mode) }
    }

    fn effective_mode(&self) -> u32 {
        self.mode.unwrap_or(DEFAULT_FILE_MODE)
    }
}

/// File metadata as reported by `stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileInfo {
    pub mode: u32,
    pub size: u64,
}

impl FileInfo {
    /// Permission bits only.
    pub fn perm(&self) -> u32 {
        self.mode & 0o777
    }
}

/// Wraps a machine with a behaviour table and tracing.
///
/// The table is filled while the shell is being built and read-only once it
/// is shared.
pub struct Shell {
    machine: Arc<dyn Machine>,
    behaviors: HashMap<String, Behavior>,
    traced: bool,
}

impl fmt::Debug for Shell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut passthrough: Vec<_> = self
            .behaviors
            .iter()
            .filter(|(_, b)| **b == Behavior::Passthrough)
            .map(|(name, _)| name.as_str())
            .collect();
        passthrough.sort_unstable();
        f.debug_struct("Shell")
            .field("passthrough", &passthrough)
            .field("traced", &self.traced)
            .finish_non_exhaustive()
    }
}

impl Shell {
    pub fn new(machine: impl Machine + 'static) -> Self {
        Self::from_arc(Arc::new(machine))
    }

    pub fn from_arc(machine: Arc<dyn Machine>) -> Self {
        Self {
            machine,
            behaviors: HashMap::new(),
            traced: true,
        }
    }

    /// Builder form of [`register_passthrough`](Self::register_passthrough).
    pub fn passthrough(mut self, name: impl Into<String>) -> Self {
        self.register_passthrough(name);
        self
    }

    pub fn register_passthrough(&mut self, name: impl Into<String>) {
        self.behaviors.insert(name.into(), Behavior::Passthrough);
    }

    /// Do not echo invocations made through this shell. Used for the upper
    /// layers of a delegation chain whose base shell already traces the
    /// full command.
    pub fn untraced(mut self) -> Self {
        self.traced = false;
        self
    }

    pub fn behavior(&self, program: &str) -> Behavior {
        self.behaviors.get(program).copied().unwrap_or_default()
    }

    pub fn is_passthrough(&self, program: &str) -> bool {
        self.behavior(program) == Behavior::Passthrough
    }

    /// Write `data` to `path`, then set its mode (default `0644`).
    pub async fn write_file(&self, path: &str, data: &[u8], opts: WriteOptions) -> Result<()> {
        self.command("tee", [path])
            .stdin(data)
            .discard()
            .exec()
            .await
            .with_context(|| format!("could not write {path}"))?;
        self.command("chmod", [format!("{:04o}", opts.effective_mode()), path.to_string()])
            .capture()
            .exec()
            .await
            .with_context(|| format!("could not set mode of {path}"))?;
        Ok(())
    }

    pub async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let out = self
            .command("cat", [path])
            .capture()
            .run()
            .await
            .with_context(|| format!("could not read {path}"))?;
        Ok(out.stdout)
    }

    pub async fn stat(&self, path: &str) -> Result<FileInfo> {
        let line = self
            .command("stat", ["-c", STAT_FORMAT, path])
            .call()
            .await
            .with_context(|| format!("could not stat {path}"))?;
        parse_stat(&line).with_context(|| format!("could not stat {path}"))
    }
}

fn parse_stat(line: &str) -> Result<FileInfo> {
    let Some((mode, size)) = line.trim().split_once(':') else {
        return Err(anyhow!("unexpected stat output {line:?}"));
    };
    Ok(FileInfo {
        mode: u32::from_str_radix(mode, 8).with_context(|| format!("bad mode {mode:?}"))?,
        size: size.parse().with_context(|| format!("bad size {size:?}"))?,
    })
}

impl Machine for Shell {
    fn invoke(&self, mut inv: Invocation) -> BoxFuture<'_, Result<Output, MachineError>> {
        if self.is_passthrough(&inv.program) && matches!(inv.stdout, Sink::Default) {
            inv.stdout = Sink::Inherit;
            if inv.stdin.is_none() {
                inv.stdin = Input::Inherit;
            }
        }
        if self.traced {
            trace::emit(&inv.program, &inv.args);
        }
        self.machine.invoke(inv)
    }
}

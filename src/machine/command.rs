// src/machine/command.rs

//! Invocation builder and the `call` / `exec` / `get` helpers.

use std::path::PathBuf;

use crate::errors::MachineError;
use crate::machine::{Input, Invocation, Machine, Output, Sink};

/// An [`Invocation`] bound to the machine that will run it.
///
/// ```no_run
/// # use labctl::machine::{MachineExt, MockMachine};
/// # async fn demo() -> Result<(), labctl::errors::MachineError> {
/// let ctl = MockMachine::new();
/// ctl.command("apply", ["-f", "-"])
///     .stdin("kind: Namespace\n")
///     .exec()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Command<'m, M: Machine + ?Sized> {
    machine: &'m M,
    inv: Invocation,
}

impl<'m, M: Machine + ?Sized> Command<'m, M> {
    pub fn new<I, S>(machine: &'m M, program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            machine,
            inv: Invocation::new(program, args),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.inv.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inv.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn stdin(mut self, input: impl Into<Input>) -> Self {
        self.inv.stdin = input.into();
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.inv.env.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.inv.current_dir = Some(dir.into());
        self
    }

    pub fn capture(mut self) -> Self {
        self.inv.stdout = Sink::Capture;
        self
    }

    pub fn discard(mut self) -> Self {
        self.inv.stdout = Sink::Null;
        self
    }

    pub fn into_parts(self) -> (&'m M, Invocation) {
        (self.machine, self.inv)
    }

    pub async fn run(self) -> Result<Output, MachineError> {
        self.machine.invoke(self.inv).await
    }

    /// Run with captured stdout and return it with trailing newlines removed.
    pub async fn call(self) -> Result<String, MachineError> {
        let out = self.capture().run().await?;
        Ok(trim_newline(out.stdout_lossy()))
    }

    /// Run for effect only. Output is not returned but failure still is.
    pub async fn exec(self) -> Result<(), MachineError> {
        self.run().await.map(|_| ())
    }

    /// Same as [`call`](Self::call); used for single-line secret lookups.
    pub async fn get(self) -> Result<String, MachineError> {
        self.call().await
    }
}

pub async fn call<M, I, S>(machine: &M, program: &str, args: I) -> Result<String, MachineError>
where
    M: Machine + ?Sized,
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Command::new(machine, program, args).call().await
}

pub async fn exec<M, I, S>(machine: &M, program: &str, args: I) -> Result<(), MachineError>
where
    M: Machine + ?Sized,
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Command::new(machine, program, args).exec().await
}

pub async fn get<M, I, S>(machine: &M, program: &str, args: I) -> Result<String, MachineError>
where
    M: Machine + ?Sized,
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Command::new(machine, program, args).get().await
}

fn trim_newline(mut s: String) -> String {
    while s.ends_with('\n') || s.ends_with('\r') {
        s.pop();
    }
    s
}

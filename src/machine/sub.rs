// src/machine/sub.rs

//! Delegated machines.
//!
//! `Sub::new(ssh_shell, "ssh", ["-i", key, host, "--"])` is a machine on
//! which `invoke("kubectl", ["get", "pods"])` becomes
//! `invoke("ssh", ["-i", key, host, "--", "kubectl", "get", "pods"])` on the
//! inner machine. Nesting composes: the prefixes concatenate in order.
//!
//! A prefix whose far side re-parses its arguments through a shell (ssh
//! joins the remote words with spaces) is marked with
//! [`Sub::remote_shell`]; the forwarded words are then shell-quoted.

use std::io;

use crate::errors::MachineError;
use crate::machine::trace::shell_quote;
use crate::machine::{BoxFuture, Invocation, Machine, Output};

/// Exit status ssh reports when it could not reach the host at all.
pub const SSH_CONNECTION_FAILED: i32 = 255;

#[derive(Debug, Clone)]
pub struct Sub<M> {
    inner: M,
    program: String,
    args: Vec<String>,
    remote_shell: bool,
}

impl<M: Machine> Sub<M> {
    pub fn new<I, S>(inner: M, program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inner,
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            remote_shell: false,
        }
    }

    /// Treat the prefix as a remote shell transport like ssh: quote the
    /// forwarded command so it arrives as the same argv, and report exit
    /// status 255 as a connection failure.
    pub fn remote_shell(mut self) -> Self {
        self.remote_shell = true;
        self
    }

    /// The full prefix, program first.
    pub fn prefix(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

/// Delegate through `prefix`. Returns `None` for an empty prefix, which
/// names no program to run.
pub fn delegate<M, I, S>(inner: M, prefix: I) -> Option<Sub<M>>
where
    M: Machine,
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut prefix = prefix.into_iter().map(Into::into);
    let program: String = prefix.next()?;
    Some(Sub::new(inner, program, prefix))
}

impl<M: Machine> Machine for Sub<M> {
    fn invoke(&self, inv: Invocation) -> BoxFuture<'_, Result<Output, MachineError>> {
        let Invocation {
            program,
            args,
            stdin,
            stdout,
            env,
            current_dir,
        } = inv;

        let mut forwarded = Vec::with_capacity(self.args.len() + 1 + args.len());
        forwarded.extend(self.args.iter().cloned());
        if self.remote_shell {
            forwarded.push(shell_quote(&program));
            forwarded.extend(args.iter().map(|a| shell_quote(a)));
        } else {
            forwarded.push(program);
            forwarded.extend(args);
        }

        let outer = Invocation {
            program: self.program.clone(),
            args: forwarded,
            stdin,
            stdout,
            env,
            current_dir,
        };
        if !self.remote_shell {
            return self.inner.invoke(outer);
        }
        Box::pin(async move {
            self.inner.invoke(outer).await.map_err(|err| match err {
                MachineError::Exit {
                    program,
                    code: SSH_CONNECTION_FAILED,
                    stderr,
                } => MachineError::io(
                    program,
                    io::Error::new(io::ErrorKind::ConnectionAborted, connection_message(&stderr)),
                ),
                other => other,
            })
        })
    }
}

fn connection_message(stderr: &str) -> String {
    if stderr.is_empty() {
        "connection failed".to_string()
    } else {
        format!("connection failed: {stderr}")
    }
}

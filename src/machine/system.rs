// src/machine/system.rs

//! The machine that actually spawns processes.

use std::io;
use std::process::Stdio;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdin, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::MachineError;
use crate::machine::{BoxFuture, Input, Invocation, Machine, Output, Sink};

/// Exit code a POSIX shell uses for "command not found". Through ssh this is
/// the only signal that the remote side lacks the program.
pub const NOT_FOUND_EXIT_CODE: i32 = 127;

/// Runs invocations as local child processes.
///
/// Every child is tied to the machine's cancellation token: when it fires,
/// the blocked child is killed and the invocation fails with
/// [`MachineError::Cancelled`].
#[derive(Debug, Clone, Default)]
pub struct SystemMachine {
    cancel: CancellationToken,
}

impl SystemMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    async fn run(&self, inv: Invocation) -> Result<Output, MachineError> {
        let Invocation {
            program,
            args,
            stdin,
            stdout,
            env,
            current_dir,
        } = inv;

        if self.cancel.is_cancelled() {
            return Err(MachineError::Cancelled { program });
        }

        let mut cmd = Command::new(&program);
        cmd.args(&args).envs(env).kill_on_drop(true);
        if let Some(dir) = current_dir {
            cmd.current_dir(dir);
        }

        cmd.stdin(match &stdin {
            Input::None => Stdio::null(),
            Input::Inherit => Stdio::inherit(),
            Input::Bytes(_) | Input::Reader(_) => Stdio::piped(),
        });

        let live = matches!(stdout, Sink::Inherit);
        cmd.stdout(match &stdout {
            Sink::Inherit => Stdio::inherit(),
            Sink::Null => Stdio::null(),
            Sink::Default | Sink::Capture | Sink::Stream(_) => Stdio::piped(),
        });
        cmd.stderr(if live { Stdio::inherit() } else { Stdio::piped() });

        debug!(program = %program, "spawning process");
        let mut child = cmd.spawn().map_err(|e| spawn_error(&program, e))?;

        let child_stdin = child.stdin.take();
        let child_stdout = child.stdout.take();
        let child_stderr = child.stderr.take();

        // Feeding, draining and waiting all make progress together; a child
        // that fills its stdout pipe before reading stdin cannot wedge us.
        let work = async move {
            let feed = feed_stdin(child_stdin, stdin);
            let drain_out = drain_stdout(child_stdout, stdout);
            let drain_err = read_all(child_stderr);
            let (fed, out, err) = tokio::join!(feed, drain_out, drain_err);
            let status = child.wait().await;
            (fed, out, err, status)
        };

        let (fed, out, err, status) = tokio::select! {
            res = work => res,
            _ = self.cancel.cancelled() => {
                warn!(program = %program, "cancellation requested; killing process");
                return Err(MachineError::Cancelled { program });
            }
        };

        // A consumer that hung up explains whatever status the child died with.
        let stdout = match out {
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                return Err(MachineError::io(program, e));
            }
            other => other,
        };
        let status = status.map_err(|e| MachineError::io(&program, e))?;
        let stderr = err.map_err(|e| MachineError::io(&program, e))?;
        let code = status.code().unwrap_or(-1);

        if code == NOT_FOUND_EXIT_CODE {
            return Err(MachineError::NotFound { program });
        }
        if !status.success() {
            return Err(MachineError::Exit {
                program,
                code,
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            });
        }

        fed.map_err(|e| MachineError::io(&program, e))?;
        let stdout = stdout.map_err(|e| MachineError::io(&program, e))?;

        debug!(program = %program, exit_code = code, "process exited");
        Ok(Output {
            stdout,
            stderr,
            code,
        })
    }
}

impl Machine for SystemMachine {
    fn invoke(&self, inv: Invocation) -> BoxFuture<'_, Result<Output, MachineError>> {
        Box::pin(self.run(inv))
    }
}

fn spawn_error(program: &str, err: io::Error) -> MachineError {
    if err.kind() == io::ErrorKind::NotFound {
        MachineError::NotFound {
            program: program.to_string(),
        }
    } else {
        MachineError::io(program, err)
    }
}

async fn feed_stdin(pipe: Option<ChildStdin>, input: Input) -> io::Result<()> {
    let Some(mut pipe) = pipe else {
        return Ok(());
    };
    let res = match input {
        Input::Bytes(bytes) => pipe.write_all(&bytes).await,
        Input::Reader(mut reader) => tokio::io::copy(&mut reader, &mut pipe).await.map(|_| ()),
        Input::None | Input::Inherit => Ok(()),
    };
    // Closing stdin is what tells the child its input is complete.
    drop(pipe);
    match res {
        // The child stopped reading; its exit status decides the outcome.
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        other => other,
    }
}

async fn drain_stdout<R>(pipe: Option<R>, sink: Sink) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let Some(mut pipe) = pipe else {
        return Ok(Vec::new());
    };
    match sink {
        Sink::Stream(mut w) => {
            tokio::io::copy(&mut pipe, &mut w).await?;
            w.shutdown().await?;
            Ok(Vec::new())
        }
        _ => {
            let mut buf = Vec::new();
            pipe.read_to_end(&mut buf).await?;
            Ok(buf)
        }
    }
}

async fn read_all<R>(pipe: Option<R>) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

// src/machine/mock.rs

//! A machine that never spawns anything.
//!
//! `MockMachine` records every invocation (full argv and the stdin payload),
//! replays canned responses per program name and falls back to a
//! configurable default for everything else. It also emulates the handful of
//! file commands [`Shell`](crate::machine::Shell) uses (`tee`, `cat`,
//! `chmod`, `stat -c`) against an in-memory filesystem, so file helpers can
//! be exercised end to end.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::errors::MachineError;
use crate::machine::shell::DEFAULT_FILE_MODE;
use crate::machine::{BoxFuture, Input, Invocation, Machine, Output, Sink};

/// One recorded invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    /// Program followed by its arguments.
    pub args: Vec<String>,
    /// Everything the invocation received on stdin.
    pub got: Vec<u8>,
}

impl Call {
    pub fn program(&self) -> &str {
        self.args.first().map(String::as_str).unwrap_or_default()
    }

    pub fn got_lossy(&self) -> String {
        String::from_utf8_lossy(&self.got).into_owned()
    }
}

/// A canned result for a program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Output {
        stdout: Vec<u8>,
        stderr: Vec<u8>,
        code: i32,
    },
    NotFound,
    /// Block until the mock's cancellation token fires.
    Pending,
}

impl Response {
    pub fn ok() -> Self {
        Self::stdout("")
    }

    pub fn stdout(out: impl Into<Vec<u8>>) -> Self {
        Response::Output {
            stdout: out.into(),
            stderr: Vec::new(),
            code: 0,
        }
    }

    pub fn exit(code: i32) -> Self {
        Self::exit_with_stderr(code, "")
    }

    pub fn exit_with_stderr(code: i32, stderr: impl Into<Vec<u8>>) -> Self {
        Response::Output {
            stdout: Vec::new(),
            stderr: stderr.into(),
            code,
        }
    }

    pub fn not_found() -> Self {
        Response::NotFound
    }

    pub fn pending() -> Self {
        Response::Pending
    }
}

/// What an uncanned, non-file command does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Fallback {
    /// Succeed with no output.
    #[default]
    Empty,
    /// Succeed, echoing stdin to stdout like `cat`.
    Echo,
    /// Exit with the given code.
    Exit(i32),
    NotFound,
}

#[derive(Debug, Clone)]
struct MockFile {
    data: Vec<u8>,
    mode: u32,
}

#[derive(Debug, Default)]
struct State {
    calls: Vec<Call>,
    queued: HashMap<String, VecDeque<Response>>,
    canned: HashMap<String, Response>,
    fallback: Fallback,
    files: BTreeMap<String, MockFile>,
}

/// Cloning yields another handle onto the same recorded state.
#[derive(Debug, Clone, Default)]
pub struct MockMachine {
    state: Arc<Mutex<State>>,
    cancel: Option<CancellationToken>,
}

impl MockMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail blocked and future invocations with `Cancelled` once `token`
    /// fires.
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Answer every call to `program` with `response`.
    pub fn respond(&self, program: impl Into<String>, response: Response) {
        self.lock().canned.insert(program.into(), response);
    }

    /// Answer the next call to `program` with `response`. Queued responses
    /// are consumed before the persistent one.
    pub fn respond_once(&self, program: impl Into<String>, response: Response) {
        self.lock()
            .queued
            .entry(program.into())
            .or_default()
            .push_back(response);
    }

    /// Shorthand for a successful response printing `stdout`.
    pub fn return_output(&self, program: impl Into<String>, stdout: impl Into<Vec<u8>>) {
        self.respond(program, Response::stdout(stdout));
    }

    pub fn set_fallback(&self, fallback: Fallback) {
        self.lock().fallback = fallback;
    }

    pub fn add_file(&self, path: impl Into<String>, data: impl Into<Vec<u8>>, mode: u32) {
        self.lock().files.insert(
            path.into(),
            MockFile {
                data: data.into(),
                mode,
            },
        );
    }

    /// Content and mode of an emulated file.
    pub fn file(&self, path: &str) -> Option<(Vec<u8>, u32)> {
        self.lock()
            .files
            .get(path)
            .map(|f| (f.data.clone(), f.mode))
    }

    /// Every call, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Calls whose program is `program`, in order.
    pub fn calls_for(&self, program: &str) -> Vec<Call> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.program() == program)
            .cloned()
            .collect()
    }

    async fn run(&self, inv: Invocation) -> Result<Output, MachineError> {
        let Invocation {
            program,
            args,
            stdin,
            stdout,
            ..
        } = inv;

        let got = read_input(stdin)
            .await
            .map_err(|e| MachineError::io(&program, e))?;

        let response = {
            let mut state = self.lock();
            state.calls.push(Call {
                args: std::iter::once(program.clone())
                    .chain(args.iter().cloned())
                    .collect(),
                got: got.clone(),
            });
            state.resolve(&program, &args, &got)
        };

        if self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
            return Err(MachineError::Cancelled { program });
        }

        let (out, stderr, code) = match response {
            Response::NotFound => return Err(MachineError::NotFound { program }),
            Response::Pending => {
                match &self.cancel {
                    Some(token) => token.cancelled().await,
                    None => std::future::pending::<()>().await,
                }
                return Err(MachineError::Cancelled { program });
            }
            Response::Output {
                stdout,
                stderr,
                code,
            } => (stdout, stderr, code),
        };

        if code != 0 {
            return Err(MachineError::Exit {
                program,
                code,
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            });
        }

        let captured = match stdout {
            Sink::Default | Sink::Capture => out,
            Sink::Stream(mut w) => {
                w.write_all(&out)
                    .await
                    .map_err(|e| MachineError::io(&program, e))?;
                w.shutdown()
                    .await
                    .map_err(|e| MachineError::io(&program, e))?;
                Vec::new()
            }
            Sink::Inherit | Sink::Null => Vec::new(),
        };

        Ok(Output {
            stdout: captured,
            stderr,
            code,
        })
    }
}

impl Machine for MockMachine {
    fn invoke(&self, inv: Invocation) -> BoxFuture<'_, Result<Output, MachineError>> {
        Box::pin(self.run(inv))
    }
}

async fn read_input(input: Input) -> std::io::Result<Vec<u8>> {
    match input {
        Input::None | Input::Inherit => Ok(Vec::new()),
        Input::Bytes(bytes) => Ok(bytes),
        Input::Reader(mut r) => {
            let mut buf = Vec::new();
            r.read_to_end(&mut buf).await?;
            Ok(buf)
        }
    }
}

impl State {
    fn resolve(&mut self, program: &str, args: &[String], got: &[u8]) -> Response {
        if let Some(r) = self.queued.get_mut(program).and_then(VecDeque::pop_front) {
            return r;
        }
        if let Some(r) = self.canned.get(program) {
            return r.clone();
        }
        if let Some(r) = self.emulate_file_command(program, args, got) {
            return r;
        }
        match self.fallback {
            Fallback::Empty => Response::ok(),
            Fallback::Echo => Response::stdout(got),
            Fallback::Exit(code) => Response::exit(code),
            Fallback::NotFound => Response::NotFound,
        }
    }

    fn emulate_file_command(&mut self, program: &str, args: &[String], got: &[u8]) -> Option<Response> {
        let response = match (program, args) {
            ("tee", [path]) => {
                let mode = self.files.get(path).map_or(DEFAULT_FILE_MODE, |f| f.mode);
                self.files.insert(
                    path.clone(),
                    MockFile {
                        data: got.to_vec(),
                        mode,
                    },
                );
                Response::stdout(got)
            }
            ("cat", paths) if !paths.is_empty() => {
                let mut out = Vec::new();
                for path in paths {
                    match self.files.get(path) {
                        Some(f) => out.extend_from_slice(&f.data),
                        None => return Some(no_such_file("cat", path)),
                    }
                }
                Response::stdout(out)
            }
            ("chmod", [mode, path]) => {
                let Ok(mode) = u32::from_str_radix(mode, 8) else {
                    return Some(Response::exit_with_stderr(
                        1,
                        format!("chmod: invalid mode: '{mode}'"),
                    ));
                };
                match self.files.get_mut(path) {
                    Some(f) => f.mode = mode,
                    None => return Some(no_such_file("chmod", path)),
                }
                Response::ok()
            }
            ("stat", [flag, format, path]) if flag == "-c" => match self.files.get(path) {
                Some(f) => {
                    let line = format
                        .replace("%a", &format!("{:o}", f.mode & 0o7777))
                        .replace("%s", &f.data.len().to_string());
                    Response::stdout(format!("{line}\n"))
                }
                None => no_such_file("stat", path),
            },
            _ => return None,
        };
        Some(response)
    }
}

fn no_such_file(program: &str, path: &str) -> Response {
    Response::exit_with_stderr(
        1,
        format!("{program}: cannot access '{path}': No such file or directory"),
    )
}

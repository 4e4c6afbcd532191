// src/machine/trace.rs

//! Process-wide command tracing.
//!
//! Traced shells echo every invocation as `+ program args...` (the same shape
//! as `sh -x`) to the current [`TraceSink`]. By default nothing is echoed;
//! `labctl -v` switches the sink to stderr.
//!
//! A single invocation that carries a secret runs under [`suppress`], which
//! returns a guard restoring the previous sink when dropped, including on
//! early return with an error.

use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Destination for traced invocations.
#[derive(Debug, Clone, Default)]
pub enum TraceSink {
    #[default]
    Discard,
    /// Write `+ cmd` lines to stderr.
    Stderr,
    /// Append lines to a shared buffer. Used by tests.
    Buffer(Arc<Mutex<Vec<u8>>>),
}

impl TraceSink {
    pub fn buffer() -> (Self, Arc<Mutex<Vec<u8>>>) {
        let buf = Arc::new(Mutex::new(Vec::new()));
        (TraceSink::Buffer(Arc::clone(&buf)), buf)
    }

    pub fn is_discard(&self) -> bool {
        matches!(self, TraceSink::Discard)
    }
}

static SINK: RwLock<TraceSink> = RwLock::new(TraceSink::Discard);

/// Replace the process-wide sink, returning the previous one.
pub fn set(sink: TraceSink) -> TraceSink {
    let mut guard = SINK.write().unwrap_or_else(PoisonError::into_inner);
    std::mem::replace(&mut *guard, sink)
}

pub fn current() -> TraceSink {
    SINK.read().unwrap_or_else(PoisonError::into_inner).clone()
}

/// Install `sink` until the returned guard is dropped.
#[must_use = "the previous sink is restored when the guard is dropped"]
pub fn scoped(sink: TraceSink) -> TraceGuard {
    TraceGuard {
        previous: Some(set(sink)),
    }
}

/// Stop tracing until the returned guard is dropped.
#[must_use = "tracing resumes when the guard is dropped"]
pub fn suppress() -> TraceGuard {
    scoped(TraceSink::Discard)
}

/// Restores the sink that was active when it was created.
#[derive(Debug)]
pub struct TraceGuard {
    previous: Option<TraceSink>,
}

impl Drop for TraceGuard {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            set(previous);
        }
    }
}

/// Echo one invocation to the current sink.
pub fn emit(program: &str, args: &[String]) {
    let sink = current();
    if sink.is_discard() {
        return;
    }
    let line = format_command(program, args);
    match sink {
        TraceSink::Discard => {}
        TraceSink::Stderr => {
            let _ = writeln!(std::io::stderr(), "+ {line}");
        }
        TraceSink::Buffer(buf) => {
            let mut buf = buf.lock().unwrap_or_else(PoisonError::into_inner);
            let _ = writeln!(buf, "+ {line}");
        }
    }
}

/// Render an argv the way a POSIX shell would accept it back.
pub fn format_command(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .map(shell_quote)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Quote one word for a POSIX shell. Plain words pass through unchanged.
pub fn shell_quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+,".contains(c));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

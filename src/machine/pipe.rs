// src/machine/pipe.rs

//! Connect one command's stdout to another's stdin.
//!
//! Both sides run concurrently over an in-memory duplex stream, so a
//! producer emitting more than the window blocks until the consumer reads
//! instead of deadlocking.
//!
//! Failure policy: either side failing fails the pipe. If both fail, the
//! producer's error wins, except when it is a broken pipe caused by the
//! consumer going away first; then the consumer's error is the real cause.

use tracing::debug;

use crate::errors::MachineError;
use crate::machine::{Command, Input, Machine, Sink};

/// Bytes buffered between producer and consumer.
pub const PIPE_WINDOW: usize = 64 * 1024;

/// Run `producer | consumer`, surfacing the failure of either side.
pub async fn pipe<P, C>(producer: Command<'_, P>, consumer: Command<'_, C>) -> Result<(), MachineError>
where
    P: Machine + ?Sized,
    C: Machine + ?Sized,
{
    run_pipe(producer, consumer, Sink::Default).await.map(|_| ())
}

/// Like [`pipe`], but capture and return the consumer's stdout.
pub async fn pipe_capturing_output<P, C>(
    producer: Command<'_, P>,
    consumer: Command<'_, C>,
) -> Result<Vec<u8>, MachineError>
where
    P: Machine + ?Sized,
    C: Machine + ?Sized,
{
    run_pipe(producer, consumer, Sink::Capture).await
}

async fn run_pipe<P, C>(
    producer: Command<'_, P>,
    consumer: Command<'_, C>,
    consumer_sink: Sink,
) -> Result<Vec<u8>, MachineError>
where
    P: Machine + ?Sized,
    C: Machine + ?Sized,
{
    let (writer, reader) = tokio::io::duplex(PIPE_WINDOW);

    let (p_machine, mut p_inv) = producer.into_parts();
    let (c_machine, mut c_inv) = consumer.into_parts();
    p_inv.stdout = Sink::Stream(Box::new(writer));
    c_inv.stdin = Input::Reader(Box::new(reader));
    c_inv.stdout = consumer_sink;

    let p_program = p_inv.program.clone();
    let c_program = c_inv.program.clone();
    debug!(producer = %p_program, consumer = %c_program, "starting pipe");

    let (produced, consumed) = tokio::join!(p_machine.invoke(p_inv), c_machine.invoke(c_inv));

    match (produced, consumed) {
        (Ok(_), Ok(out)) => Ok(out.stdout),
        (Err(p), Ok(_)) => {
            debug!(producer = %p_program, "pipe producer failed");
            Err(p)
        }
        (Ok(_), Err(c)) => {
            debug!(consumer = %c_program, "pipe consumer failed");
            Err(c)
        }
        (Err(p), Err(c)) if p.is_broken_pipe() => Err(c),
        (Err(p), Err(_)) => Err(p),
    }
}

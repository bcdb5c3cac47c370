//! Socket-facing tasks owned by the engine.
//!
//! Every connect attempt and every established socket belongs to one
//! *generation*. Tasks report back to the engine over an event channel,
//! tagging each event with their generation so the engine can drop reports
//! from sockets it has already torn down.
//!
//! ```text
//! Engine ──► mpsc<Bytes> ──► writer task ──► socket write half
//! Engine ◄── mpsc<Event> ◄── reader task ◄── socket read half
//! ```

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::{IprotoError, Result};
use crate::protocol::{FrameBuffer, Packet};

/// Report from a transport task to the engine.
#[derive(Debug)]
pub(crate) enum Event {
    Connected { generation: u64, stream: TcpStream },
    ConnectFailed { generation: u64, error: io::Error },
    Frame { generation: u64, packet: Packet },
    ReadFailed { generation: u64, error: IprotoError },
    Written { generation: u64 },
    WriteFailed {
        generation: u64,
        error: io::Error,
        partial: bool,
    },
}

pub(crate) type EventSender = mpsc::UnboundedSender<Event>;

/// Spawn one connect attempt bounded by `timeout`.
///
/// A failed attempt is reported no earlier than `timeout` after it started,
/// which fixes the reconnect cadence to one attempt per connect timeout.
pub(crate) fn spawn_connect(
    endpoint: SocketAddr,
    timeout: Duration,
    nodelay: bool,
    generation: u64,
    events: EventSender,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let started = Instant::now();
        let event = match connect(endpoint, timeout, nodelay).await {
            Ok(stream) => Event::Connected { generation, stream },
            Err(error) => {
                tokio::time::sleep_until(started + timeout).await;
                Event::ConnectFailed { generation, error }
            }
        };
        let _ = events.send(event);
    })
}

async fn connect(endpoint: SocketAddr, timeout: Duration, nodelay: bool) -> io::Result<TcpStream> {
    let stream = tokio::time::timeout(timeout, TcpStream::connect(endpoint))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))??;
    stream.set_nodelay(nodelay)?;
    Ok(stream)
}

/// The pair of tasks serving one established socket.
///
/// Dropping the link aborts both tasks, which closes the socket.
pub(crate) struct Link {
    writer: mpsc::UnboundedSender<Bytes>,
    reader_task: JoinHandle<()>,
    writer_task: JoinHandle<()>,
}

impl Link {
    /// Spawn reader and writer tasks over the two halves of a socket.
    pub(crate) fn spawn<R, W>(
        reader: R,
        writer: W,
        generation: u64,
        max_payload_size: u32,
        events: EventSender,
    ) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let reader_task = tokio::spawn(reader_task(
            reader,
            FrameBuffer::with_max_payload(max_payload_size),
            generation,
            events.clone(),
        ));
        let writer_task = tokio::spawn(writer_loop(rx, writer, generation, events));
        Self {
            writer: tx,
            reader_task,
            writer_task,
        }
    }

    /// Hand one buffer to the writer task.
    pub(crate) fn write(&self, buffer: Bytes) {
        // A closed channel means the writer already failed and reported it.
        let _ = self.writer.send(buffer);
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.reader_task.abort();
        self.writer_task.abort();
    }
}

async fn reader_task<R>(mut reader: R, mut frames: FrameBuffer, generation: u64, events: EventSender)
where
    R: AsyncRead + Unpin,
{
    if let Err(error) = read_frames(&mut reader, &mut frames, generation, &events).await {
        let _ = events.send(Event::ReadFailed { generation, error });
    }
}

/// Main read loop: deliver every complete frame, then read at least the
/// shortfall of the next one.
///
/// Returns `Ok(())` only when the engine has gone away.
async fn read_frames<R>(
    reader: &mut R,
    frames: &mut FrameBuffer,
    generation: u64,
    events: &EventSender,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    loop {
        while let Some(packet) = frames.next_frame()? {
            if events.send(Event::Frame { generation, packet }).is_err() {
                return Ok(());
            }
        }
        frames.read_from(reader).await?;
    }
}

/// Writer loop - writes one buffer at a time, in the order received.
///
/// Stops after the first failure; the engine tears the socket down.
async fn writer_loop<W>(
    mut rx: mpsc::UnboundedReceiver<Bytes>,
    mut writer: W,
    generation: u64,
    events: EventSender,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(buffer) = rx.recv().await {
        let event = match write_buffer(&mut writer, &buffer).await {
            Ok(()) => Event::Written { generation },
            Err((error, partial)) => Event::WriteFailed {
                generation,
                error,
                partial,
            },
        };
        let failed = matches!(event, Event::WriteFailed { .. });
        if events.send(event).is_err() || failed {
            return;
        }
    }
}

/// Write a whole buffer.
///
/// On failure also reports whether the transfer was cut short part-way
/// (some bytes written, zero-length write, or interrupted).
async fn write_buffer<W>(writer: &mut W, buffer: &[u8]) -> std::result::Result<(), (io::Error, bool)>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0;
    while written < buffer.len() {
        match writer.write(&buffer[written..]).await {
            Ok(0) => {
                return Err((
                    io::Error::new(io::ErrorKind::WriteZero, "write returned 0"),
                    true,
                ));
            }
            Ok(n) => written += n,
            Err(e) => {
                let partial = written > 0 || e.kind() == io::ErrorKind::Interrupted;
                return Err((e, partial));
            }
        }
    }
    writer.flush().await.map_err(|e| (e, false))
}

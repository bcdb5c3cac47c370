//! The connection engine task.
//!
//! One engine owns everything mutable about a connection: the write queue,
//! the correlation table, the current socket and the ping schedule. It runs
//! as a single task and reacts to three sources:
//!
//! - commands from the [`Connection`](super::Connection) handle
//! - events from the transport tasks of the current generation
//! - timers (request deadlines and the next liveness ping)
//!
//! Because only this task touches that state, no locking is needed and
//! every completion is resolved exactly once.

use std::collections::VecDeque;
use std::fmt;
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use super::pending::{Expiry, PendingTable};
use super::result::RequestResult;
use super::transport::{spawn_connect, Event, Link};
use super::{Callback, ConnState, LogSink, Shared};
use crate::codec::Packer;
use crate::config::ConnectionConfig;
use crate::protocol::{Packet, PING_MSG};

/// Who is waiting on a pending sync id.
pub(crate) enum Completion {
    /// An application request.
    User(Callback),
    /// The internal liveness ping.
    Ping,
}

/// Requests from the handle to the engine.
pub(crate) enum Command {
    Write {
        packet: Packet,
        callback: Option<Callback>,
    },
    Reconnect,
    DisablePing,
    Shutdown,
}

/// Forwards warnings to `tracing` and to the optional user sink.
#[derive(Clone)]
pub(crate) struct Logger {
    endpoint: SocketAddr,
    sink: Option<LogSink>,
}

impl Logger {
    pub(crate) fn new(endpoint: SocketAddr, sink: Option<LogSink>) -> Self {
        Self { endpoint, sink }
    }

    pub(crate) fn warn(&self, message: fmt::Arguments<'_>) {
        tracing::warn!(endpoint = %self.endpoint, "{}", message);
        if let Some(sink) = &self.sink {
            sink(&format!("[iproto_conn] {}: {}", self.endpoint, message));
        }
    }
}

struct QueuedWrite {
    buffer: Bytes,
    /// Submitted by the user, so reported through `Shared::write_active`.
    counted: bool,
}

pub(crate) struct Engine {
    endpoint: SocketAddr,
    config: ConnectionConfig,
    logger: Logger,
    shared: Arc<Shared>,
    commands: mpsc::UnboundedReceiver<Command>,
    events_tx: mpsc::UnboundedSender<Event>,
    events: mpsc::UnboundedReceiver<Event>,
    state: ConnState,
    generation: u64,
    pending: PendingTable,
    write_queue: VecDeque<QueuedWrite>,
    in_flight: Option<QueuedWrite>,
    link: Option<Link>,
    connect_task: Option<JoinHandle<()>>,
    ping_enabled: bool,
    ping_at: Option<Instant>,
}

impl Engine {
    /// Spawn the engine task and return the command sender for the handle.
    pub(crate) fn spawn(
        endpoint: SocketAddr,
        config: ConnectionConfig,
        logger: Logger,
        shared: Arc<Shared>,
    ) -> mpsc::UnboundedSender<Command> {
        let (engine, commands_tx) = Self::new(endpoint, config, logger, shared);
        tokio::spawn(engine.run());
        commands_tx
    }

    fn new(
        endpoint: SocketAddr,
        config: ConnectionConfig,
        logger: Logger,
        shared: Arc<Shared>,
    ) -> (Self, mpsc::UnboundedSender<Command>) {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::unbounded_channel();
        let ping_enabled = config.ping_interval().is_some();
        let engine = Self {
            endpoint,
            config,
            logger,
            shared,
            commands,
            events_tx,
            events,
            state: ConnState::Disconnected,
            generation: 0,
            pending: PendingTable::new(),
            write_queue: VecDeque::new(),
            in_flight: None,
            link: None,
            connect_task: None,
            ping_enabled,
            ping_at: None,
        };
        (engine, commands_tx)
    }

    async fn run(mut self) {
        loop {
            let ping_at = self.ping_at;
            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        self.shutdown();
                        break;
                    };
                    if self.handle_command(command) {
                        break;
                    }
                }
                Some(event) = self.events.recv() => self.handle_event(event),
                Some(sync) = self.pending.next_expired(), if !self.pending.is_empty() => {
                    self.handle_expired(sync);
                }
                _ = sleep_until(ping_at.unwrap_or_else(Instant::now)), if ping_at.is_some() => {
                    self.send_ping();
                }
            }
        }
        self.drain_commands();
        tracing::debug!(endpoint = %self.endpoint, "engine stopped");
    }

    /// Returns true when the engine should stop.
    fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Write { packet, callback } => self.handle_write(packet, callback),
            Command::Reconnect => self.reconnect(),
            Command::DisablePing => {
                self.ping_enabled = false;
                self.ping_at = None;
            }
            Command::Shutdown => {
                self.shutdown();
                return true;
            }
        }
        false
    }

    fn handle_write(&mut self, packet: Packet, callback: Option<Callback>) {
        if let Some(callback) = callback {
            let sync = packet.sync();
            let timeout = self.config.read_timeout();
            let replaced = self
                .pending
                .register(sync, timeout, Completion::User(callback));
            match replaced {
                Some(Completion::User(previous)) => {
                    self.logger.warn(format_args!(
                        "sync {sync} reused while pending, dismissing the older request"
                    ));
                    self.shared.pending.fetch_sub(1, Ordering::AcqRel);
                    invoke(previous, RequestResult::Error);
                }
                Some(Completion::Ping) => self.schedule_ping(),
                None => {}
            }
        }
        self.enqueue(packet.into_bytes(), true);
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Connected { generation, stream } if generation == self.generation => {
                self.connect_task = None;
                let (reader, writer) = stream.into_split();
                self.attach(reader, writer);
            }
            Event::ConnectFailed { generation, error } if generation == self.generation => {
                self.connect_task = None;
                self.logger.warn(format_args!("connect failed: {error}"));
                self.begin_connect();
            }
            Event::Frame { generation, packet } if generation == self.generation => {
                self.handle_frame(packet);
            }
            Event::ReadFailed { generation, error } if generation == self.generation => {
                self.logger.warn(format_args!("read failed: {error}"));
                self.reconnect();
            }
            Event::Written { generation } if generation == self.generation => {
                self.in_flight = None;
                self.pump_writes();
            }
            Event::WriteFailed {
                generation,
                error,
                partial,
            } if generation == self.generation => {
                self.logger.warn(format_args!("write failed: {error}"));
                if let Some(write) = self.in_flight.take() {
                    if partial {
                        self.write_queue.push_front(write);
                    }
                }
                self.reconnect();
            }
            stale => {
                tracing::trace!(endpoint = %self.endpoint, ?stale, "ignoring stale transport event");
            }
        }
    }

    fn handle_frame(&mut self, packet: Packet) {
        let sync = packet.sync();
        match self.pending.resolve(sync) {
            Some(completion) => self.complete(completion, RequestResult::Ok(packet)),
            None => {
                tracing::debug!(endpoint = %self.endpoint, sync, msg = packet.msg(), "response for unknown sync");
            }
        }
    }

    fn handle_expired(&mut self, sync: u32) {
        match self.pending.take_expired(sync, Instant::now()) {
            Expiry::Fired(completion) => {
                tracing::debug!(
                    endpoint = %self.endpoint,
                    sync,
                    remaining = self.pending.len(),
                    "request timed out"
                );
                self.complete(completion, RequestResult::Timeout);
            }
            Expiry::Rearmed | Expiry::Gone => {}
        }
    }

    fn complete(&mut self, completion: Completion, result: RequestResult) {
        match completion {
            Completion::User(callback) => {
                self.shared.pending.fetch_sub(1, Ordering::AcqRel);
                invoke(callback, result);
            }
            Completion::Ping => self.ping_done(result),
        }
    }

    fn ping_done(&mut self, result: RequestResult) {
        if self.state != ConnState::Connected {
            return;
        }
        if result.is_ok() {
            self.schedule_ping();
        } else {
            self.logger
                .warn(format_args!("ping failed with {:?}, reconnecting", result.code()));
            self.reconnect();
        }
    }

    fn schedule_ping(&mut self) {
        self.ping_at = match self.config.ping_interval() {
            Some(interval) if self.ping_enabled && self.state == ConnState::Connected => {
                Some(Instant::now() + interval)
            }
            _ => None,
        };
    }

    fn send_ping(&mut self) {
        self.ping_at = None;
        let packet = Packer::new(PING_MSG).finish();
        let replaced = self
            .pending
            .register(packet.sync(), self.config.read_timeout(), Completion::Ping);
        if let Some(Completion::User(callback)) = replaced {
            self.shared.pending.fetch_sub(1, Ordering::AcqRel);
            invoke(callback, RequestResult::Error);
        }
        self.enqueue(packet.into_bytes(), false);
    }

    fn enqueue(&mut self, buffer: Bytes, counted: bool) {
        self.write_queue.push_back(QueuedWrite { buffer, counted });
        match self.state {
            ConnState::Disconnected => self.begin_connect(),
            ConnState::Connecting => {}
            ConnState::Connected => self.pump_writes(),
            ConnState::ShuttingDown => self.discard_queue(),
        }
    }

    /// Serve the socket of the current generation and start writing.
    fn attach<R, W>(&mut self, reader: R, writer: W)
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        self.link = Some(Link::spawn(
            reader,
            writer,
            self.generation,
            self.config.max_payload_size,
            self.events_tx.clone(),
        ));
        self.set_state(ConnState::Connected);
        tracing::debug!(endpoint = %self.endpoint, generation = self.generation, "connected");
        self.schedule_ping();
        self.pump_writes();
    }

    /// Hand the next queued buffer to the writer, one at a time.
    fn pump_writes(&mut self) {
        if self.in_flight.is_none() {
            if let Some(link) = &self.link {
                if let Some(write) = self.write_queue.pop_front() {
                    link.write(write.buffer.clone());
                    self.in_flight = Some(write);
                }
            }
        }
        self.publish_write_active();
    }

    fn publish_write_active(&self) {
        let active = self.in_flight.as_ref().is_some_and(|write| write.counted);
        self.shared.write_active.store(active, Ordering::Release);
    }

    fn discard_queue(&mut self) {
        self.write_queue.clear();
    }

    fn begin_connect(&mut self) {
        self.set_state(ConnState::Connecting);
        tracing::debug!(endpoint = %self.endpoint, generation = self.generation, "connecting");
        self.connect_task = Some(spawn_connect(
            self.endpoint,
            self.config.connect_timeout(),
            self.config.nodelay,
            self.generation,
            self.events_tx.clone(),
        ));
    }

    fn reconnect(&mut self) {
        if self.state == ConnState::ShuttingDown {
            return;
        }
        self.teardown();
        self.begin_connect();
    }

    /// Close the socket and dismiss every pending request with an error.
    ///
    /// Queued writes survive; the in-flight one is dropped.
    fn teardown(&mut self) {
        if self.state != ConnState::ShuttingDown {
            self.set_state(ConnState::Disconnected);
        }
        self.generation += 1;
        self.link = None;
        if let Some(task) = self.connect_task.take() {
            task.abort();
        }
        self.ping_at = None;
        self.in_flight = None;
        self.publish_write_active();
        let dismissed = self.pending.drain();
        if !dismissed.is_empty() {
            tracing::debug!(endpoint = %self.endpoint, count = dismissed.len(), "dismissing pending requests");
        }
        for (_, completion) in dismissed {
            self.complete(completion, RequestResult::Error);
        }
    }

    fn shutdown(&mut self) {
        self.shared.shutting_down.store(true, Ordering::Release);
        self.set_state(ConnState::ShuttingDown);
        self.teardown();
        self.discard_queue();
        tracing::debug!(endpoint = %self.endpoint, "shut down");
    }

    /// Fail every write that was accepted but never reached the engine.
    fn drain_commands(&mut self) {
        self.commands.close();
        while let Ok(command) = self.commands.try_recv() {
            if let Command::Write {
                callback: Some(callback),
                ..
            } = command
            {
                self.shared.pending.fetch_sub(1, Ordering::AcqRel);
                invoke(callback, RequestResult::Error);
            }
        }
    }

    fn set_state(&mut self, state: ConnState) {
        self.state = state;
        self.shared.state.store(state as u8, Ordering::Release);
    }
}

/// Run a user callback. A panic escaping it is fatal.
fn invoke(callback: Callback, result: RequestResult) {
    if panic::catch_unwind(AssertUnwindSafe(move || callback(result))).is_err() {
        tracing::error!("request callback panicked, aborting");
        std::process::abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::pack_with;
    use crate::protocol::FrameBuffer;
    use std::io;
    use std::pin::Pin;
    use std::sync::Mutex;
    use std::task::{Context, Poll};
    use tokio::net::TcpListener;

    /// Accepts the first few bytes of the first write, then fails.
    #[derive(Default)]
    struct CutOffWriter {
        accepted: usize,
    }

    impl AsyncWrite for CutOffWriter {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            if self.accepted == 0 {
                self.accepted = buf.len().min(3);
                return Poll::Ready(Ok(self.accepted));
            }
            Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "cut off")))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_partial_write_is_resent_first_after_reconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = listener.local_addr().unwrap();
        let config = ConnectionConfig {
            ping_interval_ms: None,
            ..Default::default()
        };
        let shared = Arc::new(Shared::new());
        let (mut engine, _commands) =
            Engine::new(endpoint, config, Logger::new(endpoint, None), shared.clone());

        let (reader, _peer) = tokio::io::duplex(64);
        engine.attach(reader, CutOffWriter::default());
        assert_eq!(engine.state, ConnState::Connected);

        let first = pack_with(Packer::with_sync(1, 101), ("cut off mid-frame",));
        let second = pack_with(Packer::with_sync(2, 102), ("queued behind",));
        let first_bytes = first.as_bytes().to_vec();
        let second_bytes = second.as_bytes().to_vec();
        engine.handle_write(first, None);
        engine.handle_write(second, None);
        assert!(shared.write_active.load(Ordering::Acquire));

        let event = engine.events.recv().await.unwrap();
        assert!(matches!(event, Event::WriteFailed { partial: true, .. }));
        engine.handle_event(event);
        assert_eq!(engine.state, ConnState::Connecting);
        assert_eq!(engine.write_queue.len(), 2);
        assert!(!shared.write_active.load(Ordering::Acquire));

        tokio::spawn(engine.run());
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut frames = FrameBuffer::new();
        let mut received = Vec::new();
        while received.len() < 2 {
            match frames.next_frame().unwrap() {
                Some(packet) => received.push(packet.as_bytes().to_vec()),
                None => {
                    frames.read_from(&mut socket).await.unwrap();
                }
            }
        }
        assert_eq!(received, vec![first_bytes, second_bytes]);
    }

    #[test]
    fn test_logger_prefixes_sink_lines() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let captured = lines.clone();
        let sink: LogSink = Arc::new(move |line: &str| captured.lock().unwrap().push(line.to_string()));
        let logger = Logger::new("127.0.0.1:3301".parse().unwrap(), Some(sink));

        logger.warn(format_args!("read failed: {}", "eof"));

        let lines = lines.lock().unwrap();
        assert_eq!(lines.as_slice(), ["[iproto_conn] 127.0.0.1:3301: read failed: eof"]);
    }

    #[test]
    fn test_invoke_delivers_result() {
        let (tx, rx) = std::sync::mpsc::channel();
        invoke(
            Box::new(move |result: RequestResult| tx.send(result.code()).unwrap()),
            RequestResult::Timeout,
        );
        assert_eq!(rx.recv().unwrap(), crate::connection::ResultCode::Timeout);
    }
}

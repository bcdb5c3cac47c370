//! Multiplexing connection to one iproto endpoint.
//!
//! A [`Connection`] pipelines any number of requests over a single TCP
//! socket and matches responses back to requests by sync id. Every request
//! written with [`Connection::write`] is resolved exactly once, with one of:
//!
//! - [`RequestResult::Ok`] carrying the response packet
//! - [`RequestResult::Timeout`] when its own deadline passes first
//! - [`RequestResult::Error`] when the connection is torn down first
//!
//! Transport failures never surface as errors. The connection closes the
//! socket, dismisses whatever was pending and reconnects on its own.
//!
//! # Example
//!
//! ```no_run
//! use iproto_client::codec::{pack, unpack};
//! use iproto_client::Connection;
//!
//! # async fn run() -> iproto_client::Result<()> {
//! let conn = Connection::builder("127.0.0.1:3301".parse().unwrap())
//!     .read_timeout(std::time::Duration::from_millis(200))
//!     .build();
//!
//! let result = conn.request(pack(100, 0, (42u32,))).await?;
//! if let Some(mut packet) = result.into_packet() {
//!     let (value,): (u32,) = unpack(&mut packet)?;
//!     println!("got {value}");
//! }
//! # Ok(())
//! # }
//! ```

mod engine;
mod pending;
mod result;
mod transport;

pub use result::{RequestResult, ResultCode};

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::config::ConnectionConfig;
use crate::error::{IprotoError, Result};
use crate::protocol::Packet;
use engine::{Command, Engine, Logger};

/// Completion callback for one request.
pub type Callback = Box<dyn FnOnce(RequestResult) + Send + 'static>;

/// Optional sink receiving one formatted line per engine warning.
pub type LogSink = Arc<dyn Fn(&str) + Send + Sync + 'static>;

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnState {
    /// No socket and no connect attempt running.
    Disconnected = 0,
    /// A connect attempt is running.
    Connecting = 1,
    /// Socket established; reads and writes are flowing.
    Connected = 2,
    /// Terminal. No further requests are accepted.
    ShuttingDown = 3,
}

impl ConnState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::ShuttingDown,
            _ => Self::Disconnected,
        }
    }
}

/// State observed by the handle and maintained by the engine.
pub(crate) struct Shared {
    pub(crate) state: AtomicU8,
    pub(crate) shutting_down: AtomicBool,
    /// User requests accepted and not yet resolved.
    pub(crate) pending: AtomicUsize,
    /// A user buffer is on the socket right now.
    pub(crate) write_active: AtomicBool,
}

impl Shared {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(ConnState::Disconnected as u8),
            shutting_down: AtomicBool::new(false),
            pending: AtomicUsize::new(0),
            write_active: AtomicBool::new(false),
        }
    }
}

/// Builder for a [`Connection`].
///
/// ```no_run
/// use std::time::Duration;
/// use iproto_client::Connection;
///
/// # async fn run() {
/// let conn = Connection::builder("127.0.0.1:3301".parse().unwrap())
///     .connect_timeout(Duration::from_millis(500))
///     .ping_interval(None)
///     .log_sink(|line| eprintln!("{line}"))
///     .build();
/// # }
/// ```
pub struct ConnectionBuilder {
    endpoint: SocketAddr,
    config: ConnectionConfig,
    sink: Option<LogSink>,
}

impl ConnectionBuilder {
    /// Create a builder for `endpoint` with default settings.
    pub fn new(endpoint: SocketAddr) -> Self {
        Self {
            endpoint,
            config: ConnectionConfig::default(),
            sink: None,
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Bound on one connect attempt, also the reconnect cadence.
    ///
    /// Default: 1 second
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout_ms = duration_ms(timeout);
        self
    }

    /// Per-request deadline.
    ///
    /// Default: same as the connect timeout
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout_ms = duration_ms(timeout);
        self
    }

    /// Liveness ping interval; `None` disables pings.
    ///
    /// Default: 5 seconds
    pub fn ping_interval(mut self, interval: Option<Duration>) -> Self {
        self.config.ping_interval_ms = interval.map(duration_ms);
        self
    }

    /// Largest accepted inbound payload.
    pub fn max_payload_size(mut self, size: u32) -> Self {
        self.config.max_payload_size = size;
        self
    }

    /// Set `TCP_NODELAY` on new sockets.
    pub fn nodelay(mut self, nodelay: bool) -> Self {
        self.config.nodelay = nodelay;
        self
    }

    /// Receive engine warnings as formatted lines.
    pub fn log_sink<F>(mut self, sink: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.sink = Some(Arc::new(sink));
        self
    }

    /// Spawn the engine and return the handle.
    ///
    /// Must be called from within a Tokio runtime. No socket is opened
    /// until the first write.
    pub fn build(self) -> Connection {
        let shared = Arc::new(Shared::new());
        let logger = Logger::new(self.endpoint, self.sink);
        let commands = Engine::spawn(self.endpoint, self.config, logger, shared.clone());
        Connection {
            endpoint: self.endpoint,
            commands,
            shared,
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Handle to a multiplexed connection.
///
/// Dropping the handle shuts the connection down and dismisses every
/// pending request with [`RequestResult::Error`].
pub struct Connection {
    endpoint: SocketAddr,
    commands: mpsc::UnboundedSender<Command>,
    shared: Arc<Shared>,
}

impl Connection {
    /// Start building a connection to `endpoint`.
    pub fn builder(endpoint: SocketAddr) -> ConnectionBuilder {
        ConnectionBuilder::new(endpoint)
    }

    /// Connect to `endpoint` with `config` and no log sink.
    pub fn new(endpoint: SocketAddr, config: ConnectionConfig) -> Self {
        ConnectionBuilder::new(endpoint).config(config).build()
    }

    /// Queue `packet` and call `callback` once with its outcome.
    ///
    /// Returns `false` if the connection is shutting down; the callback is
    /// then dropped without being called. Callbacks run on the engine task
    /// and must not block. A callback that panics aborts the process.
    pub fn write<F>(&self, packet: Packet, callback: F) -> bool
    where
        F: FnOnce(RequestResult) + Send + 'static,
    {
        self.submit(packet, Some(Box::new(callback)))
    }

    /// Queue `packet` without waiting for a response.
    pub fn send(&self, packet: Packet) -> bool {
        self.submit(packet, None)
    }

    /// Write `packet` and wait for its outcome.
    pub async fn request(&self, packet: Packet) -> Result<RequestResult> {
        let (tx, rx) = oneshot::channel();
        let accepted = self.write(packet, move |result| {
            let _ = tx.send(result);
        });
        if !accepted {
            return Err(IprotoError::ShuttingDown);
        }
        Ok(rx.await.unwrap_or(RequestResult::Error))
    }

    fn submit(&self, packet: Packet, callback: Option<Callback>) -> bool {
        if self.is_shutting_down() {
            return false;
        }
        let tracked = callback.is_some();
        if tracked {
            self.shared.pending.fetch_add(1, Ordering::AcqRel);
        }

        if self.commands.send(Command::Write { packet, callback }).is_err() {
            // Engine already gone; the rejected callback is dropped uncalled.
            if tracked {
                self.shared.pending.fetch_sub(1, Ordering::AcqRel);
            }
            return false;
        }
        true
    }

    /// Close the socket and dismiss every pending request, unconditionally.
    pub fn shutdown(&self) {
        self.shared.shutting_down.store(true, Ordering::Release);
        let _ = self.commands.send(Command::Shutdown);
    }

    /// Shut down only if no request is pending and no write is in flight.
    ///
    /// Only a buffer already handed to the socket counts as in flight.
    /// Buffers still queued behind a connect attempt do not, and are
    /// discarded by the shutdown. Returns whether the connection is now
    /// shutting down; callers can poll this until it returns `true`.
    pub fn gentle_shutdown(&self) -> bool {
        if self.is_shutting_down() {
            return true;
        }
        if self.shared.pending.load(Ordering::Acquire) != 0
            || self.shared.write_active.load(Ordering::Acquire)
        {
            return false;
        }
        self.shutdown();
        true
    }

    /// Stop sending liveness pings.
    pub fn disable_ping(&self) {
        let _ = self.commands.send(Command::DisablePing);
    }

    /// Tear down the current socket and connect again.
    ///
    /// Pending requests are dismissed with [`RequestResult::Error`].
    pub fn reconnect(&self) {
        let _ = self.commands.send(Command::Reconnect);
    }

    /// Target endpoint.
    pub fn endpoint(&self) -> SocketAddr {
        self.endpoint
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnState {
        ConnState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    /// Number of user requests accepted and not yet resolved.
    pub fn pending_requests(&self) -> usize {
        self.shared.pending.load(Ordering::Acquire)
    }

    /// True once [`shutdown`](Self::shutdown) has been requested.
    pub fn is_shutting_down(&self) -> bool {
        self.shared.shutting_down.load(Ordering::Acquire)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.endpoint)
            .field("state", &self.state())
            .field("pending", &self.pending_requests())
            .finish()
    }
}

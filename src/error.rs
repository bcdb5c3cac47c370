//! Error types for iproto-client.

use thiserror::Error;

/// Main error type for codec and transport operations.
///
/// Request outcomes delivered to callbacks are not errors; see
/// [`RequestResult`](crate::connection::RequestResult).
#[derive(Debug, Error)]
pub enum IprotoError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Not enough bytes left in the packet for the requested field.
    #[error("Tuple mismatch: {0}")]
    TupleMismatch(String),

    /// Field bytes are present but malformed (bad UTF-8, overlong BER size).
    #[error("Tuple invalid: {0}")]
    TupleInvalid(String),

    /// Protocol error (oversized frame, truncated header, etc.).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Connection closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The connection is shutting down and accepts no more work.
    #[error("Connection is shutting down")]
    ShuttingDown,
}

impl IprotoError {
    /// True for the decode errors raised by the unpacker.
    pub fn is_decode_error(&self) -> bool {
        matches!(self, Self::TupleMismatch(_) | Self::TupleInvalid(_))
    }
}

/// Result type alias using IprotoError.
pub type Result<T> = std::result::Result<T, IprotoError>;

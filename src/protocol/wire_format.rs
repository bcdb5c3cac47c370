//! Wire format encoding and decoding.
//!
//! Implements the 12-byte header format:
//! ```text
//! ┌──────────┬──────────┬──────────┐
//! │ Msg      │ Len      │ Sync     │
//! │ 4 bytes  │ 4 bytes  │ 4 bytes  │
//! │ uint32   │ uint32   │ uint32   │
//! └──────────┴──────────┴──────────┘
//! ```
//!
//! Fields are written in host byte order. There is no magic, version or
//! checksum, so both peers must agree on endianness out of band.

use crate::error::{IprotoError, Result};

/// Header size in bytes (fixed, exactly 12).
pub const HEADER_SIZE: usize = 12;

/// Default maximum payload size accepted from the wire (1 GB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 1_073_741_824;

/// Reserved message id used for liveness pings.
///
/// Application commands must never use this value.
pub const PING_MSG: u32 = 0xFF00;

/// Decoded header from wire format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Header {
    /// Command / type identifier.
    pub msg: u32,
    /// Payload length in bytes, header excluded.
    pub len: u32,
    /// Correlation id matching a request to its response.
    pub sync: u32,
}

impl Header {
    /// Create a new header.
    pub fn new(msg: u32, len: u32, sync: u32) -> Self {
        Self { msg, len, sync }
    }

    /// Encode header to bytes (host byte order).
    ///
    /// # Example
    ///
    /// ```
    /// use iproto_client::protocol::{Header, HEADER_SIZE};
    ///
    /// let header = Header::new(100, 4, 1);
    /// assert_eq!(header.encode().len(), HEADER_SIZE);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode header into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than `HEADER_SIZE` (12 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.msg.to_ne_bytes());
        buf[4..8].copy_from_slice(&self.len.to_ne_bytes());
        buf[8..12].copy_from_slice(&self.sync.to_ne_bytes());
    }

    /// Decode header from bytes (host byte order).
    ///
    /// Returns `None` if buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            msg: u32::from_ne_bytes([buf[0], buf[1], buf[2], buf[3]]),
            len: u32::from_ne_bytes([buf[4], buf[5], buf[6], buf[7]]),
            sync: u32::from_ne_bytes([buf[8], buf[9], buf[10], buf[11]]),
        })
    }

    /// Total frame size on the wire (header + payload).
    #[inline]
    pub fn frame_size(&self) -> usize {
        HEADER_SIZE + self.len as usize
    }

    /// Validate the payload length against a limit.
    pub fn validate(&self, max_payload_size: u32) -> Result<()> {
        if self.len > max_payload_size {
            return Err(IprotoError::Protocol(format!(
                "Payload size {} exceeds maximum {}",
                self.len, max_payload_size
            )));
        }
        Ok(())
    }

    /// Check if this is a liveness ping.
    #[inline]
    pub fn is_ping(&self) -> bool {
        self.msg == PING_MSG
    }
}

//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for zero-copy buffer management. Frames are found
//! by peeking the header at the front of the buffer: once the buffer holds
//! `HEADER_SIZE + len` bytes, the frame is split off as a [`Packet`];
//! otherwise the reader is asked for at least the shortfall.
//!
//! # Example
//!
//! ```
//! use iproto_client::protocol::{FrameBuffer, Header};
//!
//! let mut buffer = FrameBuffer::new();
//! let mut bytes = Header::new(1, 2, 42).encode().to_vec();
//! bytes.extend_from_slice(b"hi");
//!
//! let packets = buffer.push(&bytes).unwrap();
//! assert_eq!(packets.len(), 1);
//! assert_eq!(packets[0].sync(), 42);
//! ```

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::packet::Packet;
use super::wire_format::{Header, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE};
use crate::error::{IprotoError, Result};

/// Initial receive buffer capacity.
const DEFAULT_CAPACITY: usize = 64 * 1024;

/// Buffer for accumulating incoming bytes and extracting complete frames.
pub struct FrameBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Maximum allowed payload size.
    max_payload_size: u32,
}

impl FrameBuffer {
    /// Create a new frame buffer with default settings.
    ///
    /// Default capacity: 64KB, max payload: 1GB.
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD_SIZE)
    }

    /// Create a new frame buffer with custom max payload size.
    pub fn with_max_payload(max_payload_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(DEFAULT_CAPACITY),
            max_payload_size,
        }
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// Partial trailing data stays buffered for the next push.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Packet>> {
        self.buffer.extend_from_slice(data);

        let mut packets = Vec::new();
        while let Some(packet) = self.next_frame()? {
            packets.push(packet);
        }
        Ok(packets)
    }

    /// Split the next complete frame off the front of the buffer.
    ///
    /// Returns:
    /// - `Ok(Some(packet))` if a complete frame was buffered
    /// - `Ok(None)` if more data is needed
    /// - `Err(...)` if the header announces an oversized payload
    pub fn next_frame(&mut self) -> Result<Option<Packet>> {
        let Some(header) = self.peek_header() else {
            return Ok(None);
        };
        header.validate(self.max_payload_size)?;

        let frame_size = header.frame_size();
        if self.buffer.len() < frame_size {
            return Ok(None);
        }

        let frame = self.buffer.split_to(frame_size).freeze();
        Ok(Some(Packet::from_parts(header, frame)))
    }

    /// Bytes still missing before the next frame is complete.
    ///
    /// While no full header is buffered this is the header shortfall.
    pub fn shortfall(&self) -> usize {
        let wanted = match self.peek_header() {
            Some(header) => header.frame_size(),
            None => HEADER_SIZE,
        };
        wanted.saturating_sub(self.buffer.len())
    }

    /// Read from `reader` until at least the current shortfall is buffered.
    ///
    /// Returns the number of bytes read. End of stream before the shortfall
    /// is met is reported as [`IprotoError::ConnectionClosed`].
    pub async fn read_from<R>(&mut self, reader: &mut R) -> Result<usize>
    where
        R: AsyncRead + Unpin,
    {
        let wanted = self.shortfall().max(1);
        self.buffer.reserve(wanted);

        let mut total = 0;
        while total < wanted {
            let n = reader.read_buf(&mut self.buffer).await?;
            if n == 0 {
                return Err(IprotoError::ConnectionClosed);
            }
            total += n;
        }
        Ok(total)
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    fn peek_header(&self) -> Option<Header> {
        Header::decode(&self.buffer)
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

//! Packet: one owned `[Header][payload]` buffer plus a decode cursor.
//!
//! Outbound packets are produced by the [`Packer`](crate::codec::Packer).
//! Inbound packets are split off the receive buffer by the
//! [`FrameBuffer`](super::FrameBuffer) without copying.
//!
//! # Example
//!
//! ```
//! use iproto_client::protocol::{Header, Packet};
//!
//! let mut frame = Header::new(7, 3, 42).encode().to_vec();
//! frame.extend_from_slice(b"abc");
//!
//! let packet = Packet::from_frame(frame.into()).unwrap();
//! assert_eq!(packet.msg(), 7);
//! assert_eq!(packet.sync(), 42);
//! assert_eq!(packet.payload(), b"abc");
//! ```

use bytes::Bytes;

use super::dump::hex_dump;
use super::wire_format::{Header, HEADER_SIZE};
use crate::error::{IprotoError, Result};

/// A complete protocol packet.
///
/// The packet owns its buffer; it is movable but not `Clone`. The decode
/// cursor only matters while unpacking and never moves past the end of the
/// buffer.
#[derive(Debug, Default)]
pub struct Packet {
    header: Header,
    data: Bytes,
    ofs: usize,
}

impl Packet {
    /// Wrap an already encoded buffer whose header matches `header`.
    pub(crate) fn from_parts(header: Header, data: Bytes) -> Self {
        debug_assert_eq!(data.len(), header.frame_size());
        Self {
            header,
            data,
            ofs: HEADER_SIZE,
        }
    }

    /// Build a packet from one complete wire frame.
    ///
    /// Fails if the buffer is shorter than a header or if the header's
    /// length field does not match the bytes that follow it.
    pub fn from_frame(frame: Bytes) -> Result<Self> {
        let header = Header::decode(&frame).ok_or_else(|| {
            IprotoError::Protocol(format!("Frame of {} bytes has no header", frame.len()))
        })?;
        if header.frame_size() != frame.len() {
            return Err(IprotoError::Protocol(format!(
                "Frame length mismatch: header says {} payload bytes, got {}",
                header.len,
                frame.len() - HEADER_SIZE
            )));
        }
        Ok(Self::from_parts(header, frame))
    }

    /// Decoded header.
    #[inline]
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Command / type identifier.
    #[inline]
    pub fn msg(&self) -> u32 {
        self.header.msg
    }

    /// Correlation id.
    #[inline]
    pub fn sync(&self) -> u32 {
        self.header.sync
    }

    /// Payload length in bytes.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.header.len as usize
    }

    /// Payload bytes (header excluded).
    #[inline]
    pub fn payload(&self) -> &[u8] {
        self.data.get(HEADER_SIZE..).unwrap_or_default()
    }

    /// Whole encoded buffer, header included.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consume the packet, returning the encoded buffer.
    #[inline]
    pub fn into_bytes(self) -> Bytes {
        self.data
    }

    /// True for a default-constructed packet that owns no buffer.
    #[inline]
    pub fn is_uninitialized(&self) -> bool {
        self.data.is_empty()
    }

    /// Decode cursor position, relative to the first payload byte.
    #[inline]
    pub fn offset(&self) -> usize {
        self.ofs.saturating_sub(HEADER_SIZE)
    }

    /// Payload bytes not yet consumed by the unpacker.
    #[inline]
    pub fn bytes_left(&self) -> usize {
        self.data.len().saturating_sub(self.ofs)
    }

    /// Rewind the decode cursor and re-read the header from the buffer.
    pub fn reset(&mut self) {
        if let Some(header) = Header::decode(&self.data) {
            self.header = header;
        }
        self.ofs = HEADER_SIZE;
    }

    /// Move the cursor to `offset` bytes past the payload start.
    pub(crate) fn seek(&mut self, offset: usize) {
        self.ofs = (HEADER_SIZE + offset).min(self.data.len());
    }

    /// Take the next `n` payload bytes, advancing the cursor.
    pub(crate) fn take(&mut self, n: usize) -> Result<Bytes> {
        if n > self.bytes_left() {
            return Err(IprotoError::TupleMismatch(format!(
                "Tuple mismatch at offset {}: need {} bytes, {} left",
                self.offset(),
                n,
                self.bytes_left()
            )));
        }
        let bytes = self.data.slice(self.ofs..self.ofs + n);
        self.ofs += n;
        Ok(bytes)
    }

    /// Take the next `N` payload bytes as a fixed array.
    pub(crate) fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let bytes = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&bytes);
        Ok(out)
    }

    /// Take every remaining payload byte.
    pub(crate) fn take_rest(&mut self) -> Bytes {
        let rest = self.data.slice(self.ofs.min(self.data.len())..);
        self.ofs = self.data.len();
        rest
    }

    /// Human-readable hex + ASCII dump of the whole buffer.
    pub fn dump(&self) -> String {
        if self.is_uninitialized() {
            return "(Packet uninitialized)".to_string();
        }
        format!(
            "IProto packet msg={} sync={} len={} cur_ofs={} data:\n{}",
            self.header.msg,
            self.header.sync,
            self.header.len,
            self.offset(),
            hex_dump(&self.data)
        )
    }
}

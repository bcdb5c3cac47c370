//! Packet builder.

use bytes::{BufMut, BytesMut};

use super::ber;
use super::sync::SyncAllocator;
use super::{flags, PackField};
use crate::protocol::{Header, Packet, HEADER_SIZE};

/// Initial payload capacity reserved per packet.
const INITIAL_PAYLOAD_CAPACITY: usize = 4 * std::mem::size_of::<u32>();

/// Incremental builder for an outbound [`Packet`].
///
/// The header slot is reserved up front and filled in by
/// [`finish`](Self::finish) once the payload length is known.
///
/// # Example
///
/// ```
/// use iproto_client::codec::{Packer, SyncAllocator};
///
/// let ids = SyncAllocator::new(1);
/// let mut packer = Packer::with_allocator(100, &ids);
/// packer.put(&42u32).put("name");
/// let packet = packer.finish();
///
/// assert_eq!(packet.msg(), 100);
/// assert_eq!(packet.sync(), 1);
/// assert_eq!(packet.payload_len(), 4 + 4 + 4);
/// ```
#[derive(Debug)]
pub struct Packer {
    msg: u32,
    sync: u32,
    flags: u32,
    buf: BytesMut,
}

impl Packer {
    /// Start a packet whose sync comes from the process-wide allocator.
    pub fn new(msg: u32) -> Self {
        Self::with_allocator(msg, SyncAllocator::global())
    }

    /// Start a packet whose sync comes from `allocator`.
    pub fn with_allocator(msg: u32, allocator: &SyncAllocator) -> Self {
        Self::with_sync(msg, allocator.allocate())
    }

    /// Start a packet with an explicit sync id.
    pub fn with_sync(msg: u32, sync: u32) -> Self {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + INITIAL_PAYLOAD_CAPACITY);
        buf.put_bytes(0, HEADER_SIZE);
        Self {
            msg,
            sync,
            flags: 0,
            buf,
        }
    }

    /// Set packing flags (see [`flags`]).
    pub fn flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    /// Currently active packing flags.
    #[inline]
    pub fn packing_flags(&self) -> u32 {
        self.flags
    }

    /// Sync id this packet will carry.
    #[inline]
    pub fn sync(&self) -> u32 {
        self.sync
    }

    /// Payload bytes written so far.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.buf.len() - HEADER_SIZE
    }

    /// Append one field.
    pub fn put<T: PackField + ?Sized>(&mut self, value: &T) -> &mut Self {
        value.pack_field(self);
        self
    }

    /// Append raw bytes with no length prefix.
    pub fn put_raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.grow(bytes.len());
        self.buf.put_slice(bytes);
        self
    }

    /// Append a length prefix followed by the bytes.
    ///
    /// The prefix is a 4-byte integer unless [`flags::BER_PACK`] is set.
    pub fn put_prefixed(&mut self, bytes: &[u8]) -> &mut Self {
        let size = bytes.len() as u32;
        if self.flags & flags::BER_PACK != 0 {
            self.put_ber_size(size);
        } else {
            self.put_raw(&size.to_ne_bytes());
        }
        self.put_raw(bytes)
    }

    /// Append a BER-encoded size.
    pub fn put_ber_size(&mut self, size: u32) -> &mut Self {
        let mut encoded = Vec::with_capacity(ber::MAX_BER_LEN);
        ber::encode_size(size, &mut encoded);
        self.put_raw(&encoded)
    }

    /// Write the header and return the finished packet.
    pub fn finish(mut self) -> Packet {
        let header = Header::new(self.msg, self.payload_len() as u32, self.sync);
        header.encode_into(&mut self.buf[..HEADER_SIZE]);
        Packet::from_parts(header, self.buf.freeze())
    }

    /// Geometric growth: at least double the capacity when out of room.
    fn grow(&mut self, additional: usize) {
        let spare = self.buf.capacity() - self.buf.len();
        if additional > spare {
            self.buf.reserve(additional.max(self.buf.capacity()));
        }
    }
}

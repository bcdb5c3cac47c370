//! Field kinds supported by the packer and unpacker.
//!
//! | Rust type                  | Wire layout                               |
//! |----------------------------|-------------------------------------------|
//! | `u8`, `u16`, `u32`, `u64`  | fixed width, host byte order              |
//! | `str`, `String`            | length prefix + UTF-8 bytes               |
//! | `[u8]`, `Vec<u8>`, `Bytes` | length prefix + raw bytes                 |
//! | [`Ber<T>`]                 | BER length prefix + bytes (both ways)     |
//! | [`Raw`] / [`Tail`]         | raw bytes, no prefix, rest of the payload |
//!
//! The length prefix is a 4-byte integer unless the packer carries
//! [`BER_PACK`](super::flags::BER_PACK); decoding always expects the 4-byte
//! form except for [`Ber<T>`].

use bytes::Bytes;

use super::ber;
use super::packer::Packer;
use super::{PackField, UnpackField};
use crate::error::{IprotoError, Result};
use crate::protocol::Packet;

macro_rules! impl_int_field {
    ($($ty:ty),*) => {
        $(
            impl PackField for $ty {
                fn pack_field(&self, packer: &mut Packer) {
                    packer.put_raw(&self.to_ne_bytes());
                }
            }

            impl UnpackField for $ty {
                fn unpack_field(packet: &mut Packet) -> Result<Self> {
                    packet.take_array().map(<$ty>::from_ne_bytes)
                }
            }
        )*
    };
}

impl_int_field!(u8, u16, u32, u64);

impl<T: PackField + ?Sized> PackField for &T {
    fn pack_field(&self, packer: &mut Packer) {
        (**self).pack_field(packer);
    }
}

impl PackField for str {
    fn pack_field(&self, packer: &mut Packer) {
        packer.put_prefixed(self.as_bytes());
    }
}

impl PackField for String {
    fn pack_field(&self, packer: &mut Packer) {
        packer.put_prefixed(self.as_bytes());
    }
}

impl PackField for [u8] {
    fn pack_field(&self, packer: &mut Packer) {
        packer.put_prefixed(self);
    }
}

impl PackField for Vec<u8> {
    fn pack_field(&self, packer: &mut Packer) {
        packer.put_prefixed(self);
    }
}

impl PackField for Bytes {
    fn pack_field(&self, packer: &mut Packer) {
        packer.put_prefixed(self);
    }
}

/// Read a 4-byte length prefix and the bytes it announces.
fn take_prefixed(packet: &mut Packet) -> Result<Bytes> {
    let len = u32::unpack_field(packet)? as usize;
    if len > packet.bytes_left() {
        return Err(IprotoError::TupleMismatch(format!(
            "Tuple mismatch inside string at offset {} len={}",
            packet.offset(),
            len
        )));
    }
    packet.take(len)
}

fn into_utf8(bytes: Bytes) -> Result<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|e| IprotoError::TupleInvalid(format!("String is not valid UTF-8: {e}")))
}

impl UnpackField for String {
    fn unpack_field(packet: &mut Packet) -> Result<Self> {
        take_prefixed(packet).and_then(into_utf8)
    }
}

impl UnpackField for Vec<u8> {
    fn unpack_field(packet: &mut Packet) -> Result<Self> {
        take_prefixed(packet).map(|b| b.to_vec())
    }
}

impl UnpackField for Bytes {
    fn unpack_field(packet: &mut Packet) -> Result<Self> {
        take_prefixed(packet)
    }
}

/// Externally owned bytes packed verbatim, with no length prefix.
///
/// Only meaningful as the last field: the reader has no way to tell where
/// it ends other than the end of the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Raw<'a>(pub &'a [u8]);

impl PackField for Raw<'_> {
    fn pack_field(&self, packer: &mut Packer) {
        packer.put_raw(self.0);
    }
}

/// Every payload byte left after the preceding fields.
///
/// Decoding never fails; an exhausted packet yields an empty tail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tail(pub Bytes);

impl PackField for Tail {
    fn pack_field(&self, packer: &mut Packer) {
        packer.put_raw(&self.0);
    }
}

impl UnpackField for Tail {
    fn unpack_field(packet: &mut Packet) -> Result<Self> {
        Ok(Self(packet.take_rest()))
    }
}

/// Byte string with a BER length prefix, regardless of packer flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ber<T>(pub T);

impl<T: AsRef<[u8]>> PackField for Ber<T> {
    fn pack_field(&self, packer: &mut Packer) {
        let bytes = self.0.as_ref();
        packer.put_ber_size(bytes.len() as u32);
        packer.put_raw(bytes);
    }
}

fn take_ber_prefixed(packet: &mut Packet) -> Result<Bytes> {
    let window = packet.bytes_left().min(ber::MAX_BER_LEN);
    let start = packet.offset();
    let (len, consumed) = {
        let rest = &packet.payload()[start..start + window];
        ber::decode_size(rest)?
    };
    packet.take(consumed)?;
    let len = len as usize;
    if len > packet.bytes_left() {
        return Err(IprotoError::TupleMismatch(format!(
            "Tuple mismatch inside BER string at offset {} len={}",
            packet.offset(),
            len
        )));
    }
    packet.take(len)
}

impl UnpackField for Ber<String> {
    fn unpack_field(packet: &mut Packet) -> Result<Self> {
        take_ber_prefixed(packet).and_then(into_utf8).map(Ber)
    }
}

impl UnpackField for Ber<Vec<u8>> {
    fn unpack_field(packet: &mut Packet) -> Result<Self> {
        take_ber_prefixed(packet).map(|b| Ber(b.to_vec()))
    }
}

impl UnpackField for Ber<Bytes> {
    fn unpack_field(packet: &mut Packet) -> Result<Self> {
        take_ber_prefixed(packet).map(Ber)
    }
}

//! Codec module - typed packing and unpacking of packet payloads.
//!
//! - [`Packer`] builds an outbound [`Packet`] field by field
//! - [`pack`] / [`unpack`] work on whole tuples of fields
//! - [`SyncAllocator`] hands out correlation ids
//!
//! Fields are decoded in the order they were written. A decode that runs
//! out of bytes fails with [`IprotoError::TupleMismatch`]; malformed content
//! fails with [`IprotoError::TupleInvalid`]. Codec errors are returned to the
//! caller; they never travel through request callbacks.
//!
//! # Example
//!
//! ```
//! use iproto_client::codec::{pack, unpack};
//!
//! let mut packet = pack(100, 0, (42u32, "test"));
//! assert_eq!(packet.msg(), 100);
//!
//! let (id, name): (u32, String) = unpack(&mut packet).unwrap();
//! assert_eq!(id, 42);
//! assert_eq!(name, "test");
//! ```
//!
//! [`IprotoError::TupleMismatch`]: crate::error::IprotoError::TupleMismatch
//! [`IprotoError::TupleInvalid`]: crate::error::IprotoError::TupleInvalid

pub mod ber;
mod fields;
mod packer;
mod sync;

pub use fields::{Ber, Raw, Tail};
pub use packer::Packer;
pub use sync::SyncAllocator;

use crate::error::Result;
use crate::protocol::Packet;

/// Packing flags.
pub mod flags {
    /// Write string length prefixes in BER form instead of 4 bytes.
    pub const BER_PACK: u32 = 1;
}

/// A single value that can be appended to a packet.
pub trait PackField {
    /// Append `self` to the packer.
    fn pack_field(&self, packer: &mut Packer);
}

/// A single value that can be read from a packet.
pub trait UnpackField: Sized {
    /// Read one value at the packet's cursor, advancing it.
    fn unpack_field(packet: &mut Packet) -> Result<Self>;
}

/// An ordered group of fields, implemented for tuples of [`PackField`].
pub trait Pack {
    /// Append every field, in order.
    fn pack_into(&self, packer: &mut Packer);
}

/// An ordered group of fields, implemented for tuples of [`UnpackField`].
pub trait Unpack: Sized {
    /// Read every field, in order.
    fn unpack_from(packet: &mut Packet) -> Result<Self>;
}

impl Pack for () {
    fn pack_into(&self, _packer: &mut Packer) {}
}

macro_rules! impl_tuple {
    ($($name:ident),+) => {
        impl<$($name: PackField),+> Pack for ($($name,)+) {
            #[allow(non_snake_case)]
            fn pack_into(&self, packer: &mut Packer) {
                let ($($name,)+) = self;
                $(packer.put($name);)+
            }
        }

        impl<$($name: UnpackField),+> Unpack for ($($name,)+) {
            fn unpack_from(packet: &mut Packet) -> Result<Self> {
                Ok(($($name::unpack_field(packet)?,)+))
            }
        }
    };
}

impl_tuple!(A);
impl_tuple!(A, B);
impl_tuple!(A, B, C);
impl_tuple!(A, B, C, D);
impl_tuple!(A, B, C, D, E);
impl_tuple!(A, B, C, D, E, F);
impl_tuple!(A, B, C, D, E, F, G);
impl_tuple!(A, B, C, D, E, F, G, H);

/// Build a packet for command `msg` with a fresh sync id.
pub fn pack<T: Pack>(msg: u32, flags: u32, fields: T) -> Packet {
    pack_with(Packer::new(msg).flags(flags), fields)
}

/// Build a packet from an already configured [`Packer`].
pub fn pack_with<T: Pack>(mut packer: Packer, fields: T) -> Packet {
    fields.pack_into(&mut packer);
    packer.finish()
}

/// Decode a tuple of fields starting at the packet's cursor.
///
/// On failure the cursor is left where it was before the call.
pub fn unpack<T: Unpack>(packet: &mut Packet) -> Result<T> {
    let start = packet.offset();
    match T::unpack_from(packet) {
        Ok(values) => Ok(values),
        Err(e) => {
            packet.seek(start);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IprotoError;
    use crate::protocol::{Header, HEADER_SIZE};
    use bytes::Bytes;
    use proptest::prelude::*;

    fn packer(msg: u32, sync: u32) -> Packer {
        Packer::with_sync(msg, sync)
    }

    #[test]
    #[cfg(target_endian = "little")]
    fn test_known_byte_layout() {
        let packet = pack_with(packer(100, 1), (42u32,));
        assert_eq!(
            packet.as_bytes(),
            &[
                0x64, 0, 0, 0, //
                0x04, 0, 0, 0, //
                0x01, 0, 0, 0, //
                0x2A, 0, 0, 0,
            ]
        );
    }

    #[test]
    fn test_single_u32() {
        let mut packet = pack_with(packer(123, 1), (12u32,));
        assert_eq!(packet.header().len, 4);
        assert_eq!(packet.sync(), 1);

        let (value,): (u32,) = unpack(&mut packet).unwrap();
        assert_eq!(value, 12);
        assert_eq!(packet.msg(), 123);

        packet.reset();
        assert_eq!(packet.header().len, 4);
        assert_eq!(packet.sync(), 1);
        assert_eq!(unpack::<(u32,)>(&mut packet).unwrap(), (12,));
    }

    #[test]
    fn test_mixed_tuples() {
        let mut packet = pack_with(packer(123, 2), (12u32, "test", 13u32, String::from("test")));
        let decoded: (u32, String, u32, String) = unpack(&mut packet).unwrap();
        assert_eq!(decoded, (12, "test".into(), 13, "test".into()));

        let mut packet = pack_with(packer(123, 3), ("test", 12u32));
        assert_eq!(
            unpack::<(String, u32)>(&mut packet).unwrap(),
            ("test".into(), 12)
        );
    }

    #[test]
    fn test_different_value_not_equal() {
        let mut packet = pack_with(packer(123, 1), (13u32,));
        assert_ne!(unpack::<(u32,)>(&mut packet).unwrap(), (12,));
    }

    #[test]
    fn test_tail_after_fields() {
        let body = Bytes::from_static(b"\x01\x02\x03");
        let mut packet = pack_with(packer(1, 1), (7u8, Raw(&body)));
        let (tag, Tail(tail)): (u8, Tail) = unpack(&mut packet).unwrap();
        assert_eq!(tag, 7);
        assert_eq!(tail, body);
    }

    #[test]
    fn test_unpacking_too_many_fields_fails_and_restores_cursor() {
        let mut packet = pack_with(packer(1, 1), (1u32, 2u8));
        let err = unpack::<(u32, u8, u32)>(&mut packet).unwrap_err();
        assert!(matches!(err, IprotoError::TupleMismatch(_)));
        assert_eq!(packet.offset(), 0);

        assert_eq!(unpack::<(u32, u8)>(&mut packet).unwrap(), (1, 2));
    }

    #[test]
    fn test_sequential_unpack_calls() {
        let mut packet = pack_with(packer(1, 1), (1u32, "a", 2u16));
        let (a,): (u32,) = unpack(&mut packet).unwrap();
        let (b, c): (String, u16) = unpack(&mut packet).unwrap();
        assert_eq!((a, b.as_str(), c), (1, "a", 2));
        assert_eq!(packet.bytes_left(), 0);
    }

    #[test]
    fn test_ber_flag_roundtrip_through_wrapper() {
        let mut packet = pack_with(packer(1, 1).flags(flags::BER_PACK), ("hello", 5u32));
        assert_eq!(packet.payload()[0], 5);

        let (Ber(s), n): (Ber<String>, u32) = unpack(&mut packet).unwrap();
        assert_eq!((s.as_str(), n), ("hello", 5));
    }

    #[test]
    fn test_pack_uses_global_allocator() {
        let a = pack(1, 0, ());
        let b = pack(1, 0, ());
        assert!(b.sync() > a.sync());
        assert_eq!(a.as_bytes().len(), HEADER_SIZE);
    }

    #[test]
    fn test_inbound_frame_unpacks() {
        let mut bytes = Header::new(9, 8, 77).encode().to_vec();
        bytes.extend_from_slice(&5u32.to_ne_bytes());
        bytes.extend_from_slice(&6u32.to_ne_bytes());
        let mut packet = Packet::from_frame(Bytes::from(bytes)).unwrap();
        assert_eq!(unpack::<(u32, u32)>(&mut packet).unwrap(), (5, 6));
    }

    proptest! {
        #[test]
        fn prop_roundtrip(
            msg in any::<u32>(),
            a in any::<u32>(),
            b in any::<u8>(),
            s in ".*",
            v in proptest::collection::vec(any::<u8>(), 0..512),
            w in any::<u64>(),
        ) {
            let mut packet = pack_with(packer(msg, 1), (a, s.as_str(), b, v.clone(), w));
            prop_assert_eq!(packet.msg(), msg);
            let decoded: (u32, String, u8, Vec<u8>, u64) = unpack(&mut packet).unwrap();
            prop_assert_eq!(decoded, (a, s, b, v, w));
            prop_assert_eq!(packet.bytes_left(), 0);
        }

        #[test]
        fn prop_truncated_payload_never_panics(
            v in proptest::collection::vec(any::<u8>(), 0..64),
            cut in 0usize..64,
        ) {
            let packet = pack_with(packer(1, 1), (v.clone(), 9u32));
            let keep = packet.payload_len().min(cut);
            let mut bytes = packet.payload()[..keep].to_vec();
            let mut frame = Header::new(1, keep as u32, 1).encode().to_vec();
            frame.append(&mut bytes);

            let mut truncated = Packet::from_frame(Bytes::from(frame)).unwrap();
            let result = unpack::<(Vec<u8>, u32)>(&mut truncated);
            if keep < packet.payload_len() {
                prop_assert!(result.unwrap_err().is_decode_error());
            } else {
                prop_assert_eq!(result.unwrap(), (v, 9));
            }
        }
    }
}

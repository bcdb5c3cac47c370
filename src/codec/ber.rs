//! BER-style variable-length sizes.
//!
//! A size is written as 7-bit groups, most significant group first. Every
//! byte except the last has the high bit set.
//!
//! ```
//! use iproto_client::codec::ber;
//!
//! let mut out = Vec::new();
//! ber::encode_size(300, &mut out);
//! assert_eq!(out, [0x82, 0x2C]);
//! assert_eq!(ber::decode_size(&out).unwrap(), (300, 2));
//! ```

use crate::error::{IprotoError, Result};

/// Longest encoding of a `u32` size.
pub const MAX_BER_LEN: usize = 5;

const CONTINUATION: u8 = 0x80;
const GROUP_MASK: u32 = 0x7F;

/// Number of bytes [`encode_size`] emits for `size`.
pub fn encoded_len(size: u32) -> usize {
    match size {
        0..=0x7F => 1,
        0x80..=0x3FFF => 2,
        0x4000..=0x1F_FFFF => 3,
        0x20_0000..=0x0FFF_FFFF => 4,
        _ => 5,
    }
}

/// Append the BER encoding of `size` to `out`.
pub fn encode_size(size: u32, out: &mut Vec<u8>) {
    let len = encoded_len(size);
    for group in (1..len).rev() {
        out.push(((size >> (7 * group)) & GROUP_MASK) as u8 | CONTINUATION);
    }
    out.push((size & GROUP_MASK) as u8);
}

/// Decode a BER size from the front of `buf`.
///
/// Returns the size and the number of bytes consumed. Fails with
/// `TupleMismatch` if `buf` ends before the final byte and with
/// `TupleInvalid` if the encoding is longer than a `u32` allows.
pub fn decode_size(buf: &[u8]) -> Result<(u32, usize)> {
    let mut size: u64 = 0;
    for (i, &byte) in buf.iter().enumerate() {
        if i >= MAX_BER_LEN {
            break;
        }
        size = (size << 7) | u64::from(byte & GROUP_MASK as u8);
        if byte & CONTINUATION == 0 {
            let size = u32::try_from(size).map_err(|_| {
                IprotoError::TupleInvalid(format!("BER size {size} overflows u32"))
            })?;
            return Ok((size, i + 1));
        }
    }
    if buf.len() >= MAX_BER_LEN {
        return Err(IprotoError::TupleInvalid(format!(
            "BER size longer than {MAX_BER_LEN} bytes"
        )));
    }
    Err(IprotoError::TupleMismatch(format!(
        "BER size truncated after {} bytes",
        buf.len()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(size: u32) -> Vec<u8> {
        let mut out = Vec::new();
        encode_size(size, &mut out);
        out
    }

    #[test]
    fn test_single_byte_sizes() {
        assert_eq!(encode(0), [0x00]);
        assert_eq!(encode(0x7F), [0x7F]);
    }

    #[test]
    fn test_group_boundaries() {
        assert_eq!(encode(0x80), [0x81, 0x00]);
        assert_eq!(encode(0x3FFF), [0xFF, 0x7F]);
        assert_eq!(encode(0x4000), [0x81, 0x80, 0x00]);
        assert_eq!(encode(1 << 28), [0x81, 0x80, 0x80, 0x80, 0x00]);
        assert_eq!(encode(u32::MAX), [0x8F, 0xFF, 0xFF, 0xFF, 0x7F]);
    }

    #[test]
    fn test_encoded_len_matches_output() {
        for size in [0, 1, 127, 128, 16_383, 16_384, 2_097_151, 2_097_152, u32::MAX] {
            assert_eq!(encode(size).len(), encoded_len(size), "size {size}");
        }
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        assert_eq!(decode_size(&[0x82, 0x2C, 0xFF]).unwrap(), (300, 2));
    }

    #[test]
    fn test_decode_truncated() {
        let err = decode_size(&[0x82]).unwrap_err();
        assert!(matches!(err, IprotoError::TupleMismatch(_)));
        assert!(matches!(
            decode_size(&[]).unwrap_err(),
            IprotoError::TupleMismatch(_)
        ));
    }

    #[test]
    fn test_decode_overlong() {
        let err = decode_size(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00]).unwrap_err();
        assert!(matches!(err, IprotoError::TupleInvalid(_)));

        let err = decode_size(&[0xFF, 0xFF, 0xFF, 0xFF, 0x7F]).unwrap_err();
        assert!(matches!(err, IprotoError::TupleInvalid(_)));
    }
}

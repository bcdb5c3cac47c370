//! Protocol module - wire format, packets and framing.
//!
//! This module implements the binary layer below the connection engine:
//! - 12-byte header encoding/decoding
//! - Packet with an owned buffer and decode cursor
//! - Frame buffer for accumulating partial reads
//! - Hex dump for diagnostics

mod dump;
mod frame_buffer;
mod packet;
mod wire_format;

pub use dump::hex_dump;
pub use frame_buffer::FrameBuffer;
pub use packet::Packet;
pub use wire_format::{Header, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE, PING_MSG};

//! Integration tests for iproto-client.
//!
//! These tests verify the codec and framing layers working together, as a
//! peer would see the bytes on the wire.

use iproto_client::codec::{flags, pack, pack_with, unpack, Ber, Packer, Raw, SyncAllocator, Tail};
use iproto_client::protocol::{FrameBuffer, Header, HEADER_SIZE, PING_MSG};
use iproto_client::IprotoError;

/// Test full pack -> wire -> frame buffer -> unpack cycle.
#[test]
fn test_packed_request_through_frame_buffer() {
    let packet = pack_with(Packer::with_sync(100, 12345), (42u32, "hello", 7u8));

    let mut buffer = FrameBuffer::new();
    let mut frames = buffer.push(packet.as_bytes()).unwrap();

    assert_eq!(frames.len(), 1);
    let frame = &mut frames[0];

    assert_eq!(frame.msg(), 100);
    assert_eq!(frame.sync(), 12345);
    assert_eq!(frame.payload_len(), 4 + 4 + 5 + 1);

    let decoded: (u32, String, u8) = unpack(frame).unwrap();
    assert_eq!(decoded, (42, "hello".to_string(), 7));
}

/// Test multiple frames in sequence.
#[test]
fn test_multiple_frames_sequence() {
    let allocator = SyncAllocator::new(1);
    let mut buffer = FrameBuffer::new();
    let mut all_bytes = Vec::new();

    for i in 1u32..=5 {
        let packet = pack_with(Packer::with_allocator(i, &allocator), (format!("message_{i}"),));
        all_bytes.extend_from_slice(packet.as_bytes());
    }

    let frames = buffer.push(&all_bytes).unwrap();
    assert_eq!(frames.len(), 5);

    for (i, mut frame) in frames.into_iter().enumerate() {
        let n = (i + 1) as u32;
        assert_eq!(frame.msg(), n);
        assert_eq!(frame.sync(), n);

        let (decoded,): (String,) = unpack(&mut frame).unwrap();
        assert_eq!(decoded, format!("message_{n}"));
    }
    assert!(buffer.is_empty());
}

/// Test fragmented frame parsing.
#[test]
fn test_fragmented_frame_parsing() {
    let packet = pack_with(Packer::with_sync(1, 789), ("test data for fragmentation",));
    let frame_bytes = packet.as_bytes();

    let mut buffer = FrameBuffer::new();

    // Header in parts
    assert!(buffer.push(&frame_bytes[..5]).unwrap().is_empty());
    assert!(buffer.push(&frame_bytes[5..HEADER_SIZE]).unwrap().is_empty());

    // Payload in parts
    let mid = HEADER_SIZE + packet.payload_len() / 2;
    assert!(buffer.push(&frame_bytes[HEADER_SIZE..mid]).unwrap().is_empty());

    let mut frames = buffer.push(&frame_bytes[mid..]).unwrap();
    assert_eq!(frames.len(), 1);

    let (decoded,): (String,) = unpack(&mut frames[0]).unwrap();
    assert_eq!(decoded, "test data for fragmentation");
}

/// Test an empty-payload ping frame.
#[test]
fn test_ping_frame() {
    let packet = Packer::with_sync(PING_MSG, 3).finish();
    assert_eq!(packet.as_bytes().len(), HEADER_SIZE);

    let mut buffer = FrameBuffer::new();
    let frames = buffer.push(packet.as_bytes()).unwrap();
    assert!(frames[0].header().is_ping());
    assert_eq!(frames[0].payload_len(), 0);
}

/// Test that an oversized frame is refused before its payload arrives.
#[test]
fn test_oversized_frame_rejected() {
    let mut buffer = FrameBuffer::with_max_payload(16);
    let header = Header::new(1, 17, 1);

    let err = buffer.push(&header.encode()).unwrap_err();
    assert!(matches!(err, IprotoError::Protocol(_)));
}

/// Test that a short payload decodes as a tuple mismatch, not a panic.
#[test]
fn test_string_length_past_end() {
    let mut bytes = Header::new(1, 6, 1).encode().to_vec();
    bytes.extend_from_slice(&10u32.to_ne_bytes());
    bytes.extend_from_slice(b"ab");

    let mut buffer = FrameBuffer::new();
    let mut frames = buffer.push(&bytes).unwrap();

    let err = unpack::<(String,)>(&mut frames[0]).unwrap_err();
    assert!(matches!(err, IprotoError::TupleMismatch(_)));
    assert_eq!(frames[0].offset(), 0);
}

/// Test BER-prefixed strings read back through the opt-in wrapper.
#[test]
fn test_ber_packed_strings() {
    let long = "x".repeat(300);
    let packer = Packer::with_sync(5, 1).flags(flags::BER_PACK);
    let packet = pack_with(packer, (long.as_str(), "short"));

    // 300 needs two BER bytes, "short" one.
    assert_eq!(packet.payload_len(), 2 + 300 + 1 + 5);

    let mut buffer = FrameBuffer::new();
    let mut frames = buffer.push(packet.as_bytes()).unwrap();
    let (Ber(a), Ber(b)): (Ber<String>, Ber<String>) = unpack(&mut frames[0]).unwrap();
    assert_eq!(a, long);
    assert_eq!(b, "short");
}

/// Test raw bytes written without a prefix and read back as the tail.
#[test]
fn test_raw_body_and_tail() {
    let body = b"\x93\x01\x02\x03";
    let mut packet = pack(7, 0, (1u32, Raw(body)));

    let (tag, Tail(rest)): (u32, Tail) = unpack(&mut packet).unwrap();
    assert_eq!(tag, 1);
    assert_eq!(&rest[..], body);
    assert_eq!(packet.bytes_left(), 0);
}

/// Test sync ids from the global allocator strictly increase.
#[test]
fn test_global_sync_ids_increase() {
    let syncs: Vec<u32> = (0..50).map(|_| pack(1, 0, ()).sync()).collect();
    assert!(syncs.windows(2).all(|pair| pair[1] > pair[0]));
}

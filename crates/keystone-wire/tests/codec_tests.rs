//! Frame codec behavior on realistic streams.

use keystone_wire::{write_message, MessageReader, MessageType, RawMessage, WireError};
use proptest::prelude::*;
use tokio_test::io::Builder;

// ============================================================================
// Fragmented delivery
// ============================================================================

#[tokio::test]
async fn test_one_byte_at_a_time() {
    let frame = RawMessage::new(MessageType::PasswordMessage, b"immudb\0".to_vec())
        .encode()
        .expect("encode");

    let mut builder = Builder::new();
    for byte in &frame {
        builder.read(std::slice::from_ref(byte));
    }
    let mut stream = builder.build();

    let msg = MessageReader::new().read_raw_message(&mut stream).await.expect("read");
    assert_eq!(msg.kind, MessageType::PasswordMessage);
    assert_eq!(msg.payload, b"immudb\0");
}

#[tokio::test]
async fn test_back_to_back_frames_split_mid_header() {
    let first = RawMessage::new(MessageType::Query, b"a\0".to_vec()).encode().expect("encode");
    let second = RawMessage::new(MessageType::Terminate, Vec::new()).encode().expect("encode");
    let mut all = first.clone();
    all.extend_from_slice(&second);

    let mut stream = Builder::new().read(&all[..3]).read(&all[3..9]).read(&all[9..]).build();
    let reader = MessageReader::new();

    assert_eq!(reader.read_raw_message(&mut stream).await.expect("first").kind, MessageType::Query);
    assert_eq!(
        reader.read_raw_message(&mut stream).await.expect("second").kind,
        MessageType::Terminate
    );
    assert!(matches!(
        reader.read_raw_message(&mut stream).await.unwrap_err(),
        WireError::ConnectionClosed
    ));
}

// ============================================================================
// Rejections
// ============================================================================

#[tokio::test]
async fn test_unknown_type_carries_byte() {
    let mut stream: &[u8] = &[b'~', 0, 0, 0, 4];
    let err = MessageReader::new().read_raw_message(&mut stream).await.unwrap_err();

    assert!(matches!(err, WireError::UnknownMessageType { byte: b'~' }));
    assert!(err.is_protocol_violation());
    // Nothing past the type byte was consumed.
    assert_eq!(stream, &[0, 0, 0, 4]);
}

#[tokio::test]
async fn test_short_length_rejected_before_payload() {
    let mut stream: &[u8] = &[b'Q', 0, 0, 0, 3, b'x', b'y', b'z'];
    let err = MessageReader::new().read_raw_message(&mut stream).await.unwrap_err();

    assert!(matches!(err, WireError::InvalidLength { length: 3 }));
    assert_eq!(stream, b"xyz");
}

#[tokio::test]
async fn test_eof_inside_length_is_incomplete() {
    let mut stream = Builder::new().read(&[b'S', 0, 0]).build();
    let err = MessageReader::new().read_raw_message(&mut stream).await.unwrap_err();
    assert!(matches!(err, WireError::IncompleteFrame(_)));
}

#[tokio::test]
async fn test_write_is_verbatim() {
    let frame = RawMessage::new(MessageType::Sync, Vec::new()).encode().expect("encode");
    let mut stream = Builder::new().write(&frame).build();

    let written = write_message(&mut stream, &frame).await.expect("write");
    assert_eq!(written, frame.len());
}

// ============================================================================
// Round trip
// ============================================================================

fn any_kind() -> impl Strategy<Value = MessageType> {
    proptest::sample::select(MessageType::ALL.to_vec())
}

proptest! {
    #[test]
    fn prop_round_trip(kind in any_kind(), payload in proptest::collection::vec(any::<u8>(), 0..512)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("runtime");

        let msg = RawMessage::new(kind, payload);
        let bytes = msg.encode().expect("encode");
        let mut stream = bytes.as_slice();

        let decoded = runtime
            .block_on(MessageReader::new().read_raw_message(&mut stream))
            .expect("decode");
        prop_assert_eq!(decoded, msg);
        prop_assert!(stream.is_empty());
    }
}

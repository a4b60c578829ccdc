use tchat_proto::{FramingError, MessageType, Packet, HEADER_LEN, MAX_PACKET_BYTES};

#[test]
fn packet_roundtrips_byte_for_byte() {
    let p = Packet::new(MessageType::Text, 5, 7, b"hello".to_vec());
    let wire = p.encode();

    // header: payload_length, message_type, from_id, to_id — all BE u32
    assert_eq!(wire.len(), HEADER_LEN + 5);
    assert_eq!(&wire[0..4], &5u32.to_be_bytes());
    assert_eq!(&wire[4..8], &MessageType::Text.as_u32().to_be_bytes());
    assert_eq!(&wire[8..12], &5u32.to_be_bytes());
    assert_eq!(&wire[12..16], &7u32.to_be_bytes());
    assert_eq!(&wire[16..], b"hello");

    let back = Packet::decode(&wire).unwrap();
    assert_eq!(back, p);
    assert_eq!(back.encode(), wire, "serialize(deserialize(P)) must equal P");
}

#[test]
fn unknown_ordinal_survives_reencoding() {
    // A relay must never alter packets it does not understand.
    let p = Packet::from_raw(0xdead, 3, 4, vec![1, 2, 3]);
    let wire = p.encode();
    let back = Packet::decode(&wire).unwrap();
    assert_eq!(back.kind(), MessageType::None);
    assert_eq!(back.raw_type(), 0xdead);
    assert_eq!(back.encode(), wire);
}

#[test]
fn zero_length_payload_is_legal() {
    let p = Packet::new(MessageType::Empty, 5, 0, Vec::new());
    let wire = p.encode();
    assert_eq!(wire.len(), HEADER_LEN);
    let back = Packet::decode(&wire).unwrap();
    assert!(back.payload().is_empty());
}

#[test]
fn oversize_length_is_rejected() {
    let mut wire = Packet::new(MessageType::Text, 1, 2, vec![0u8; 4]).encode();
    let bad = (MAX_PACKET_BYTES as u32) + 1;
    wire[0..4].copy_from_slice(&bad.to_be_bytes());
    match Packet::decode(&wire) {
        Err(FramingError::OversizePacket { len }) => assert_eq!(len, bad),
        other => panic!("expected OversizePacket, got {other:?}"),
    }
}

#[test]
fn negative_length_is_rejected() {
    let mut wire = Packet::new(MessageType::Text, 1, 2, vec![0u8; 4]).encode();
    wire[0..4].copy_from_slice(&0x8000_0000u32.to_be_bytes());
    assert!(matches!(
        Packet::decode(&wire),
        Err(FramingError::NegativeLength { .. })
    ));
}

#[test]
fn truncated_payload_is_rejected() {
    let wire = Packet::new(MessageType::Text, 1, 2, b"hello".to_vec()).encode();
    assert!(matches!(
        Packet::decode(&wire[..wire.len() - 1]),
        Err(FramingError::Truncated { expected: 5, got: 4 })
    ));
}

// ── stream codec ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn stream_roundtrip_preserves_order() {
    let (mut a, mut b) = tokio::io::duplex(4096);

    let first = Packet::new(MessageType::Text, 5, 7, b"first".to_vec());
    let second = Packet::new(MessageType::Reaction, 5, 7, b"second".to_vec());
    first.write_to(&mut a).await.unwrap();
    second.write_to(&mut a).await.unwrap();

    assert_eq!(Packet::read_from(&mut b).await.unwrap(), first);
    assert_eq!(Packet::read_from(&mut b).await.unwrap(), second);
}

#[tokio::test]
async fn truncated_header_is_fatal() {
    let (mut a, mut b) = tokio::io::duplex(4096);
    use tokio::io::AsyncWriteExt;
    a.write_all(&[0u8; 7]).await.unwrap();
    drop(a);
    assert!(matches!(
        Packet::read_from(&mut b).await,
        Err(FramingError::Io(_))
    ));
}

#[tokio::test]
async fn truncated_payload_on_stream_is_fatal() {
    let (mut a, mut b) = tokio::io::duplex(4096);
    use tokio::io::AsyncWriteExt;
    let wire = Packet::new(MessageType::Text, 1, 2, b"hello".to_vec()).encode();
    a.write_all(&wire[..wire.len() - 2]).await.unwrap();
    drop(a);
    assert!(matches!(
        Packet::read_from(&mut b).await,
        Err(FramingError::Io(_))
    ));
}

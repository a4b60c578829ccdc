//! Length-prefixed packet framing over a reliable byte stream.
//!
//! Wire layout: a fixed 16-byte header of four big-endian `u32`s
//! (`payload_length`, `message_type`, `from_id`, `to_id`) followed by
//! exactly `payload_length` bytes of payload.

use std::fmt;
use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::types::MessageType;

/// Size of the fixed packet header.
pub const HEADER_LEN: usize = 16;

/// Largest payload the codec will frame or accept.
pub const MAX_PACKET_BYTES: usize = 16 * 1024 * 1024;

/// `from_id` of server-originated packets; `to_id` of packets the server
/// itself must interpret.
pub const SERVER_ID: u32 = 0;

// ─── Error ───────────────────────────────────────────────────────────────────

/// Errors from framing or de-framing a packet. All of them are fatal for
/// the stream they occurred on.
#[derive(Debug)]
pub enum FramingError {
    /// The underlying stream failed or ended mid-packet.
    Io(io::Error),
    /// Declared payload length exceeds [`MAX_PACKET_BYTES`].
    OversizePacket { len: u32 },
    /// Declared payload length has the high bit set (negative when read
    /// as a signed 32-bit integer).
    NegativeLength { len: u32 },
    /// A byte-buffer decode found fewer bytes than the header declared.
    Truncated { expected: usize, got: usize },
}

impl fmt::Display for FramingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "stream error: {e}"),
            Self::OversizePacket { len } => {
                write!(f, "payload length {len} exceeds {MAX_PACKET_BYTES} bytes")
            }
            Self::NegativeLength { len } => {
                write!(f, "payload length {len:#010x} is negative")
            }
            Self::Truncated { expected, got } => {
                write!(f, "truncated packet: expected {expected} payload bytes, got {got}")
            }
        }
    }
}

impl std::error::Error for FramingError {}

impl From<io::Error> for FramingError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

// ─── Packet ──────────────────────────────────────────────────────────────────

/// One framed wire unit. Immutable once constructed.
///
/// The `message_type` is kept as the raw ordinal so that a packet always
/// re-serializes byte-for-byte, even when the ordinal is unknown to this
/// build; [`Packet::kind`] maps it to a [`MessageType`] on demand.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Packet {
    message_type: u32,
    from_id: u32,
    to_id: u32,
    payload: Vec<u8>,
}

impl Packet {
    /// Frame a payload under a known message type.
    pub fn new(kind: MessageType, from_id: u32, to_id: u32, payload: Vec<u8>) -> Self {
        Self { message_type: kind.as_u32(), from_id, to_id, payload }
    }

    /// Frame a payload under a raw ordinal (relay path, tests).
    pub fn from_raw(message_type: u32, from_id: u32, to_id: u32, payload: Vec<u8>) -> Self {
        Self { message_type, from_id, to_id, payload }
    }

    /// The logical message kind; unknown ordinals map to [`MessageType::None`].
    pub fn kind(&self) -> MessageType {
        MessageType::from_u32(self.message_type)
    }

    /// The raw `message_type` ordinal as it appeared on the wire.
    pub fn raw_type(&self) -> u32 {
        self.message_type
    }

    pub fn from_id(&self) -> u32 {
        self.from_id
    }

    pub fn to_id(&self) -> u32 {
        self.to_id
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Consume the packet, keeping only the payload.
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// A copy of this packet re-addressed with a different header; the
    /// payload bytes are carried over untouched.
    pub fn readdressed(&self, from_id: u32, to_id: u32) -> Self {
        Self {
            message_type: self.message_type,
            from_id,
            to_id,
            payload: self.payload.clone(),
        }
    }

    // ── byte-buffer codec ──────────────────────────────────────────────

    /// Serialize header + payload into a fresh buffer.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + self.payload.len());
        buf.extend_from_slice(&(self.payload.len() as u32).to_be_bytes());
        buf.extend_from_slice(&self.message_type.to_be_bytes());
        buf.extend_from_slice(&self.from_id.to_be_bytes());
        buf.extend_from_slice(&self.to_id.to_be_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Decode one packet from a byte buffer holding exactly one packet.
    pub fn decode(bytes: &[u8]) -> Result<Self, FramingError> {
        if bytes.len() < HEADER_LEN {
            return Err(FramingError::Truncated { expected: HEADER_LEN, got: bytes.len() });
        }
        let payload_length = u32::from_be_bytes(bytes[0..4].try_into().unwrap());
        check_length(payload_length)?;
        let len = payload_length as usize;
        let got = bytes.len() - HEADER_LEN;
        if got != len {
            return Err(FramingError::Truncated { expected: len, got });
        }
        Ok(Self {
            message_type: u32::from_be_bytes(bytes[4..8].try_into().unwrap()),
            from_id: u32::from_be_bytes(bytes[8..12].try_into().unwrap()),
            to_id: u32::from_be_bytes(bytes[12..16].try_into().unwrap()),
            payload: bytes[HEADER_LEN..].to_vec(),
        })
    }

    // ── stream codec ───────────────────────────────────────────────────

    /// Write the framed packet to `stream`.
    pub async fn write_to<W>(&self, stream: &mut W) -> Result<(), FramingError>
    where
        W: AsyncWrite + Unpin,
    {
        stream.write_all(&self.encode()).await?;
        Ok(())
    }

    /// Read the next full packet from `stream`, blocking until the header
    /// and the declared payload have both arrived. A truncated header or
    /// payload surfaces as `Io(UnexpectedEof)`.
    pub async fn read_from<R>(stream: &mut R) -> Result<Self, FramingError>
    where
        R: AsyncRead + Unpin,
    {
        let mut header = [0u8; HEADER_LEN];
        stream.read_exact(&mut header).await?;

        let payload_length = u32::from_be_bytes(header[0..4].try_into().unwrap());
        check_length(payload_length)?;

        let mut payload = vec![0u8; payload_length as usize];
        stream.read_exact(&mut payload).await?;

        Ok(Self {
            message_type: u32::from_be_bytes(header[4..8].try_into().unwrap()),
            from_id: u32::from_be_bytes(header[8..12].try_into().unwrap()),
            to_id: u32::from_be_bytes(header[12..16].try_into().unwrap()),
            payload,
        })
    }
}

/// Reject negative and oversize lengths before any allocation happens.
fn check_length(payload_length: u32) -> Result<(), FramingError> {
    if payload_length & 0x8000_0000 != 0 {
        return Err(FramingError::NegativeLength { len: payload_length });
    }
    if payload_length as usize > MAX_PACKET_BYTES {
        return Err(FramingError::OversizePacket { len: payload_length });
    }
    Ok(())
}

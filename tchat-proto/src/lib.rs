//! TchatsApp wire protocol.
//!
//! This crate handles:
//! * Length-prefixed packet framing over a reliable byte stream
//! * The closed [`MessageType`] set and its structured bodies
//! * Binary (de)serialization of every logical message kind
//! * The [`MessageRegistry`] mapping type tags to decoders
//! * The [`EncryptedEnvelope`] carried by `ENCRYPTED` / `SERVER_ENCRYPTED`
//!
//! It is intentionally crypto-free: sealing and opening envelopes is the
//! session layer's job.

#![deny(unsafe_code)]

pub mod deserialize;
pub mod envelope;
pub mod messages;
pub mod packet;
pub mod registry;
pub mod serialize;
pub mod types;

pub use deserialize::{Cursor, Deserializable};
pub use envelope::{EncryptedEnvelope, NONCE_LEN, TAG_LEN};
pub use messages::MessageBody;
pub use packet::{FramingError, Packet, HEADER_LEN, MAX_PACKET_BYTES, SERVER_ID};
pub use registry::{MessageRegistry, RegistryError};
pub use serialize::Serializable;
pub use types::{KeyExchangeRole, MessageStatus, MessageType};

/// Default relay-server TCP port.
pub const DEFAULT_PORT: u16 = 1666;

/// Group ids live at and above this bound so they can share the packet
/// header's `to_id` field with user ids without colliding.
pub const GROUP_ID_BASE: u32 = 0x4000_0000;

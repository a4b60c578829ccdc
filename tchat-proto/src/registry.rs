//! The message registry: one decode entry per logical message kind.
//!
//! The registry is populated once at program start with the closed set of
//! `(type_tag, decoder)` pairs; new kinds are added with an explicit
//! [`MessageRegistry::register`] call, never by reflection or scanning.
//! Encoding lives on the body types themselves (via
//! [`Serializable`](crate::Serializable)), so a registry entry only needs
//! the decode half.

use std::collections::HashMap;
use std::fmt;

use crate::deserialize::{self, Deserializable};
use crate::envelope::EncryptedEnvelope;
use crate::messages::*;
use crate::packet::Packet;
use crate::types::MessageType;

/// Decode a packet payload into a structured body.
pub type DecodeFn = fn(&[u8]) -> deserialize::Result<MessageBody>;

// ─── Error ───────────────────────────────────────────────────────────────────

/// Errors surfaced while decoding a packet through the registry.
#[derive(Debug)]
pub enum RegistryError {
    /// No decoder registered for this ordinal; the packet is dropped.
    UnknownMessageKind { tag: u32 },
    /// The payload did not parse as the registered body shape.
    Codec { kind: MessageType, source: deserialize::Error },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownMessageKind { tag } => write!(f, "unknown message kind {tag}"),
            Self::Codec { kind, source } => write!(f, "bad {kind:?} payload: {source}"),
        }
    }
}

impl std::error::Error for RegistryError {}

// ─── MessageRegistry ─────────────────────────────────────────────────────────

/// Bidirectional mapping `message_type ↔ structured message`.
pub struct MessageRegistry {
    decoders: HashMap<u32, DecodeFn>,
}

impl MessageRegistry {
    /// An empty registry. Useful for tests and constrained deployments;
    /// most callers want [`MessageRegistry::builtin`].
    pub fn new() -> Self {
        Self { decoders: HashMap::new() }
    }

    /// Register (or replace) the decoder for one message kind.
    pub fn register(&mut self, kind: MessageType, decode: DecodeFn) {
        self.decoders.insert(kind.as_u32(), decode);
    }

    /// A registry holding the full built-in message set.
    pub fn builtin() -> Self {
        let mut r = Self::new();
        r.register(MessageType::CreateUser, |p| {
            CreateUser::from_bytes(p).map(MessageBody::CreateUser)
        });
        r.register(MessageType::ConnectUser, |p| {
            ConnectUser::from_bytes(p).map(MessageBody::ConnectUser)
        });
        r.register(MessageType::AckConnection, |p| {
            AckConnection::from_bytes(p).map(MessageBody::AckConnection)
        });
        r.register(MessageType::Text, |p| Text::from_bytes(p).map(MessageBody::Text));
        r.register(MessageType::Media, |p| Media::from_bytes(p).map(MessageBody::Media));
        r.register(MessageType::Reaction, |p| Reaction::from_bytes(p).map(MessageBody::Reaction));
        r.register(MessageType::Notification, |p| {
            Notification::from_bytes(p).map(MessageBody::Notification)
        });
        r.register(MessageType::MessageAck, |p| {
            MessageAck::from_bytes(p).map(MessageBody::MessageAck)
        });
        r.register(MessageType::Error, |p| ErrorBody::from_bytes(p).map(MessageBody::Error));
        r.register(MessageType::ContactRequest, |p| {
            ContactRequest::from_bytes(p).map(MessageBody::ContactRequest)
        });
        r.register(MessageType::ContactRequestResponse, |p| {
            ContactRequestResponse::from_bytes(p).map(MessageBody::ContactRequestResponse)
        });
        r.register(MessageType::RemoveContact, |p| {
            RemoveContact::from_bytes(p).map(MessageBody::RemoveContact)
        });
        r.register(MessageType::CreateGroup, |p| {
            CreateGroup::from_bytes(p).map(MessageBody::CreateGroup)
        });
        r.register(MessageType::AddGroupMember, |p| {
            AddGroupMember::from_bytes(p).map(MessageBody::AddGroupMember)
        });
        r.register(MessageType::RemoveGroupMember, |p| {
            RemoveGroupMember::from_bytes(p).map(MessageBody::RemoveGroupMember)
        });
        r.register(MessageType::UpdateGroupName, |p| {
            UpdateGroupName::from_bytes(p).map(MessageBody::UpdateGroupName)
        });
        r.register(MessageType::DeleteGroup, |p| {
            DeleteGroup::from_bytes(p).map(MessageBody::DeleteGroup)
        });
        r.register(MessageType::LeaveGroup, |p| {
            LeaveGroup::from_bytes(p).map(MessageBody::LeaveGroup)
        });
        r.register(MessageType::UpdatePseudo, |p| {
            UpdatePseudo::from_bytes(p).map(MessageBody::UpdatePseudo)
        });
        r.register(MessageType::KeyExchange, |p| {
            KeyExchange::from_bytes(p).map(MessageBody::KeyExchange)
        });
        r.register(MessageType::KeyExchangeResponse, |p| {
            KeyExchangeResponse::from_bytes(p).map(MessageBody::KeyExchangeResponse)
        });
        r.register(MessageType::Encrypted, |p| {
            EncryptedEnvelope::from_bytes(p).map(MessageBody::Encrypted)
        });
        r.register(MessageType::FileTransferStart, |p| {
            FileTransferStart::from_bytes(p).map(MessageBody::FileTransferStart)
        });
        r.register(MessageType::FileChunk, |p| {
            FileChunk::from_bytes(p).map(MessageBody::FileChunk)
        });
        r.register(MessageType::GroupKeyDistribution, |p| {
            GroupKeyDistribution::from_bytes(p).map(MessageBody::GroupKeyDistribution)
        });
        r.register(MessageType::ServerKeyExchange, |p| {
            ServerKeyExchange::from_bytes(p).map(MessageBody::ServerKeyExchange)
        });
        r.register(MessageType::ServerKeyExchangeResponse, |p| {
            ServerKeyExchangeResponse::from_bytes(p).map(MessageBody::ServerKeyExchangeResponse)
        });
        r.register(MessageType::ServerEncrypted, |p| {
            EncryptedEnvelope::from_bytes(p).map(MessageBody::ServerEncrypted)
        });
        r.register(MessageType::Empty, |_| Ok(MessageBody::Empty));
        r
    }

    /// True if a decoder is registered for `kind`.
    pub fn handles(&self, kind: MessageType) -> bool {
        self.decoders.contains_key(&kind.as_u32())
    }

    /// Decode a packet's payload into its structured body.
    pub fn decode(&self, packet: &Packet) -> Result<MessageBody, RegistryError> {
        self.decode_raw(packet.raw_type(), packet.payload())
    }

    /// Decode a raw payload under an explicit kind — the inner-plaintext
    /// path of the encrypted channel, where the tag comes from the
    /// envelope's `orig_type` rather than a packet header.
    pub fn decode_payload(
        &self,
        kind: MessageType,
        payload: &[u8],
    ) -> Result<MessageBody, RegistryError> {
        self.decode_raw(kind.as_u32(), payload)
    }

    fn decode_raw(&self, tag: u32, payload: &[u8]) -> Result<MessageBody, RegistryError> {
        let decode = self
            .decoders
            .get(&tag)
            .ok_or(RegistryError::UnknownMessageKind { tag })?;
        decode(payload).map_err(|source| RegistryError::Codec {
            kind: MessageType::from_u32(tag),
            source,
        })
    }
}

impl Default for MessageRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

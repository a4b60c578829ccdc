//! Message type tags and shared protocol enums.

use std::fmt;

// ─── MessageType ─────────────────────────────────────────────────────────────

/// The closed set of logical message kinds, with their stable wire ordinals.
///
/// The ordinal travels in the packet header's `message_type` field. Unknown
/// ordinals decode to [`MessageType::None`] and are dropped by the registry.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[repr(u32)]
pub enum MessageType {
    /// Fallback for unknown ordinals. Never sent.
    None = 0,

    // ── account / connection ──
    CreateUser = 1,
    ConnectUser = 2,
    AckConnection = 3,

    // ── user-visible content ──
    Text = 4,
    Media = 5,
    Reaction = 6,
    Notification = 7,
    MessageAck = 8,
    Error = 9,

    // ── contact / group management ──
    ContactRequest = 10,
    ContactRequestResponse = 11,
    RemoveContact = 12,
    CreateGroup = 13,
    AddGroupMember = 14,
    RemoveGroupMember = 15,
    UpdateGroupName = 16,
    DeleteGroup = 17,
    LeaveGroup = 18,
    UpdatePseudo = 19,

    // ── end-to-end crypto ──
    KeyExchange = 20,
    KeyExchangeResponse = 21,
    Encrypted = 22,
    FileTransferStart = 23,
    GroupKeyDistribution = 24,

    // ── client↔server hop crypto ──
    ServerKeyExchange = 25,
    ServerKeyExchangeResponse = 26,
    ServerEncrypted = 27,

    // ── keep-alive ──
    Empty = 28,

    /// One chunk of an in-flight file transfer (always travels inside
    /// an `Encrypted` envelope).
    FileChunk = 29,
}

impl MessageType {
    /// Map a wire ordinal back to a type tag. Unknown ordinals yield `None`.
    pub fn from_u32(tag: u32) -> Self {
        match tag {
            1 => Self::CreateUser,
            2 => Self::ConnectUser,
            3 => Self::AckConnection,
            4 => Self::Text,
            5 => Self::Media,
            6 => Self::Reaction,
            7 => Self::Notification,
            8 => Self::MessageAck,
            9 => Self::Error,
            10 => Self::ContactRequest,
            11 => Self::ContactRequestResponse,
            12 => Self::RemoveContact,
            13 => Self::CreateGroup,
            14 => Self::AddGroupMember,
            15 => Self::RemoveGroupMember,
            16 => Self::UpdateGroupName,
            17 => Self::DeleteGroup,
            18 => Self::LeaveGroup,
            19 => Self::UpdatePseudo,
            20 => Self::KeyExchange,
            21 => Self::KeyExchangeResponse,
            22 => Self::Encrypted,
            23 => Self::FileTransferStart,
            24 => Self::GroupKeyDistribution,
            25 => Self::ServerKeyExchange,
            26 => Self::ServerKeyExchangeResponse,
            27 => Self::ServerEncrypted,
            28 => Self::Empty,
            29 => Self::FileChunk,
            _ => Self::None,
        }
    }

    /// The stable wire ordinal.
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Types exempt from the end-to-end encryption pipeline: they either
    /// carry key material needed to bootstrap a session or are already
    /// an envelope themselves.
    pub fn bypasses_e2e(self) -> bool {
        matches!(
            self,
            Self::KeyExchange | Self::KeyExchangeResponse | Self::Encrypted | Self::MessageAck
        )
    }

    /// Server-originated types that must be hop-encrypted before leaving
    /// the server.
    pub fn is_server_sensitive(self) -> bool {
        matches!(
            self,
            Self::AckConnection
                | Self::Error
                | Self::Notification
                | Self::MessageAck
                | Self::ContactRequest
                | Self::ContactRequestResponse
                | Self::RemoveContact
                | Self::CreateGroup
                | Self::AddGroupMember
                | Self::RemoveGroupMember
                | Self::UpdateGroupName
                | Self::DeleteGroup
                | Self::LeaveGroup
        )
    }

    /// The two hop-handshake types, the only traffic accepted before the
    /// hop key is installed.
    pub fn is_hop_handshake(self) -> bool {
        matches!(self, Self::ServerKeyExchange | Self::ServerKeyExchangeResponse)
    }
}

// ─── MessageStatus ───────────────────────────────────────────────────────────

/// Delivery status of an outgoing message, as carried in `MESSAGE_ACK`.
///
/// Progression at the sender: `Sending → Sent`, then optionally
/// `Delivered` / `Read`. `Failed` is terminal with a textual reason.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum MessageStatus {
    Sending = 0,
    Sent = 1,
    Delivered = 2,
    Read = 3,
    Failed = 4,
}

impl MessageStatus {
    /// Map a wire ordinal back to a status; unknown values read as `Failed`.
    pub fn from_u32(v: u32) -> Self {
        match v {
            0 => Self::Sending,
            1 => Self::Sent,
            2 => Self::Delivered,
            3 => Self::Read,
            _ => Self::Failed,
        }
    }

    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

// ─── KeyExchangeRole ─────────────────────────────────────────────────────────

/// Which side of an end-to-end handshake a `KEY_EXCHANGE` message came from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum KeyExchangeRole {
    Initiator = 1,
    Responder = 2,
}

impl KeyExchangeRole {
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            1 => Some(Self::Initiator),
            2 => Some(Self::Responder),
            _ => None,
        }
    }

    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

//! Structured bodies for every logical message kind, and the
//! [`MessageBody`] tagged union that the registry decodes into.
//!
//! Encryption is not inheritance here: wrapping a body into an
//! [`EncryptedEnvelope`] is a function of the session layer, and every
//! body below is an ordinary plaintext structure.

use crate::deserialize::{self, Buffer, Deserializable};
use crate::envelope::EncryptedEnvelope;
use crate::serialize::Serializable;
use crate::types::{KeyExchangeRole, MessageStatus, MessageType};

// ─── account / connection ────────────────────────────────────────────────────

/// Register a new account under a pseudonym. The server answers with
/// [`AckConnection`] carrying the assigned user id.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CreateUser {
    pub pseudo: String,
}

/// Resume an existing account.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConnectUser {
    pub user_id: u32,
}

/// Server → client: connection accepted.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AckConnection {
    pub user_id: u32,
    pub is_new: bool,
}

// ─── content ─────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Text {
    pub text: String,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Media {
    pub filename: String,
    pub mime: String,
    pub data: Vec<u8>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Reaction {
    /// `(peer_id, seq)` key of the message being reacted to.
    pub ref_peer: u32,
    pub ref_seq: u64,
    pub emoji: String,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Notification {
    pub text: String,
}

/// Delivery-status update for one previously sent message.
///
/// `(peer_id, seq)` identifies the original envelope from its *sender's*
/// point of view: the server fills `peer_id` with the original `to_id`,
/// a recipient acking delivery fills in its own id.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MessageAck {
    pub peer_id: u32,
    pub seq: u64,
    pub status: MessageStatus,
    pub reason: String,
}

/// Server → client error report. Deliberately generic: crypto failures
/// are never detailed to the peer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ErrorBody {
    pub code: u32,
    pub text: String,
}

// ─── contact / group management ──────────────────────────────────────────────

/// Contact request, mediated by the server (the two users are not yet
/// contacts, so nothing can be relayed directly).
///
/// `peer_id` always names "the other user": the target when a client
/// files the request, the requester when the server forwards it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ContactRequest {
    pub peer_id: u32,
    pub pseudo: String,
}

/// Answer to a contact request; same `peer_id` convention.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ContactRequestResponse {
    pub peer_id: u32,
    pub accepted: bool,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RemoveContact {
    pub contact_id: u32,
}

/// `group_id` is 0 in the client's request; the server's confirmation
/// echoes the body back with the assigned id.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CreateGroup {
    pub group_id: u32,
    pub name: String,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AddGroupMember {
    pub group_id: u32,
    pub member_id: u32,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RemoveGroupMember {
    pub group_id: u32,
    pub member_id: u32,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UpdateGroupName {
    pub group_id: u32,
    pub name: String,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeleteGroup {
    pub group_id: u32,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LeaveGroup {
    pub group_id: u32,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UpdatePseudo {
    pub pseudo: String,
}

// ─── end-to-end crypto ───────────────────────────────────────────────────────

/// First half of the end-to-end handshake. The initiator generates the
/// HKDF salt and carries it here so both sides derive the same key.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KeyExchange {
    pub public_key: [u8; 32],
    pub salt: [u8; 16],
    pub role: KeyExchangeRole,
}

/// Second half of the end-to-end handshake.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KeyExchangeResponse {
    pub public_key: [u8; 32],
    pub role: KeyExchangeRole,
}

/// Announces an encrypted file transfer on an established session.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FileTransferStart {
    pub file_id: String,
    pub filename: String,
    pub total_size: u64,
    pub num_chunks: u32,
    pub sha256: [u8; 32],
}

/// One chunk of a file transfer; always travels end-to-end encrypted.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FileChunk {
    pub file_id: String,
    pub chunk_index: u32,
    pub data: Vec<u8>,
}

/// Admin → member, over the pairwise session: the symmetric key for a
/// group conversation. Receivers ignore epochs that are not newer than
/// the installed one.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GroupKeyDistribution {
    pub group_id: u32,
    pub epoch: u64,
    pub group_key: [u8; 32],
}

// ─── hop crypto ──────────────────────────────────────────────────────────────

/// Server → client on accept, always plaintext.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServerKeyExchange {
    pub public_key: [u8; 32],
}

/// Client's reply completing the hop handshake.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServerKeyExchangeResponse {
    pub public_key: [u8; 32],
}

// ─── codec impls ─────────────────────────────────────────────────────────────

macro_rules! body_codec {
    ($ty:ty { $($field:ident),+ $(,)? }) => {
        impl Serializable for $ty {
            fn serialize(&self, buf: &mut Vec<u8>) {
                $( self.$field.serialize(buf); )+
            }
        }
        impl Deserializable for $ty {
            fn deserialize(buf: Buffer) -> deserialize::Result<Self> {
                Ok(Self { $( $field: Deserializable::deserialize(buf)?, )+ })
            }
        }
    };
}

body_codec!(CreateUser { pseudo });
body_codec!(ConnectUser { user_id });
body_codec!(AckConnection { user_id, is_new });
body_codec!(Text { text });
body_codec!(Media { filename, mime, data });
body_codec!(Reaction { ref_peer, ref_seq, emoji });
body_codec!(Notification { text });
body_codec!(ErrorBody { code, text });
body_codec!(ContactRequest { peer_id, pseudo });
body_codec!(ContactRequestResponse { peer_id, accepted });
body_codec!(RemoveContact { contact_id });
body_codec!(CreateGroup { group_id, name });
body_codec!(AddGroupMember { group_id, member_id });
body_codec!(RemoveGroupMember { group_id, member_id });
body_codec!(UpdateGroupName { group_id, name });
body_codec!(DeleteGroup { group_id });
body_codec!(LeaveGroup { group_id });
body_codec!(UpdatePseudo { pseudo });
body_codec!(FileTransferStart { file_id, filename, total_size, num_chunks, sha256 });
body_codec!(FileChunk { file_id, chunk_index, data });
body_codec!(GroupKeyDistribution { group_id, epoch, group_key });
body_codec!(ServerKeyExchange { public_key });
body_codec!(ServerKeyExchangeResponse { public_key });

impl Serializable for MessageAck {
    fn serialize(&self, buf: &mut Vec<u8>) {
        self.peer_id.serialize(buf);
        self.seq.serialize(buf);
        self.status.as_u32().serialize(buf);
        self.reason.serialize(buf);
    }
}

impl Deserializable for MessageAck {
    fn deserialize(buf: Buffer) -> deserialize::Result<Self> {
        Ok(Self {
            peer_id: u32::deserialize(buf)?,
            seq: u64::deserialize(buf)?,
            status: MessageStatus::from_u32(u32::deserialize(buf)?),
            reason: String::deserialize(buf)?,
        })
    }
}

impl Serializable for KeyExchange {
    fn serialize(&self, buf: &mut Vec<u8>) {
        self.public_key.serialize(buf);
        self.salt.serialize(buf);
        self.role.as_u32().serialize(buf);
    }
}

impl Deserializable for KeyExchange {
    fn deserialize(buf: Buffer) -> deserialize::Result<Self> {
        Ok(Self {
            public_key: <[u8; 32]>::deserialize(buf)?,
            salt: <[u8; 16]>::deserialize(buf)?,
            role: KeyExchangeRole::from_u32(u32::deserialize(buf)?)
                .ok_or(deserialize::Error::Malformed { what: "key exchange role" })?,
        })
    }
}

impl Serializable for KeyExchangeResponse {
    fn serialize(&self, buf: &mut Vec<u8>) {
        self.public_key.serialize(buf);
        self.role.as_u32().serialize(buf);
    }
}

impl Deserializable for KeyExchangeResponse {
    fn deserialize(buf: Buffer) -> deserialize::Result<Self> {
        Ok(Self {
            public_key: <[u8; 32]>::deserialize(buf)?,
            role: KeyExchangeRole::from_u32(u32::deserialize(buf)?)
                .ok_or(deserialize::Error::Malformed { what: "key exchange role" })?,
        })
    }
}

// ─── MessageBody ─────────────────────────────────────────────────────────────

/// Every decodable message, tagged by kind.
#[derive(Clone, Debug, PartialEq)]
pub enum MessageBody {
    CreateUser(CreateUser),
    ConnectUser(ConnectUser),
    AckConnection(AckConnection),
    Text(Text),
    Media(Media),
    Reaction(Reaction),
    Notification(Notification),
    MessageAck(MessageAck),
    Error(ErrorBody),
    ContactRequest(ContactRequest),
    ContactRequestResponse(ContactRequestResponse),
    RemoveContact(RemoveContact),
    CreateGroup(CreateGroup),
    AddGroupMember(AddGroupMember),
    RemoveGroupMember(RemoveGroupMember),
    UpdateGroupName(UpdateGroupName),
    DeleteGroup(DeleteGroup),
    LeaveGroup(LeaveGroup),
    UpdatePseudo(UpdatePseudo),
    KeyExchange(KeyExchange),
    KeyExchangeResponse(KeyExchangeResponse),
    Encrypted(EncryptedEnvelope),
    FileTransferStart(FileTransferStart),
    FileChunk(FileChunk),
    GroupKeyDistribution(GroupKeyDistribution),
    ServerKeyExchange(ServerKeyExchange),
    ServerKeyExchangeResponse(ServerKeyExchangeResponse),
    ServerEncrypted(EncryptedEnvelope),
    Empty,
}

impl MessageBody {
    /// The type tag this body travels under.
    pub fn kind(&self) -> MessageType {
        match self {
            Self::CreateUser(_) => MessageType::CreateUser,
            Self::ConnectUser(_) => MessageType::ConnectUser,
            Self::AckConnection(_) => MessageType::AckConnection,
            Self::Text(_) => MessageType::Text,
            Self::Media(_) => MessageType::Media,
            Self::Reaction(_) => MessageType::Reaction,
            Self::Notification(_) => MessageType::Notification,
            Self::MessageAck(_) => MessageType::MessageAck,
            Self::Error(_) => MessageType::Error,
            Self::ContactRequest(_) => MessageType::ContactRequest,
            Self::ContactRequestResponse(_) => MessageType::ContactRequestResponse,
            Self::RemoveContact(_) => MessageType::RemoveContact,
            Self::CreateGroup(_) => MessageType::CreateGroup,
            Self::AddGroupMember(_) => MessageType::AddGroupMember,
            Self::RemoveGroupMember(_) => MessageType::RemoveGroupMember,
            Self::UpdateGroupName(_) => MessageType::UpdateGroupName,
            Self::DeleteGroup(_) => MessageType::DeleteGroup,
            Self::LeaveGroup(_) => MessageType::LeaveGroup,
            Self::UpdatePseudo(_) => MessageType::UpdatePseudo,
            Self::KeyExchange(_) => MessageType::KeyExchange,
            Self::KeyExchangeResponse(_) => MessageType::KeyExchangeResponse,
            Self::Encrypted(_) => MessageType::Encrypted,
            Self::FileTransferStart(_) => MessageType::FileTransferStart,
            Self::FileChunk(_) => MessageType::FileChunk,
            Self::GroupKeyDistribution(_) => MessageType::GroupKeyDistribution,
            Self::ServerKeyExchange(_) => MessageType::ServerKeyExchange,
            Self::ServerKeyExchangeResponse(_) => MessageType::ServerKeyExchangeResponse,
            Self::ServerEncrypted(_) => MessageType::ServerEncrypted,
            Self::Empty => MessageType::Empty,
        }
    }

    /// Serialize this body into a packet payload.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::CreateUser(b) => b.to_bytes(),
            Self::ConnectUser(b) => b.to_bytes(),
            Self::AckConnection(b) => b.to_bytes(),
            Self::Text(b) => b.to_bytes(),
            Self::Media(b) => b.to_bytes(),
            Self::Reaction(b) => b.to_bytes(),
            Self::Notification(b) => b.to_bytes(),
            Self::MessageAck(b) => b.to_bytes(),
            Self::Error(b) => b.to_bytes(),
            Self::ContactRequest(b) => b.to_bytes(),
            Self::ContactRequestResponse(b) => b.to_bytes(),
            Self::RemoveContact(b) => b.to_bytes(),
            Self::CreateGroup(b) => b.to_bytes(),
            Self::AddGroupMember(b) => b.to_bytes(),
            Self::RemoveGroupMember(b) => b.to_bytes(),
            Self::UpdateGroupName(b) => b.to_bytes(),
            Self::DeleteGroup(b) => b.to_bytes(),
            Self::LeaveGroup(b) => b.to_bytes(),
            Self::UpdatePseudo(b) => b.to_bytes(),
            Self::KeyExchange(b) => b.to_bytes(),
            Self::KeyExchangeResponse(b) => b.to_bytes(),
            Self::Encrypted(b) => b.to_bytes(),
            Self::FileTransferStart(b) => b.to_bytes(),
            Self::FileChunk(b) => b.to_bytes(),
            Self::GroupKeyDistribution(b) => b.to_bytes(),
            Self::ServerKeyExchange(b) => b.to_bytes(),
            Self::ServerKeyExchangeResponse(b) => b.to_bytes(),
            Self::ServerEncrypted(b) => b.to_bytes(),
            Self::Empty => Vec::new(),
        }
    }

    /// Frame this body into a [`crate::Packet`] with the given addressing.
    pub fn into_packet(self, from_id: u32, to_id: u32) -> crate::Packet {
        crate::Packet::new(self.kind(), from_id, to_id, self.encode())
    }
}

//! The encrypted envelope carried by `ENCRYPTED` and `SERVER_ENCRYPTED`
//! packets.
//!
//! Wire layout (stable within `TchatsApp/v1`):
//!
//! ```text
//! orig_type:  u32   logical type of the wrapped plaintext
//! seq:        u64   per-conversation send sequence
//! nonce_len:  u16   always 12
//! nonce:      12 B
//! ct_len:     u32
//! ciphertext: ct_len B, GCM tag included
//! ```

use crate::deserialize::{self, Buffer, Deserializable};
use crate::serialize::Serializable;
use crate::types::MessageType;

/// AES-GCM nonce size used throughout the protocol.
pub const NONCE_LEN: usize = 12;

/// AES-GCM authentication tag size; ciphertexts are never shorter.
pub const TAG_LEN: usize = 16;

/// One sealed message on an encrypted channel (end-to-end or hop).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EncryptedEnvelope {
    /// The wrapped logical type, readable without the session key. The
    /// relay server uses it (and `seq`) for acknowledgement bookkeeping
    /// but never alters it.
    pub orig_type: u32,
    /// Send sequence under the conversation's session key; also bound
    /// into the AAD.
    pub seq: u64,
    /// Fresh random nonce for this envelope.
    pub nonce: [u8; NONCE_LEN],
    /// AES-256-GCM output: ciphertext with the 16-byte tag appended.
    pub ciphertext: Vec<u8>,
}

impl EncryptedEnvelope {
    /// The wrapped logical kind; unknown ordinals map to `None`.
    pub fn orig_kind(&self) -> MessageType {
        MessageType::from_u32(self.orig_type)
    }
}

impl Serializable for EncryptedEnvelope {
    fn serialize(&self, buf: &mut Vec<u8>) {
        self.orig_type.serialize(buf);
        self.seq.serialize(buf);
        (NONCE_LEN as u16).serialize(buf);
        self.nonce.serialize(buf);
        self.ciphertext.serialize(buf);
    }
}

impl Deserializable for EncryptedEnvelope {
    fn deserialize(buf: Buffer) -> deserialize::Result<Self> {
        let orig_type = u32::deserialize(buf)?;
        let seq = u64::deserialize(buf)?;
        let nonce_len = u16::deserialize(buf)?;
        if nonce_len as usize != NONCE_LEN {
            return Err(deserialize::Error::Malformed { what: "nonce_len" });
        }
        let nonce = <[u8; NONCE_LEN]>::deserialize(buf)?;
        let ciphertext = Vec::<u8>::deserialize(buf)?;
        if ciphertext.len() < TAG_LEN {
            return Err(deserialize::Error::Malformed { what: "ciphertext shorter than tag" });
        }
        Ok(Self { orig_type, seq, nonce, ciphertext })
    }
}

//! Error types for the session layer.

use std::fmt;

use tchat_proto::RegistryError;

use crate::state::ConversationId;

/// Errors from the encrypted-channel pipelines and the handshake state
/// machine.
#[derive(Debug)]
pub enum SessionError {
    /// No session key installed for this conversation; the caller may
    /// enqueue the message and trigger a handshake.
    NoSessionKey { conversation: ConversationId },
    /// AEAD tag verification failed. Carries no detail on purpose.
    AuthenticationFailed { conversation: ConversationId },
    /// The envelope's sequence number was already accepted (or fell out
    /// of the replay window).
    ReplayDetected { conversation: ConversationId, seq: u64 },
    /// A pending handshake did not complete within the timeout; queued
    /// sends fail with this error.
    HandshakeTimeout { peer_id: u32 },
    /// The peer's handshake message was unusable (bad role, self-derived
    /// key mismatch, …). The attempt is cleared.
    HandshakeFailed { peer_id: u32, reason: &'static str },
    /// The freshly drawn nonce was seen before under this key; the send
    /// is aborted rather than risking `(key, nonce)` reuse.
    NonceReuse { conversation: ConversationId },
    /// The decrypted inner plaintext did not parse as its declared type.
    InnerCodec(RegistryError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSessionKey { conversation } => {
                write!(f, "no session key for {conversation}")
            }
            Self::AuthenticationFailed { conversation } => {
                write!(f, "authentication failed on {conversation}")
            }
            Self::ReplayDetected { conversation, seq } => {
                write!(f, "replayed sequence {seq} on {conversation}")
            }
            Self::HandshakeTimeout { peer_id } => {
                write!(f, "handshake with peer {peer_id} timed out")
            }
            Self::HandshakeFailed { peer_id, reason } => {
                write!(f, "handshake with peer {peer_id} failed: {reason}")
            }
            Self::NonceReuse { conversation } => {
                write!(f, "nonce reuse detected on {conversation}; send aborted")
            }
            Self::InnerCodec(e) => write!(f, "inner plaintext decode failed: {e}"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<RegistryError> for SessionError {
    fn from(e: RegistryError) -> Self {
        Self::InnerCodec(e)
    }
}

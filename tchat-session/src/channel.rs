//! The encrypted channel: wrapping logical messages into envelopes and
//! unwrapping them again.
//!
//! Used for both layers of the protocol — end-to-end (`ENCRYPTED`, keyed
//! per peer or group conversation) and the client↔server hop
//! (`SERVER_ENCRYPTED`, keyed per connection). The caller picks the
//! conversation and the AAD addressing; the pipeline is identical.

use std::sync::Arc;

use tchat_crypto::{channel_aad, decrypt, encrypt, random_nonce};
use tchat_proto::{EncryptedEnvelope, MessageBody, MessageRegistry};

use crate::error::SessionError;
use crate::manager::SessionKeyManager;
use crate::state::ConversationId;

/// Seals and opens envelopes against a [`SessionKeyManager`].
pub struct EncryptedChannel {
    manager: Arc<SessionKeyManager>,
    registry: Arc<MessageRegistry>,
}

impl EncryptedChannel {
    pub fn new(manager: Arc<SessionKeyManager>, registry: Arc<MessageRegistry>) -> Self {
        Self { manager, registry }
    }

    pub fn manager(&self) -> &Arc<SessionKeyManager> {
        &self.manager
    }

    pub fn registry(&self) -> &Arc<MessageRegistry> {
        &self.registry
    }

    /// Wrap `body` for the wire.
    ///
    /// Allocates the conversation's next sequence, draws a fresh nonce
    /// (aborting on a reuse within the history window), binds
    /// `from ‖ to ‖ seq` as AAD and seals with AES-256-GCM.
    pub fn seal(
        &self,
        conversation: &ConversationId,
        aad_from: u32,
        aad_to: u32,
        body: &MessageBody,
    ) -> Result<EncryptedEnvelope, SessionError> {
        let plaintext = body.encode();
        let orig_type = body.kind().as_u32();

        self.manager.with_session(conversation, |session| {
            let seq = session.next_send_seq();
            let nonce = random_nonce();
            if !session.record_nonce(nonce) {
                return Err(SessionError::NonceReuse { conversation: conversation.clone() });
            }
            let aad = channel_aad(aad_from, aad_to, seq);
            let ciphertext = encrypt(&plaintext, session.key().as_bytes(), &nonce, &aad)
                .map_err(|_| SessionError::AuthenticationFailed {
                    conversation: conversation.clone(),
                })?;
            session.note_sent(ciphertext.len());
            Ok(EncryptedEnvelope { orig_type, seq, nonce, ciphertext })
        })?
    }

    /// Unwrap an incoming envelope.
    ///
    /// Rebuilds the AAD from the *claimed* sender and recipient — never
    /// from anything inside the ciphertext — so a re-addressed or
    /// re-sequenced envelope fails authentication before it is parsed.
    /// The replay window advances only after a successful decrypt.
    pub fn open(
        &self,
        conversation: &ConversationId,
        aad_from: u32,
        aad_to: u32,
        envelope: &EncryptedEnvelope,
    ) -> Result<MessageBody, SessionError> {
        let aad = channel_aad(aad_from, aad_to, envelope.seq);

        let plaintext = self
            .manager
            .with_session(conversation, |session| {
                decrypt(&envelope.ciphertext, session.key().as_bytes(), &envelope.nonce, &aad)
            })?
            .map_err(|_| SessionError::AuthenticationFailed {
                conversation: conversation.clone(),
            })?;

        self.manager
            .accept_recv_seq(conversation, aad_from, envelope.seq)?;

        Ok(self.registry.decode_payload(envelope.orig_kind(), &plaintext)?)
    }
}

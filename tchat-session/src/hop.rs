//! The client↔server hop handshake.
//!
//! On accept the server sends a plaintext `SERVER_KEY_EXCHANGE`; the
//! client answers with its own public key; both sides then derive
//!
//! ```text
//! hop_conv_id = "server_session_" ‖ hex(sha256(server_pub ‖ client_pub)[0..8])
//! hop_key     = HKDF(ECDH(server_priv, client_pub), info = prefix ‖ hop_conv_id)
//! ```
//!
//! The HKDF salt is all-zero on the hop: the conversation id already
//! binds both ephemeral keys, so every connection derives a distinct key.

use sha2::{Digest, Sha256};
use tchat_crypto::{derive_session_key, shared_secret, PublicKey, SessionKey, StaticSecret};

use crate::state::ConversationId;

/// The shared derivation, identical on both ends of the hop: DH against
/// `peer_pub`, conversation id over `(server_pub, client_pub)` in that
/// fixed order.
///
/// Returns `None` for a degenerate (low-order) peer key.
pub fn derive_hop_session(
    our_secret: &StaticSecret,
    peer_pub: &[u8; 32],
    server_pub: &[u8; 32],
    client_pub: &[u8; 32],
) -> Option<(ConversationId, SessionKey)> {
    let ss = shared_secret(our_secret, &PublicKey::from(*peer_pub));
    if ss.iter().all(|b| *b == 0) {
        return None;
    }

    let mut hasher = Sha256::new();
    hasher.update(server_pub);
    hasher.update(client_pub);
    let digest = hasher.finalize();
    let conversation = ConversationId::server_session(&hex::encode(&digest[..8]));

    let key = derive_session_key(&ss, &[0u8; 16], conversation.as_bytes());
    Some((conversation, key))
}

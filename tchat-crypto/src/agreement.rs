//! X25519 key agreement and HKDF-SHA-256 session-key derivation.
//!
//! # Flow
//!
//! ```text
//! let (a_priv, a_pub) = generate_keypair();          // initiator
//! let (b_priv, b_pub) = generate_keypair();          // responder
//! let ss = shared_secret(&a_priv, &b_pub);           // == shared_secret(&b_priv, &a_pub)
//! let sk = derive_session_key(&ss, &salt, conversation_id.as_bytes());
//! ```

use hkdf::Hkdf;
use sha2::Sha256;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroize;

use crate::keys::SessionKey;
use crate::KEY_LEN;

/// HKDF info prefix; the conversation id is appended verbatim.
pub const SESSION_INFO_PREFIX: &[u8] = b"TchatsApp/v1/session|";

/// Size of the HKDF salt generated by the handshake initiator.
pub const SESSION_SALT_LEN: usize = 16;

/// Generate a fresh X25519 keypair from the system CSPRNG.
pub fn generate_keypair() -> (StaticSecret, PublicKey) {
    let mut seed = [0u8; 32];
    getrandom::getrandom(&mut seed).expect("getrandom");
    let secret = StaticSecret::from(seed);
    seed.zeroize();
    let public = PublicKey::from(&secret);
    (secret, public)
}

/// ECDH: the 32-byte shared secret between our private key and the
/// peer's public key.
pub fn shared_secret(private: &StaticSecret, peer_public: &PublicKey) -> [u8; 32] {
    *private.diffie_hellman(peer_public).as_bytes()
}

/// Expand an ECDH shared secret into a per-conversation session key.
///
/// `info = "TchatsApp/v1/session|" ‖ conversation_id`; both sides must
/// use the salt the initiator generated and carried in its
/// `KEY_EXCHANGE` message.
pub fn derive_session_key(
    shared: &[u8; 32],
    salt: &[u8; SESSION_SALT_LEN],
    conversation_id: &[u8],
) -> SessionKey {
    let mut info = Vec::with_capacity(SESSION_INFO_PREFIX.len() + conversation_id.len());
    info.extend_from_slice(SESSION_INFO_PREFIX);
    info.extend_from_slice(conversation_id);

    let hk = Hkdf::<Sha256>::new(Some(salt), shared);
    let mut okm = [0u8; KEY_LEN];
    // 32 bytes is far below the HKDF-SHA-256 output bound; expand cannot fail.
    hk.expand(&info, &mut okm).expect("hkdf expand");

    let key = SessionKey::from_bytes(okm);
    okm.zeroize();
    key
}

/// Generate the fresh per-handshake HKDF salt (initiator side).
pub fn generate_salt() -> [u8; SESSION_SALT_LEN] {
    let mut salt = [0u8; SESSION_SALT_LEN];
    getrandom::getrandom(&mut salt).expect("getrandom");
    salt
}

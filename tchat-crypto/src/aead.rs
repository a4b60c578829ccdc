//! AES-256-GCM authenticated encryption.
//!
//! The tag length is 128 bits and not negotiable; ciphertexts returned by
//! [`encrypt`] always carry the tag appended.

use std::fmt;

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};

use crate::{KEY_LEN, NONCE_LEN};

/// Length of the channel AAD: `from_id(4) ‖ to_id(4) ‖ seq(8)`.
pub const AAD_LEN: usize = 16;

// ─── Error ───────────────────────────────────────────────────────────────────

/// Errors from the AEAD layer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AeadError {
    /// Tag verification failed: the ciphertext, nonce or AAD was altered,
    /// or the wrong key was used. Deliberately carries no detail.
    AuthenticationFailed,
    /// The cipher refused to seal (never expected with well-formed input).
    EncryptionFailed,
}

impl fmt::Display for AeadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AuthenticationFailed => write!(f, "AEAD authentication failed"),
            Self::EncryptionFailed => write!(f, "AEAD encryption failed"),
        }
    }
}

impl std::error::Error for AeadError {}

// ─── encrypt / decrypt ───────────────────────────────────────────────────────

/// Seal `plaintext` under `(key, nonce, aad)`. Returns `ciphertext ‖ tag`.
pub fn encrypt(
    plaintext: &[u8],
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    aad: &[u8],
) -> Result<Vec<u8>, AeadError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    cipher
        .encrypt(Nonce::from_slice(nonce), Payload { msg: plaintext, aad })
        .map_err(|_| AeadError::EncryptionFailed)
}

/// Open `ciphertext ‖ tag` under `(key, nonce, aad)`.
///
/// Any single-bit change to the ciphertext, tag, nonce or AAD yields
/// [`AeadError::AuthenticationFailed`].
pub fn decrypt(
    ciphertext: &[u8],
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    aad: &[u8],
) -> Result<Vec<u8>, AeadError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    cipher
        .decrypt(Nonce::from_slice(nonce), Payload { msg: ciphertext, aad })
        .map_err(|_| AeadError::AuthenticationFailed)
}

/// Build the channel AAD binding an envelope to its addressing and
/// sequence: `from_id(4) ‖ to_id(4) ‖ seq(8)`, big-endian.
pub fn channel_aad(from_id: u32, to_id: u32, seq: u64) -> [u8; AAD_LEN] {
    let mut aad = [0u8; AAD_LEN];
    aad[0..4].copy_from_slice(&from_id.to_be_bytes());
    aad[4..8].copy_from_slice(&to_id.to_be_bytes());
    aad[8..16].copy_from_slice(&seq.to_be_bytes());
    aad
}

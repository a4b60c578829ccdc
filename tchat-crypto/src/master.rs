//! Master keys for the at-rest key store.
//!
//! Derived from the user's password with PBKDF2-HMAC-SHA-256 (100 000
//! iterations, 16-byte salt), or generated randomly when the user opts
//! out of password protection. Every stored blob is sealed as
//! `iv(12) ‖ AES-256-GCM(blob)`.

use std::fmt;

use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::aead::{decrypt, encrypt};
use crate::nonce::random_nonce;
use crate::{KEY_LEN, NONCE_LEN, TAG_LEN};

/// PBKDF2 iteration count, fixed for `TchatsApp/v1` stores.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// PBKDF2 salt size.
pub const SALT_LEN: usize = 16;

// ─── Error ───────────────────────────────────────────────────────────────────

/// Errors from sealing or opening at-rest blobs.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum MasterKeyError {
    /// The blob is too short to hold an IV and a tag, or failed
    /// authentication — a wrong password or a corrupted store.
    OpenFailed,
    /// The cipher refused to seal (never expected with well-formed input).
    SealFailed,
}

impl fmt::Display for MasterKeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenFailed => write!(f, "could not open sealed blob (wrong key or corrupted)"),
            Self::SealFailed => write!(f, "could not seal blob"),
        }
    }
}

impl std::error::Error for MasterKeyError {}

// ─── MasterKey ───────────────────────────────────────────────────────────────

/// The symmetric key protecting a user's on-disk key store.
///
/// Zeroized on drop; `Debug` is opaque.
#[derive(Clone, Eq, PartialEq)]
pub struct MasterKey([u8; KEY_LEN]);

impl MasterKey {
    /// Derive from a password and stored salt.
    pub fn derive(password: &str, salt: &[u8; SALT_LEN]) -> Self {
        let mut okm = [0u8; KEY_LEN];
        pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ITERATIONS, &mut okm);
        let key = Self(okm);
        okm.zeroize();
        key
    }

    /// A random master key, for users who opt out of password protection.
    /// The caller is responsible for warning about the plaintext copy on
    /// disk.
    pub fn random() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        getrandom::getrandom(&mut bytes).expect("getrandom");
        let key = Self(bytes);
        bytes.zeroize();
        key
    }

    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Seal a blob for disk: fresh 12-byte IV prepended to the GCM output.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, MasterKeyError> {
        let iv = random_nonce();
        let ct = encrypt(plaintext, &self.0, &iv, &[]).map_err(|_| MasterKeyError::SealFailed)?;
        let mut blob = Vec::with_capacity(NONCE_LEN + ct.len());
        blob.extend_from_slice(&iv);
        blob.extend_from_slice(&ct);
        Ok(blob)
    }

    /// Open a blob produced by [`MasterKey::seal`].
    pub fn open(&self, blob: &[u8]) -> Result<Vec<u8>, MasterKeyError> {
        if blob.len() < NONCE_LEN + TAG_LEN {
            return Err(MasterKeyError::OpenFailed);
        }
        let mut iv = [0u8; NONCE_LEN];
        iv.copy_from_slice(&blob[..NONCE_LEN]);
        decrypt(&blob[NONCE_LEN..], &self.0, &iv, &[]).map_err(|_| MasterKeyError::OpenFailed)
    }
}

impl Drop for MasterKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MasterKey(..)")
    }
}

/// Generate a fresh PBKDF2 salt.
pub fn generate_store_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    getrandom::getrandom(&mut salt).expect("getrandom");
    salt
}

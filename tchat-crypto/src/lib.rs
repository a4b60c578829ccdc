//! Cryptographic primitives for TchatsApp.
//!
//! Provides:
//! - AES-256-GCM authenticated encryption with associated data
//! - X25519 ECDH and HKDF-SHA-256 session-key derivation
//! - Channel AAD construction (`from ‖ to ‖ seq`)
//! - Secure random nonces with a per-session reuse guard
//! - PBKDF2-derived master keys and the at-rest sealing format
//!
//! Key material is zeroized on drop and never `Debug`-printable.

#![deny(unsafe_code)]

pub mod aead;
pub mod agreement;
pub mod keys;
pub mod master;
pub mod nonce;

pub use aead::{channel_aad, decrypt, encrypt, AeadError, AAD_LEN};
pub use agreement::{
    derive_session_key, generate_keypair, generate_salt, shared_secret, SESSION_INFO_PREFIX,
    SESSION_SALT_LEN,
};
pub use keys::SessionKey;
pub use master::{generate_store_salt, MasterKey, MasterKeyError, PBKDF2_ITERATIONS, SALT_LEN};
pub use nonce::{random_nonce, NonceHistory, NONCE_HISTORY_LEN};

// The agreement API hands out dalek key types directly; re-export them so
// dependents don't need their own `x25519-dalek` line.
pub use x25519_dalek::{PublicKey, StaticSecret};

/// AES-256-GCM key size.
pub const KEY_LEN: usize = 32;

/// AES-GCM nonce size, fixed at 96 bits.
pub const NONCE_LEN: usize = 12;

/// AES-GCM authentication tag size, fixed at 128 bits.
pub const TAG_LEN: usize = 16;

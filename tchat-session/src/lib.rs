//! TchatsApp session layer.
//!
//! This crate drives everything between "send this logical message to
//! peer P" and the bytes of an `ENCRYPTED` packet:
//! * Per-conversation session keys with send counters and replay windows
//! * The X25519/HKDF handshake state machine (crossed hellos, timeouts)
//! * The seal/open pipelines of the encrypted channel
//! * Group keys distributed over pairwise sessions
//! * Chunked file transfer with whole-file hash verification
//! * The at-rest key store (PBKDF2 master key, atomic sealed files)
//!
//! It is sans-IO: callers own the sockets and feed packets in and out.

#![deny(unsafe_code)]

pub mod channel;
pub mod error;
pub mod group;
pub mod handshake;
pub mod hop;
pub mod manager;
pub mod state;
pub mod store;
pub mod transfer;

pub use channel::EncryptedChannel;
pub use error::SessionError;
pub use group::{new_group_key, GroupKeyring};
pub use handshake::{HandshakeDriver, HelloOutcome, PendingSend, HANDSHAKE_TIMEOUT};
pub use hop::derive_hop_session;
pub use manager::SessionKeyManager;
pub use state::{ConversationId, ReplayMode, ReplayState, SessionState, REPLAY_WINDOW};
pub use store::{KeyStore, StoreError};
pub use transfer::{
    plan_transfer, CompletedFile, IncomingTransfers, TransferError, CHUNK_SIZE_DEFAULT,
    CHUNK_SIZE_MAX,
};

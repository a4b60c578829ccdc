//! Per-conversation session state: keys, counters and replay windows.

use std::collections::HashMap;
use std::fmt;
use std::time::SystemTime;

use tchat_crypto::{NonceHistory, SessionKey};

// ─── ConversationId ──────────────────────────────────────────────────────────

/// Stable string identifier keying session state.
///
/// `private_<peerId>` for 1:1 chats, `group_<groupId>` for groups, and
/// `server_session_<hex>` for the client↔server hop.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ConversationId(String);

impl ConversationId {
    /// The 1:1 conversation with `peer_id`.
    pub fn private(peer_id: u32) -> Self {
        Self(format!("private_{peer_id}"))
    }

    /// The group conversation `group_id`.
    pub fn group(group_id: u32) -> Self {
        Self(format!("group_{group_id}"))
    }

    /// A client↔server hop session, named by the handshake digest.
    pub fn server_session(digest_hex: &str) -> Self {
        Self(format!("server_session_{digest_hex}"))
    }

    /// Rebuild an id from its raw string form (key-store filenames).
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The bytes fed into HKDF's info string.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ─── Replay protection ───────────────────────────────────────────────────────

/// How incoming sequence numbers are validated.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ReplayMode {
    /// Require strictly increasing sequences. The transport is an ordered
    /// reliable stream today, so this is the default.
    #[default]
    Strict,
    /// Accept out-of-order sequences within a 64-wide sliding window,
    /// each at most once.
    Windowed,
}

/// Width of the sliding window in [`ReplayMode::Windowed`].
pub const REPLAY_WINDOW: u64 = 64;

/// Replay state for one sender within one conversation.
///
/// `highest` is the highest accepted sequence; in windowed mode `seen`
/// is a bitmap over `[highest − 63, highest]` with bit `i` covering
/// `highest − i`.
#[derive(Clone, Debug, Default)]
pub struct ReplayState {
    highest: u64,
    seen: u64,
}

impl ReplayState {
    /// Validate `seq` and mark it accepted. Returns `false` on replay.
    pub fn accept(&mut self, seq: u64, mode: ReplayMode) -> bool {
        match mode {
            ReplayMode::Strict => {
                if seq <= self.highest {
                    return false;
                }
                self.highest = seq;
                true
            }
            ReplayMode::Windowed => {
                if seq > self.highest {
                    let shift = seq - self.highest;
                    self.seen = if shift >= REPLAY_WINDOW { 0 } else { self.seen << shift };
                    self.seen |= 1; // bit 0 = seq itself
                    self.highest = seq;
                    return true;
                }
                let age = self.highest - seq;
                if age >= REPLAY_WINDOW {
                    return false; // too old to track
                }
                let bit = 1u64 << age;
                if self.seen & bit != 0 {
                    return false;
                }
                self.seen |= bit;
                true
            }
        }
    }

    pub fn highest(&self) -> u64 {
        self.highest
    }
}

// ─── SessionState ────────────────────────────────────────────────────────────

/// Everything the manager tracks for one conversation.
pub struct SessionState {
    key: SessionKey,
    /// Next sequence to hand out; starts at 1.
    send_seq: u64,
    /// Replay state per sender id. Private conversations only ever see
    /// the peer's id here; group conversations hold one entry per member.
    recv: HashMap<u32, ReplayState>,
    /// Recent nonces used under this key.
    nonces: NonceHistory,
    // rotation hints
    created_at: SystemTime,
    bytes_sent: u64,
    messages_sent: u64,
}

impl SessionState {
    pub fn new(key: SessionKey) -> Self {
        Self::with_send_seq(key, 1)
    }

    /// Restore a persisted session. `send_seq` must be safely past every
    /// sequence this key has ever sent; peers only require monotonicity,
    /// so jumping ahead is always legal.
    pub fn with_send_seq(key: SessionKey, send_seq: u64) -> Self {
        Self {
            key,
            send_seq,
            recv: HashMap::new(),
            nonces: NonceHistory::new(),
            created_at: SystemTime::now(),
            bytes_sent: 0,
            messages_sent: 0,
        }
    }

    /// The next sequence that would be handed out (persistence snapshot).
    pub fn send_seq(&self) -> u64 {
        self.send_seq
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// Allocate the next send sequence.
    pub fn next_send_seq(&mut self) -> u64 {
        let seq = self.send_seq;
        self.send_seq += 1;
        seq
    }

    /// Validate an incoming sequence from `sender_id`.
    pub fn accept_recv_seq(&mut self, sender_id: u32, seq: u64, mode: ReplayMode) -> bool {
        self.recv.entry(sender_id).or_default().accept(seq, mode)
    }

    /// Record a nonce; `false` means reuse and the send must abort.
    pub fn record_nonce(&mut self, nonce: [u8; 12]) -> bool {
        self.nonces.record(nonce)
    }

    pub fn note_sent(&mut self, bytes: usize) {
        self.bytes_sent += bytes as u64;
        self.messages_sent += 1;
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn messages_sent(&self) -> u64 {
        self.messages_sent
    }
}

impl fmt::Debug for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Key deliberately omitted.
        f.debug_struct("SessionState")
            .field("send_seq", &self.send_seq)
            .field("messages_sent", &self.messages_sent)
            .finish_non_exhaustive()
    }
}

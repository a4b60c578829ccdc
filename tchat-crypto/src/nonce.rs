//! Nonce generation and the per-session reuse guard.

use std::collections::VecDeque;

use crate::NONCE_LEN;

/// How many recent nonces a session remembers for the reuse check.
pub const NONCE_HISTORY_LEN: usize = 1024;

/// Draw a fresh 96-bit nonce from the system CSPRNG.
pub fn random_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    getrandom::getrandom(&mut nonce).expect("getrandom");
    nonce
}

/// Ring of the last [`NONCE_HISTORY_LEN`] nonces used under one key.
///
/// A repeat within the window is astronomically unlikely with random
/// 96-bit nonces, but a `(key, nonce)` reuse would be catastrophic for
/// GCM, so the send path checks anyway and aborts the send on a hit.
#[derive(Debug, Default)]
pub struct NonceHistory {
    recent: VecDeque<[u8; NONCE_LEN]>,
}

impl NonceHistory {
    pub fn new() -> Self {
        Self { recent: VecDeque::with_capacity(NONCE_HISTORY_LEN) }
    }

    /// Record `nonce`; returns `false` if it was already in the window
    /// (the caller must abort the send).
    pub fn record(&mut self, nonce: [u8; NONCE_LEN]) -> bool {
        if self.recent.contains(&nonce) {
            return false;
        }
        if self.recent.len() == NONCE_HISTORY_LEN {
            self.recent.pop_front();
        }
        self.recent.push_back(nonce);
        true
    }

    pub fn len(&self) -> usize {
        self.recent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recent.is_empty()
    }
}

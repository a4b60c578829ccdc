//! The thread-safe session-key map.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tchat_crypto::SessionKey;

use crate::error::SessionError;
use crate::state::{ConversationId, ReplayMode, SessionState};

/// Holds one [`SessionState`] per conversation.
///
/// The outer map lock is only held to look entries up; per-entry mutexes
/// serialize key installation, sequence allocation and replay advancement,
/// so no lock is ever held across I/O.
pub struct SessionKeyManager {
    mode: ReplayMode,
    sessions: Mutex<HashMap<ConversationId, Arc<Mutex<SessionState>>>>,
}

impl SessionKeyManager {
    pub fn new(mode: ReplayMode) -> Self {
        Self { mode, sessions: Mutex::new(HashMap::new()) }
    }

    pub fn replay_mode(&self) -> ReplayMode {
        self.mode
    }

    /// Install (or replace) the key for a conversation. Replacing resets
    /// sequence counters and replay state: a rotation starts a fresh
    /// channel.
    pub fn install(&self, conversation: ConversationId, key: SessionKey) {
        self.install_restored(conversation, key, 1);
    }

    /// Install a key restored from disk, resuming sends at `send_seq`
    /// (the persisted floor plus a safety jump — receivers only require
    /// monotonicity).
    pub fn install_restored(&self, conversation: ConversationId, key: SessionKey, send_seq: u64) {
        let entry = Arc::new(Mutex::new(SessionState::with_send_seq(key, send_seq)));
        self.sessions
            .lock()
            .expect("session map poisoned")
            .insert(conversation, entry);
    }

    pub fn contains(&self, conversation: &ConversationId) -> bool {
        self.sessions
            .lock()
            .expect("session map poisoned")
            .contains_key(conversation)
    }

    /// Drop a conversation's state; the key zeroizes on drop.
    pub fn remove(&self, conversation: &ConversationId) {
        self.sessions
            .lock()
            .expect("session map poisoned")
            .remove(conversation);
    }

    /// Drop everything (logout).
    pub fn clear(&self) {
        self.sessions.lock().expect("session map poisoned").clear();
    }

    /// All live conversation ids, for persistence sweeps.
    pub fn conversations(&self) -> Vec<ConversationId> {
        self.sessions
            .lock()
            .expect("session map poisoned")
            .keys()
            .cloned()
            .collect()
    }

    /// A clone of the session key, for persistence.
    pub fn key(&self, conversation: &ConversationId) -> Result<SessionKey, SessionError> {
        let entry = self.entry(conversation)?;
        let state = entry.lock().expect("session entry poisoned");
        Ok(state.key().clone())
    }

    /// Key + current send sequence, the persistence snapshot.
    pub fn snapshot(
        &self,
        conversation: &ConversationId,
    ) -> Result<(SessionKey, u64), SessionError> {
        let entry = self.entry(conversation)?;
        let state = entry.lock().expect("session entry poisoned");
        Ok((state.key().clone(), state.send_seq()))
    }

    /// Run `f` under the conversation's entry lock.
    pub fn with_session<T>(
        &self,
        conversation: &ConversationId,
        f: impl FnOnce(&mut SessionState) -> T,
    ) -> Result<T, SessionError> {
        let entry = self.entry(conversation)?;
        let mut state = entry.lock().expect("session entry poisoned");
        Ok(f(&mut state))
    }

    /// Allocate the next send sequence for a conversation.
    pub fn next_send_seq(&self, conversation: &ConversationId) -> Result<u64, SessionError> {
        self.with_session(conversation, |s| s.next_send_seq())
    }

    /// Validate an incoming sequence; advances replay state on success.
    pub fn accept_recv_seq(
        &self,
        conversation: &ConversationId,
        sender_id: u32,
        seq: u64,
    ) -> Result<(), SessionError> {
        let ok = self.with_session(conversation, |s| s.accept_recv_seq(sender_id, seq, self.mode))?;
        if ok {
            Ok(())
        } else {
            Err(SessionError::ReplayDetected { conversation: conversation.clone(), seq })
        }
    }

    fn entry(
        &self,
        conversation: &ConversationId,
    ) -> Result<Arc<Mutex<SessionState>>, SessionError> {
        self.sessions
            .lock()
            .expect("session map poisoned")
            .get(conversation)
            .cloned()
            .ok_or_else(|| SessionError::NoSessionKey { conversation: conversation.clone() })
    }
}

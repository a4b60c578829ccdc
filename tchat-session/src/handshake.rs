//! The end-to-end handshake state machine.
//!
//! Per peer pair:
//!
//! ```text
//! states:  IDLE → SENT_HELLO → ESTABLISHED
//!          IDLE → RECEIVED_HELLO → ESTABLISHED
//!          any  → FAILED (attempt cleared, may restart)
//! ```
//!
//! The driver is sans-IO: it hands back the `KEY_EXCHANGE` /
//! `KEY_EXCHANGE_RESPONSE` bodies to send and the queued messages to
//! flush; the caller owns the socket.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tchat_crypto::{
    derive_session_key, generate_keypair, generate_salt, shared_secret, PublicKey, StaticSecret,
};
use tchat_proto::messages::{KeyExchange, KeyExchangeResponse};
use tchat_proto::{KeyExchangeRole, MessageBody};

use crate::error::SessionError;
use crate::manager::SessionKeyManager;
use crate::state::ConversationId;

/// How long a pending handshake may wait for the peer's response.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// A message deferred until its conversation's handshake completes.
#[derive(Debug)]
pub struct PendingSend {
    pub to_id: u32,
    pub body: MessageBody,
    /// Caller-side correlation token (the client maps it to a message id).
    pub token: u64,
}

struct PendingHandshake {
    secret: StaticSecret,
    salt: [u8; 16],
    started_at: Instant,
    queued: Vec<PendingSend>,
}

/// What a processed `KEY_EXCHANGE` asks the caller to do.
pub struct HelloOutcome {
    /// The response to send back, if we acted as responder.
    pub response: Option<KeyExchangeResponse>,
    /// Messages that were queued behind a crossed hello, now sendable.
    pub flush: Vec<PendingSend>,
}

/// Drives one user's end-to-end handshakes.
pub struct HandshakeDriver {
    local_id: u32,
    pending: Mutex<HashMap<u32, PendingHandshake>>,
}

impl HandshakeDriver {
    pub fn new(local_id: u32) -> Self {
        Self { local_id, pending: Mutex::new(HashMap::new()) }
    }

    /// IDLE → SENT_HELLO. Returns the `KEY_EXCHANGE` to send, or `None`
    /// if a handshake with this peer is already in flight.
    pub fn initiate(&self, peer_id: u32) -> Option<KeyExchange> {
        let mut pending = self.pending.lock().expect("handshake map poisoned");
        if pending.contains_key(&peer_id) {
            return None;
        }
        let (secret, public) = generate_keypair();
        let salt = generate_salt();
        pending.insert(
            peer_id,
            PendingHandshake { secret, salt, started_at: Instant::now(), queued: Vec::new() },
        );
        Some(KeyExchange {
            public_key: *public.as_bytes(),
            salt,
            role: KeyExchangeRole::Initiator,
        })
    }

    /// Queue a message behind the pending handshake with `peer_id`.
    ///
    /// Hands the message back as `Err` when no handshake is in flight —
    /// the session either completed in the meantime (send immediately)
    /// or was never started.
    pub fn enqueue(&self, peer_id: u32, send: PendingSend) -> Result<(), PendingSend> {
        let mut pending = self.pending.lock().expect("handshake map poisoned");
        match pending.get_mut(&peer_id) {
            Some(p) => {
                p.queued.push(send);
                Ok(())
            }
            None => Err(send),
        }
    }

    /// Abort one pending handshake (e.g. the server reported the peer
    /// offline). Returns its queued messages.
    pub fn abort(&self, peer_id: u32) -> Vec<PendingSend> {
        self.pending
            .lock()
            .expect("handshake map poisoned")
            .remove(&peer_id)
            .map(|p| p.queued)
            .unwrap_or_default()
    }

    pub fn is_pending(&self, peer_id: u32) -> bool {
        self.pending
            .lock()
            .expect("handshake map poisoned")
            .contains_key(&peer_id)
    }

    /// A peer's `KEY_EXCHANGE` arrived (RECEIVED_HELLO, or a crossed
    /// hello while we are in SENT_HELLO).
    ///
    /// Crossed hellos are broken deterministically: the side with the
    /// larger id abandons its own attempt and acts as responder; the
    /// smaller side ignores the incoming hello and keeps waiting for the
    /// peer's response.
    pub fn on_key_exchange(
        &self,
        peer_id: u32,
        msg: &KeyExchange,
        manager: &SessionKeyManager,
    ) -> Result<HelloOutcome, SessionError> {
        if msg.role != KeyExchangeRole::Initiator {
            return Err(SessionError::HandshakeFailed {
                peer_id,
                reason: "hello carried responder role",
            });
        }

        let crossed = {
            let pending = self.pending.lock().expect("handshake map poisoned");
            pending.contains_key(&peer_id)
        };
        if crossed && self.local_id < peer_id {
            return Ok(HelloOutcome { response: None, flush: Vec::new() });
        }

        let (secret, public) = generate_keypair();
        let key = derive_for(&secret, &msg.public_key, &msg.salt, peer_id)?;
        manager.install(ConversationId::private(peer_id), key);

        // Abandoned crossed attempt: its queue flushes on the new session.
        let flush = self
            .pending
            .lock()
            .expect("handshake map poisoned")
            .remove(&peer_id)
            .map(|p| p.queued)
            .unwrap_or_default();

        Ok(HelloOutcome {
            response: Some(KeyExchangeResponse {
                public_key: *public.as_bytes(),
                role: KeyExchangeRole::Responder,
            }),
            flush,
        })
    }

    /// SENT_HELLO + `KEY_EXCHANGE_RESPONSE` → ESTABLISHED. Returns the
    /// queued messages to flush.
    pub fn on_key_exchange_response(
        &self,
        peer_id: u32,
        msg: &KeyExchangeResponse,
        manager: &SessionKeyManager,
    ) -> Result<Vec<PendingSend>, SessionError> {
        let p = self
            .pending
            .lock()
            .expect("handshake map poisoned")
            .remove(&peer_id)
            .ok_or(SessionError::HandshakeFailed {
                peer_id,
                reason: "response without a hello in flight",
            })?;

        if msg.role != KeyExchangeRole::Responder {
            return Err(SessionError::HandshakeFailed {
                peer_id,
                reason: "response carried initiator role",
            });
        }

        let key = derive_for(&p.secret, &msg.public_key, &p.salt, peer_id)?;
        manager.install(ConversationId::private(peer_id), key);
        Ok(p.queued)
    }

    /// Fail every pending handshake older than [`HANDSHAKE_TIMEOUT`].
    /// Returns `(peer, queued messages)` per expired attempt so the
    /// caller can surface `HandshakeTimeout` for each queued send.
    pub fn expire(&self, now: Instant) -> Vec<(u32, Vec<PendingSend>)> {
        let mut pending = self.pending.lock().expect("handshake map poisoned");
        let expired: Vec<u32> = pending
            .iter()
            .filter(|(_, p)| now.duration_since(p.started_at) >= HANDSHAKE_TIMEOUT)
            .map(|(peer, _)| *peer)
            .collect();
        expired
            .into_iter()
            .filter_map(|peer| pending.remove(&peer).map(|p| (peer, p.queued)))
            .collect()
    }

    /// Abort every pending handshake (disconnect/logout). Returns the
    /// queued messages so their senders can be failed.
    pub fn abort_all(&self) -> Vec<(u32, Vec<PendingSend>)> {
        let mut pending = self.pending.lock().expect("handshake map poisoned");
        pending.drain().map(|(peer, p)| (peer, p.queued)).collect()
    }
}

fn derive_for(
    secret: &StaticSecret,
    peer_public: &[u8; 32],
    salt: &[u8; 16],
    peer_id: u32,
) -> Result<tchat_crypto::SessionKey, SessionError> {
    let ss = shared_secret(secret, &PublicKey::from(*peer_public));
    // All-zero output means a low-order public key; refuse it.
    if ss.iter().all(|b| *b == 0) {
        return Err(SessionError::HandshakeFailed {
            peer_id,
            reason: "degenerate public key",
        });
    }
    let conversation = ConversationId::private(peer_id);
    Ok(derive_session_key(&ss, salt, conversation.as_bytes()))
}

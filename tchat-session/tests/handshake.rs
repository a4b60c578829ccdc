use std::sync::Arc;
use std::time::{Duration, Instant};

use tchat_proto::messages::Text;
use tchat_proto::{KeyExchangeRole, MessageBody, MessageRegistry};
use tchat_session::{
    ConversationId, EncryptedChannel, HandshakeDriver, PendingSend, ReplayMode, SessionError,
    SessionKeyManager,
};

fn manager() -> Arc<SessionKeyManager> {
    Arc::new(SessionKeyManager::new(ReplayMode::Strict))
}

#[test]
fn two_sided_handshake_installs_matching_keys() {
    // Client 5 initiates towards client 7.
    let alice = HandshakeDriver::new(5);
    let bob = HandshakeDriver::new(7);
    let alice_mgr = manager();
    let bob_mgr = manager();

    let hello = alice.initiate(7).expect("fresh handshake");
    assert_eq!(hello.role, KeyExchangeRole::Initiator);
    assert!(alice.is_pending(7));

    // Bob sees the hello, installs his key and answers.
    let outcome = bob.on_key_exchange(5, &hello, &bob_mgr).unwrap();
    let response = outcome.response.expect("responder must answer");
    assert_eq!(response.role, KeyExchangeRole::Responder);
    assert!(bob_mgr.contains(&ConversationId::private(5)));

    // Alice completes.
    alice.on_key_exchange_response(7, &response, &alice_mgr).unwrap();
    assert!(!alice.is_pending(7));
    assert!(alice_mgr.contains(&ConversationId::private(7)));

    // Both sides hold the same key: a message sealed by Alice opens at
    // Bob. Conversation ids differ per side (`private_<peer>`), so wire
    // a message through to prove key equality.
    let registry = Arc::new(MessageRegistry::builtin());
    let a_chan = EncryptedChannel::new(alice_mgr, registry.clone());
    let b_chan = EncryptedChannel::new(bob_mgr, registry);

    let body = MessageBody::Text(Text { text: "hi".into() });
    let env = a_chan.seal(&ConversationId::private(7), 5, 7, &body).unwrap();
    let opened = b_chan.open(&ConversationId::private(5), 5, 7, &env).unwrap();
    assert_eq!(opened, body);
}

#[test]
fn queued_messages_flush_on_completion() {
    let alice = HandshakeDriver::new(5);
    let bob = HandshakeDriver::new(7);
    let alice_mgr = manager();
    let bob_mgr = manager();

    let hello = alice.initiate(7).unwrap();
    alice.enqueue(
        7,
        PendingSend { to_id: 7, body: MessageBody::Text(Text { text: "queued".into() }), token: 1 },
    ).unwrap();
    alice.enqueue(
        7,
        PendingSend { to_id: 7, body: MessageBody::Text(Text { text: "also".into() }), token: 2 },
    ).unwrap();

    let response = bob.on_key_exchange(5, &hello, &bob_mgr).unwrap().response.unwrap();
    let flushed = alice.on_key_exchange_response(7, &response, &alice_mgr).unwrap();
    assert_eq!(flushed.len(), 2);
    assert_eq!(flushed[0].token, 1);
    assert_eq!(flushed[1].token, 2);
}

#[test]
fn crossed_hellos_resolve_deterministically() {
    // Both sides initiate at once. 7 > 5, so 7 must abandon its own
    // attempt and respond; 5 must ignore 7's hello and wait.
    let small = HandshakeDriver::new(5);
    let large = HandshakeDriver::new(7);
    let small_mgr = manager();
    let large_mgr = manager();

    let hello_small = small.initiate(7).unwrap();
    let hello_large = large.initiate(5).unwrap();

    // Small side receives the crossed hello: no response, keeps waiting.
    let outcome = small.on_key_exchange(7, &hello_large, &small_mgr).unwrap();
    assert!(outcome.response.is_none(), "smaller id must not respond");
    assert!(small.is_pending(7));
    assert!(!small_mgr.contains(&ConversationId::private(7)));

    // Large side receives the crossed hello: acts as responder.
    let outcome = large.on_key_exchange(5, &hello_small, &large_mgr).unwrap();
    let response = outcome.response.expect("larger id must respond");
    assert!(!large.is_pending(5), "abandoned attempt is cleared");
    assert!(large_mgr.contains(&ConversationId::private(5)));

    // Small side completes from the response.
    small.on_key_exchange_response(7, &response, &small_mgr).unwrap();
    assert!(small_mgr.contains(&ConversationId::private(7)));
}

#[test]
fn crossed_hello_flushes_the_abandoned_queue() {
    let large = HandshakeDriver::new(7);
    let large_mgr = manager();
    let peer_hello = HandshakeDriver::new(5).initiate(7).unwrap();

    large.initiate(5).unwrap();
    large.enqueue(
        5,
        PendingSend { to_id: 5, body: MessageBody::Text(Text { text: "queued".into() }), token: 9 },
    ).unwrap();

    let outcome = large.on_key_exchange(5, &peer_hello, &large_mgr).unwrap();
    assert!(outcome.response.is_some());
    assert_eq!(outcome.flush.len(), 1, "abandoned attempt's queue must flush");
    assert_eq!(outcome.flush[0].token, 9);
}

#[test]
fn response_without_hello_fails() {
    let driver = HandshakeDriver::new(5);
    let mgr = manager();
    let bogus = tchat_proto::messages::KeyExchangeResponse {
        public_key: [1; 32],
        role: KeyExchangeRole::Responder,
    };
    assert!(matches!(
        driver.on_key_exchange_response(7, &bogus, &mgr),
        Err(SessionError::HandshakeFailed { .. })
    ));
}

#[test]
fn hello_with_responder_role_fails() {
    let driver = HandshakeDriver::new(7);
    let mgr = manager();
    let bogus = tchat_proto::messages::KeyExchange {
        public_key: [1; 32],
        salt: [0; 16],
        role: KeyExchangeRole::Responder,
    };
    assert!(matches!(
        driver.on_key_exchange(5, &bogus, &mgr),
        Err(SessionError::HandshakeFailed { .. })
    ));
}

#[test]
fn degenerate_public_key_is_refused() {
    // The all-zero point yields an all-zero shared secret.
    let driver = HandshakeDriver::new(7);
    let mgr = manager();
    let evil = tchat_proto::messages::KeyExchange {
        public_key: [0; 32],
        salt: [0; 16],
        role: KeyExchangeRole::Initiator,
    };
    assert!(matches!(
        driver.on_key_exchange(5, &evil, &mgr),
        Err(SessionError::HandshakeFailed { .. })
    ));
    assert!(!mgr.contains(&ConversationId::private(5)));
}

#[test]
fn expiry_returns_queued_sends_and_resets_to_idle() {
    let driver = HandshakeDriver::new(5);
    driver.initiate(7).unwrap();
    driver.enqueue(
        7,
        PendingSend { to_id: 7, body: MessageBody::Text(Text { text: "stuck".into() }), token: 3 },
    ).unwrap();

    // Nothing expires immediately.
    assert!(driver.expire(Instant::now()).is_empty());
    assert!(driver.is_pending(7));

    // Past the timeout the attempt dies and the queue comes back.
    let late = Instant::now() + Duration::from_secs(11);
    let expired = driver.expire(late);
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].0, 7);
    assert_eq!(expired[0].1.len(), 1);
    assert!(!driver.is_pending(7), "state machine must return to IDLE");

    // A new handshake may start afterwards.
    assert!(driver.initiate(7).is_some());
}

#[test]
fn enqueue_without_a_pending_handshake_hands_the_message_back() {
    let driver = HandshakeDriver::new(5);
    let send =
        PendingSend { to_id: 7, body: MessageBody::Text(Text { text: "now".into() }), token: 1 };
    let returned = driver.enqueue(7, send).expect_err("nothing pending for 7");
    assert_eq!(returned.token, 1);
}

#[test]
fn abort_clears_one_peer_only() {
    let driver = HandshakeDriver::new(5);
    driver.initiate(7).unwrap();
    driver.initiate(9).unwrap();
    driver
        .enqueue(
            7,
            PendingSend { to_id: 7, body: MessageBody::Text(Text { text: "x".into() }), token: 4 },
        )
        .unwrap();

    let queued = driver.abort(7);
    assert_eq!(queued.len(), 1);
    assert!(!driver.is_pending(7));
    assert!(driver.is_pending(9));
}

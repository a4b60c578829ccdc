//! Full-stack tests: real server, real clients, loopback TCP.

use std::net::SocketAddr;
use std::time::Duration;

use tchat_client::{Client, Config, Event, EventStream};
use tchat_proto::messages::Text;
use tchat_proto::{MessageBody, MessageStatus};
use tchat_server::{Server, ServerConfig};

async fn start_server() -> SocketAddr {
    let _ = tracing_subscriber::fmt::try_init();
    let server = Server::bind(&ServerConfig { port: 0 }).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    addr
}

async fn connect(addr: SocketAddr, pseudo: &str) -> (Client, EventStream) {
    Client::connect(Config {
        host: "127.0.0.1".into(),
        port: addr.port(),
        pseudo: pseudo.into(),
        ..Default::default()
    })
    .await
    .expect("client connect")
}

/// Wait up to five seconds for an event matching `pred`.
async fn wait_for(
    events: &mut EventStream,
    what: &str,
    pred: impl Fn(&Event) -> bool,
) -> Event {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = events.next().await.expect("event stream ended");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
}

/// Drive the contact-request flow until both sides are mutual contacts.
async fn make_contacts(
    a: &Client,
    a_events: &mut EventStream,
    b: &Client,
    b_events: &mut EventStream,
) {
    a.request_contact(b.client_id()).await.unwrap();
    wait_for(b_events, "contact request", |e| {
        matches!(e, Event::ServerNotice(MessageBody::ContactRequest(r)) if r.peer_id == a.client_id())
    })
    .await;
    b.respond_contact(a.client_id(), true).await.unwrap();
    wait_for(a_events, "contact response", |e| {
        matches!(e, Event::ServerNotice(MessageBody::ContactRequestResponse(r))
            if r.peer_id == b.client_id() && r.accepted)
    })
    .await;
}

fn text(s: &str) -> MessageBody {
    MessageBody::Text(Text { text: s.into() })
}

// ─── scenarios ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn connect_assigns_ids() {
    let addr = start_server().await;
    let (alice, _ae) = connect(addr, "alice").await;
    let (bob, _be) = connect(addr, "bob").await;

    assert!(alice.is_new());
    assert!(bob.is_new());
    assert_ne!(alice.client_id(), bob.client_id());
}

#[tokio::test]
async fn handshake_then_message_delivers_plaintext() {
    // S3: first send triggers the handshake, then the text arrives.
    let addr = start_server().await;
    let (alice, mut ae) = connect(addr, "alice").await;
    let (bob, mut be) = connect(addr, "bob").await;
    make_contacts(&alice, &mut ae, &bob, &mut be).await;

    let receipt = alice.send_message(bob.client_id(), text("hi")).await.unwrap();
    assert!(receipt.pending, "no session yet: the send must queue");
    assert_eq!(receipt.initial_status, MessageStatus::Sending);

    // Alice's side completes the handshake…
    wait_for(&mut ae, "session established", |e| {
        matches!(e, Event::SessionEstablished { peer_id } if *peer_id == bob.client_id())
    })
    .await;

    // …and Bob receives exactly the plaintext.
    let event = wait_for(&mut be, "incoming text", |e| {
        matches!(e, Event::Incoming { .. })
    })
    .await;
    let Event::Incoming { from_id, group_id, body } = event else { unreachable!() };
    assert_eq!(from_id, alice.client_id());
    assert_eq!(group_id, None);
    assert_eq!(body, text("hi"));

    // The server acked the relay.
    wait_for(&mut ae, "sent status", |e| {
        matches!(e, Event::Status { message_id, status: MessageStatus::Sent, .. }
            if *message_id == receipt.message_id)
    })
    .await;
}

#[tokio::test]
async fn established_session_is_reused() {
    let addr = start_server().await;
    let (alice, mut ae) = connect(addr, "alice").await;
    let (bob, mut be) = connect(addr, "bob").await;
    make_contacts(&alice, &mut ae, &bob, &mut be).await;

    alice.send_message(bob.client_id(), text("first")).await.unwrap();
    wait_for(&mut be, "first text", |e| matches!(e, Event::Incoming { .. })).await;

    // Second message must not queue: the session exists.
    let receipt = alice.send_message(bob.client_id(), text("second")).await.unwrap();
    assert!(!receipt.pending);
    let event = wait_for(&mut be, "second text", |e| matches!(e, Event::Incoming { .. })).await;
    let Event::Incoming { body, .. } = event else { unreachable!() };
    assert_eq!(body, text("second"));
}

#[tokio::test]
async fn delivered_ack_reaches_the_sender() {
    let addr = start_server().await;
    let (alice, mut ae) = connect(addr, "alice").await;
    let (bob, mut be) = connect(addr, "bob").await;
    make_contacts(&alice, &mut ae, &bob, &mut be).await;

    let receipt = alice.send_message(bob.client_id(), text("hi")).await.unwrap();
    wait_for(&mut be, "incoming", |e| matches!(e, Event::Incoming { .. })).await;

    wait_for(&mut ae, "delivered", |e| {
        matches!(e, Event::Status { message_id, status: MessageStatus::Delivered, .. }
            if *message_id == receipt.message_id)
    })
    .await;
}

#[tokio::test]
async fn non_contact_relay_is_refused() {
    // S5: the handshake bootstraps (key-exchange bypass), but content is
    // rejected and the recipient sees nothing.
    let addr = start_server().await;
    let (alice, mut ae) = connect(addr, "alice").await;
    let (charlie, mut ce) = connect(addr, "charlie").await;

    let receipt = alice.send_message(charlie.client_id(), text("psst")).await.unwrap();

    let event = wait_for(&mut ae, "failed status", |e| {
        matches!(e, Event::Status { message_id, status: MessageStatus::Failed, .. }
            if *message_id == receipt.message_id)
    })
    .await;
    let Event::Status { reason, .. } = event else { unreachable!() };
    assert_eq!(reason, "not authorized");

    // Charlie must never see the content (the key exchange itself is
    // allowed through — that is the documented bootstrap policy).
    let quiet = tokio::time::timeout(Duration::from_millis(500), async {
        loop {
            match ce.next().await {
                Some(Event::Incoming { .. }) => panic!("charlie received content"),
                Some(_) => continue,
                None => break,
            }
        }
    })
    .await;
    assert!(quiet.is_err(), "stream should stay open and silent");
}

#[tokio::test]
async fn offline_recipient_fails_the_send() {
    let addr = start_server().await;
    let (alice, mut ae) = connect(addr, "alice").await;

    let receipt = alice.send_message(4242, text("anyone home?")).await.unwrap();
    assert!(receipt.pending);

    let event = wait_for(&mut ae, "offline failure", |e| {
        matches!(e, Event::Status { message_id, status: MessageStatus::Failed, .. }
            if *message_id == receipt.message_id)
    })
    .await;
    let Event::Status { reason, .. } = event else { unreachable!() };
    assert_eq!(reason, "recipient offline");
}

#[tokio::test]
async fn file_transfer_end_to_end() {
    let addr = start_server().await;
    let (alice, mut ae) = connect(addr, "alice").await;
    let (bob, mut be) = connect(addr, "bob").await;
    make_contacts(&alice, &mut ae, &bob, &mut be).await;

    let payload: Vec<u8> = (0..200_000usize).map(|i| (i % 253) as u8).collect();
    let file_id = alice.send_file(bob.client_id(), "blob.bin", &payload).await.unwrap();

    let event = wait_for(&mut be, "file received", |e| {
        matches!(e, Event::FileReceived { .. })
    })
    .await;
    let Event::FileReceived { from_id, file_id: got_id, filename, bytes } = event else {
        unreachable!()
    };
    assert_eq!(from_id, alice.client_id());
    assert_eq!(got_id, file_id);
    assert_eq!(filename, "blob.bin");
    assert_eq!(bytes, payload);
}

#[tokio::test]
async fn group_flow_distributes_key_and_fans_out() {
    let addr = start_server().await;
    let (alice, mut ae) = connect(addr, "alice").await;
    let (bob, mut be) = connect(addr, "bob").await;
    make_contacts(&alice, &mut ae, &bob, &mut be).await;

    // Pairwise session first: the group key travels end-to-end.
    alice.send_message(bob.client_id(), text("pre")).await.unwrap();
    wait_for(&mut be, "pairwise message", |e| matches!(e, Event::Incoming { .. })).await;

    alice.create_group("rustaceans").await.unwrap();
    let event = wait_for(&mut ae, "group created", |e| {
        matches!(e, Event::ServerNotice(MessageBody::CreateGroup(_)))
    })
    .await;
    let Event::ServerNotice(MessageBody::CreateGroup(created)) = event else { unreachable!() };
    let group_id = created.group_id;
    assert!(group_id >= tchat_proto::GROUP_ID_BASE);

    alice.add_group_member(group_id, bob.client_id()).await.unwrap();
    wait_for(&mut be, "membership notice", |e| {
        matches!(e, Event::ServerNotice(MessageBody::AddGroupMember(m)) if m.group_id == group_id)
    })
    .await;

    alice.distribute_group_key(group_id, &[bob.client_id()]).await.unwrap();
    wait_for(&mut be, "group key", |e| {
        matches!(e, Event::GroupKeyInstalled { group_id: g } if *g == group_id)
    })
    .await;

    let receipt = alice.send_message(group_id, text("hello group")).await.unwrap();
    assert!(!receipt.pending);
    let event = wait_for(&mut be, "group message", |e| {
        matches!(e, Event::Incoming { group_id: Some(_), .. })
    })
    .await;
    let Event::Incoming { from_id, group_id: got, body } = event else { unreachable!() };
    assert_eq!(from_id, alice.client_id());
    assert_eq!(got, Some(group_id));
    assert_eq!(body, text("hello group"));
}

#[tokio::test]
async fn sessions_persist_across_reconnect() {
    let addr = start_server().await;
    let keys = tempfile::tempdir().unwrap();

    let (alice, mut ae) = Client::connect(Config {
        host: "127.0.0.1".into(),
        port: addr.port(),
        pseudo: "alice".into(),
        keystore_dir: keys.path().to_path_buf(),
        ..Default::default()
    })
    .await
    .unwrap();
    alice.authenticate("pw").await.unwrap();
    let alice_id = alice.client_id();

    let (bob, mut be) = connect(addr, "bob").await;
    make_contacts(&alice, &mut ae, &bob, &mut be).await;

    alice.send_message(bob.client_id(), text("one")).await.unwrap();
    wait_for(&mut be, "first message", |e| matches!(e, Event::Incoming { .. })).await;
    alice.disconnect().await;

    // Same account, same store, fresh connection: the restored session
    // must be used as-is, no new handshake, and still decrypt at Bob.
    let (alice2, _ae2) = Client::connect(Config {
        host: "127.0.0.1".into(),
        port: addr.port(),
        pseudo: String::new(),
        user_id: Some(alice_id),
        keystore_dir: keys.path().to_path_buf(),
        ..Default::default()
    })
    .await
    .unwrap();
    alice2.authenticate("pw").await.unwrap();

    let receipt = alice2.send_message(bob.client_id(), text("two")).await.unwrap();
    assert!(!receipt.pending, "restored session must be reused");
    let event = wait_for(&mut be, "post-restart message", |e| {
        matches!(e, Event::Incoming { body, .. } if *body == text("two"))
    })
    .await;
    let Event::Incoming { from_id, .. } = event else { unreachable!() };
    assert_eq!(from_id, alice_id);
}

#[tokio::test]
async fn group_message_without_key_is_a_local_error() {
    let addr = start_server().await;
    let (alice, _ae) = connect(addr, "alice").await;
    let bogus_group = tchat_proto::GROUP_ID_BASE + 7;
    assert!(matches!(
        alice.send_message(bogus_group, text("hi")).await,
        Err(tchat_client::ClientError::NoGroupKey { .. })
    ));
}

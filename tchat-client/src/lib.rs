//! # tchat-client
//!
//! Async TchatsApp client built on the session core.
//!
//! ## What it does
//! - Connects over TCP and runs the hop handshake, so every
//!   client↔server control message is encrypted on its own hop
//! - Creates or resumes an account (`CREATE_USER` / `CONNECT_USER`)
//! - Establishes end-to-end sessions on demand (implicit handshake on
//!   first send, queued messages flush on completion)
//! - Sends texts, media, reactions, files (chunked) and group traffic
//! - Delivers everything incoming on a typed [`EventStream`]
//! - Persists identity and session keys through the at-rest store
//!
//! ```no_run
//! use tchat_client::{Client, Config};
//! use tchat_proto::messages::Text;
//! use tchat_proto::MessageBody;
//!
//! # async fn demo() -> Result<(), tchat_client::ClientError> {
//! let (client, mut events) = Client::connect(Config {
//!     host: "127.0.0.1".into(),
//!     pseudo: "alice".into(),
//!     ..Default::default()
//! })
//! .await?;
//! client.authenticate("hunter2").await?;
//! client.send_message(7, MessageBody::Text(Text { text: "hi".into() })).await?;
//! while let Some(event) = events.next().await { /* … */ }
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

mod errors;
mod events;
mod incoming;

pub use errors::ClientError;
pub use events::{Event, EventStream, SendReceipt};
pub use tchat_session::ReplayMode;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use tchat_crypto::generate_keypair;
use tchat_proto::messages::{ConnectUser, CreateUser, MessageAck, ServerKeyExchangeResponse};
use tchat_proto::{
    FramingError, MessageBody, MessageRegistry, MessageStatus, MessageType, Packet, Serializable,
    DEFAULT_PORT, GROUP_ID_BASE, SERVER_ID,
};
use tchat_session::{
    derive_hop_session, new_group_key, plan_transfer, ConversationId, EncryptedChannel,
    GroupKeyring, HandshakeDriver, IncomingTransfers, KeyStore, PendingSend, SessionKeyManager,
    CHUNK_SIZE_DEFAULT,
};

pub(crate) const WRITE_QUEUE_CAPACITY: usize = 256;
pub(crate) const READ_TIMEOUT: Duration = Duration::from_secs(30);
pub(crate) const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DISCONNECT_FLUSH: Duration = Duration::from_secs(1);

/// Offset added to a restored session's persisted send counter, covering
/// any sends that happened after the last save.
const SEQ_RESUME_JUMP: u64 = 1 << 20;

// ─── Config ───────────────────────────────────────────────────────────────────

/// Configuration for [`Client::connect`].
#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Pseudonym for a fresh account (`CREATE_USER`).
    pub pseudo: String,
    /// Resume this account instead of creating one.
    pub user_id: Option<u32>,
    /// Root of the at-rest key store.
    pub keystore_dir: PathBuf,
    /// Replay validation mode for every session (strict by default; the
    /// transport is ordered).
    pub replay_mode: ReplayMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            pseudo: String::new(),
            user_id: None,
            keystore_dir: default_keystore_dir(),
            replay_mode: ReplayMode::Strict,
        }
    }
}

impl Config {
    /// Defaults overridden by `TCHATSAPP_PORT` / `TCHATSAPP_KEYSTORE_DIR`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(port) = std::env::var("TCHATSAPP_PORT").ok().and_then(|v| v.parse().ok()) {
            config.port = port;
        }
        config
    }
}

fn default_keystore_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("TCHATSAPP_KEYSTORE_DIR") {
        return PathBuf::from(dir);
    }
    let home = std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    home.join(".tchatsapp").join("keys")
}

// ─── ClientInner ─────────────────────────────────────────────────────────────

pub(crate) struct ClientInner {
    pub(crate) local_id: u32,
    is_new: bool,
    keystore_dir: PathBuf,
    /// One channel for both layers; hop and E2E conversations have
    /// disjoint id spaces.
    pub(crate) channel: EncryptedChannel,
    pub(crate) hop_conversation: ConversationId,
    pub(crate) driver: HandshakeDriver,
    pub(crate) keyring: GroupKeyring,
    pub(crate) transfers: Mutex<IncomingTransfers>,
    /// `(peer, seq)` → local message id, for ack correlation.
    pub(crate) pending_acks: Mutex<HashMap<(u32, u64), u64>>,
    next_message_id: AtomicU64,
    next_file_id: AtomicU64,
    pub(crate) store: Mutex<Option<KeyStore>>,
    writer_tx: mpsc::Sender<Packet>,
    events_tx: mpsc::UnboundedSender<Event>,
    pub(crate) connected: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ClientInner {
    pub(crate) fn emit(&self, event: Event) {
        let _ = self.events_tx.send(event);
    }

    pub(crate) async fn send_packet(&self, packet: Packet) -> Result<(), ClientError> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(ClientError::NotConnected);
        }
        self.writer_tx
            .send(packet)
            .await
            .map_err(|_| ClientError::NotConnected)
    }

    /// Hop-wrap a server-terminal body and queue it.
    pub(crate) async fn send_to_server(&self, body: MessageBody) -> Result<(), ClientError> {
        let envelope = self
            .channel
            .seal(&self.hop_conversation, self.local_id, SERVER_ID, &body)?;
        self.send_packet(Packet::new(
            MessageType::ServerEncrypted,
            self.local_id,
            SERVER_ID,
            envelope.to_bytes(),
        ))
        .await
    }

    /// Seal an E2E body and queue it; registers the `(peer, seq)` ack key.
    pub(crate) async fn seal_and_send(
        &self,
        to_id: u32,
        conversation: &ConversationId,
        body: &MessageBody,
        message_id: u64,
    ) -> Result<(), ClientError> {
        let envelope = self.channel.seal(conversation, self.local_id, to_id, body)?;
        self.pending_acks
            .lock()
            .expect("pending ack map poisoned")
            .insert((to_id, envelope.seq), message_id);
        self.send_packet(Packet::new(
            MessageType::Encrypted,
            self.local_id,
            to_id,
            envelope.to_bytes(),
        ))
        .await
    }

    /// Write a session's key and current send counter to the store, if
    /// unlocked.
    pub(crate) fn persist_session(&self, conversation: &ConversationId) {
        let store = self.store.lock().expect("store slot poisoned");
        let Some(store) = store.as_ref() else { return };
        match self.channel.manager().snapshot(conversation) {
            Ok((key, send_seq)) => {
                if let Err(e) = store.save_session_key(conversation, &key, send_seq) {
                    log::warn!("could not persist {conversation}: {e}");
                }
            }
            Err(_) => {}
        }
    }

    /// Flush messages that were queued behind a handshake.
    pub(crate) async fn flush_queued(&self, peer_id: u32, queued: Vec<PendingSend>) {
        let conversation = ConversationId::private(peer_id);
        for send in queued {
            if let Err(e) = self
                .seal_and_send(send.to_id, &conversation, &send.body, send.token)
                .await
            {
                self.emit(Event::Status {
                    message_id: send.token,
                    status: MessageStatus::Failed,
                    reason: e.to_string(),
                });
            }
        }
    }
}

/// Which conversation a destination id belongs to.
fn conversation_for(to_id: u32) -> (ConversationId, bool) {
    if to_id >= GROUP_ID_BASE {
        (ConversationId::group(to_id), true)
    } else {
        (ConversationId::private(to_id), false)
    }
}

// ─── Client ──────────────────────────────────────────────────────────────────

/// The TchatsApp client. Cheap to clone — internally Arc-wrapped.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    // ── Connect ────────────────────────────────────────────────────────

    /// TCP connect, hop handshake, account creation/resumption. Returns
    /// the client handle and its event stream.
    pub async fn connect(config: Config) -> Result<(Self, EventStream), ClientError> {
        let mut stream = TcpStream::connect((config.host.as_str(), config.port))
            .await
            .map_err(ClientError::ConnectionFailed)?;

        let registry = Arc::new(MessageRegistry::builtin());
        let manager = Arc::new(SessionKeyManager::new(config.replay_mode));
        let channel = EncryptedChannel::new(manager.clone(), registry.clone());

        // ── hop handshake ───────────────────────────────────────────
        let first = read_connect_packet(&mut stream).await?;
        if first.kind() != MessageType::ServerKeyExchange {
            return Err(ClientError::Handshake("expected SERVER_KEY_EXCHANGE first"));
        }
        let Ok(MessageBody::ServerKeyExchange(server_hello)) = registry.decode(&first) else {
            return Err(ClientError::Handshake("malformed SERVER_KEY_EXCHANGE"));
        };

        let (secret, public) = generate_keypair();
        let client_pub = *public.as_bytes();
        MessageBody::ServerKeyExchangeResponse(ServerKeyExchangeResponse {
            public_key: client_pub,
        })
        .into_packet(0, SERVER_ID)
        .write_to(&mut stream)
        .await
        .map_err(framing)?;

        let (hop_conversation, hop_key) = derive_hop_session(
            &secret,
            &server_hello.public_key,
            &server_hello.public_key,
            &client_pub,
        )
        .ok_or(ClientError::Handshake("degenerate server public key"))?;
        manager.install(hop_conversation.clone(), hop_key);

        // ── authenticate the connection ─────────────────────────────
        let auth = match config.user_id {
            Some(user_id) => MessageBody::ConnectUser(ConnectUser { user_id }),
            None => MessageBody::CreateUser(CreateUser { pseudo: config.pseudo.clone() }),
        };
        let envelope = channel.seal(&hop_conversation, 0, SERVER_ID, &auth)?;
        Packet::new(MessageType::ServerEncrypted, 0, SERVER_ID, envelope.to_bytes())
            .write_to(&mut stream)
            .await
            .map_err(framing)?;

        let (local_id, is_new) = loop {
            let packet = read_connect_packet(&mut stream).await?;
            if packet.kind() != MessageType::ServerEncrypted {
                continue;
            }
            let Ok(MessageBody::ServerEncrypted(env)) = registry.decode(&packet) else {
                continue;
            };
            match channel.open(&hop_conversation, packet.from_id(), packet.to_id(), &env) {
                Ok(MessageBody::AckConnection(ack)) => break (ack.user_id, ack.is_new),
                Ok(MessageBody::Error(_)) => {
                    return Err(ClientError::Handshake("server refused the connection"));
                }
                Ok(_) => continue,
                Err(e) => return Err(e.into()),
            }
        };
        log::info!("connected as user {local_id} (new: {is_new})");

        // ── task wiring ─────────────────────────────────────────────
        let (writer_tx, writer_rx) = mpsc::channel(WRITE_QUEUE_CAPACITY);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (read_half, write_half) = stream.into_split();

        let inner = Arc::new(ClientInner {
            local_id,
            is_new,
            keystore_dir: config.keystore_dir.clone(),
            channel,
            hop_conversation,
            driver: HandshakeDriver::new(local_id),
            keyring: GroupKeyring::new(),
            transfers: Mutex::new(IncomingTransfers::new()),
            pending_acks: Mutex::new(HashMap::new()),
            next_message_id: AtomicU64::new(1),
            next_file_id: AtomicU64::new(1),
            store: Mutex::new(None),
            writer_tx,
            events_tx,
            connected: AtomicBool::new(true),
            tasks: Mutex::new(Vec::new()),
        });

        let tasks = vec![
            tokio::spawn(write_loop(write_half, writer_rx)),
            tokio::spawn(incoming::run(inner.clone(), read_half)),
            tokio::spawn(keepalive_loop(inner.clone())),
            tokio::spawn(expiry_loop(inner.clone())),
        ];
        *inner.tasks.lock().expect("task list poisoned") = tasks;

        Ok((Self { inner }, EventStream { rx: events_rx }))
    }

    /// Our user id, as assigned or resumed at connect time.
    pub fn client_id(&self) -> u32 {
        self.inner.local_id
    }

    /// Whether connect created a fresh account.
    pub fn is_new(&self) -> bool {
        self.inner.is_new
    }

    // ── Key store ──────────────────────────────────────────────────────

    /// Unlock the at-rest key store and restore persisted sessions.
    /// Creates (and persists) the identity keypair on first use.
    pub async fn authenticate(&self, password: &str) -> Result<(), ClientError> {
        let store =
            KeyStore::open_with_password(&self.inner.keystore_dir, self.inner.local_id, password)?;
        self.adopt_store(store)
    }

    /// Unlock the store without a password: the master key lives in
    /// plaintext on disk. The session layer logs a warning every time.
    pub async fn authenticate_without_password(&self) -> Result<(), ClientError> {
        let store = KeyStore::open_without_password(&self.inner.keystore_dir, self.inner.local_id)?;
        self.adopt_store(store)
    }

    fn adopt_store(&self, store: KeyStore) -> Result<(), ClientError> {
        if store.load_identity()?.is_none() {
            let (identity, _) = generate_keypair();
            store.save_identity(&identity)?;
        }
        for (conversation, key, send_seq) in store.load_all_session_keys()? {
            // Resume far above the persisted floor: sends since the last
            // save are unknown, and peers only require monotonicity.
            self.inner.channel.manager().install_restored(
                conversation,
                key,
                send_seq + SEQ_RESUME_JUMP,
            );
        }
        *self.inner.store.lock().expect("store slot poisoned") = Some(store);
        Ok(())
    }

    // ── Sending ────────────────────────────────────────────────────────

    /// Send one logical message. End-to-end encryption is implicit for
    /// peer and group destinations; a missing session queues the message
    /// and triggers the handshake (`pending` in the receipt).
    pub async fn send_message(
        &self,
        to_id: u32,
        body: MessageBody,
    ) -> Result<SendReceipt, ClientError> {
        let message_id = self.inner.next_message_id.fetch_add(1, Ordering::Relaxed);
        let receipt = |pending| SendReceipt {
            message_id,
            initial_status: MessageStatus::Sending,
            pending,
        };

        if to_id == SERVER_ID {
            self.inner.send_to_server(body).await?;
            return Ok(receipt(false));
        }
        if body.kind().bypasses_e2e() {
            self.inner
                .send_packet(body.into_packet(self.inner.local_id, to_id))
                .await?;
            return Ok(receipt(false));
        }

        let (conversation, is_group) = conversation_for(to_id);
        if self.inner.channel.manager().contains(&conversation) {
            self.inner
                .seal_and_send(to_id, &conversation, &body, message_id)
                .await?;
            return Ok(receipt(false));
        }
        if is_group {
            // Group keys only ever arrive from the admin; nothing to
            // handshake with.
            return Err(ClientError::NoGroupKey { group_id: to_id });
        }

        // No session: queue behind the handshake, starting one if needed.
        if let Some(hello) = self.inner.driver.initiate(to_id) {
            self.inner
                .send_packet(
                    MessageBody::KeyExchange(hello).into_packet(self.inner.local_id, to_id),
                )
                .await?;
        }
        match self
            .inner
            .driver
            .enqueue(to_id, PendingSend { to_id, body, token: message_id })
        {
            Ok(()) => Ok(receipt(true)),
            Err(send) => {
                // The handshake completed between initiate and enqueue.
                self.inner
                    .seal_and_send(to_id, &conversation, &send.body, message_id)
                    .await?;
                Ok(receipt(false))
            }
        }
    }

    /// Start (or confirm) an end-to-end session with a peer. Normally
    /// implicit in [`Client::send_message`].
    pub async fn ensure_session(&self, peer_id: u32) -> Result<(), ClientError> {
        let conversation = ConversationId::private(peer_id);
        if self.inner.channel.manager().contains(&conversation) {
            return Ok(());
        }
        if let Some(hello) = self.inner.driver.initiate(peer_id) {
            self.inner
                .send_packet(
                    MessageBody::KeyExchange(hello).into_packet(self.inner.local_id, peer_id),
                )
                .await?;
        }
        Ok(())
    }

    /// Rotate the session with a peer: the old key is destroyed (memory
    /// and disk) and a fresh handshake starts immediately.
    pub async fn rotate_session(&self, peer_id: u32) -> Result<(), ClientError> {
        self.forget_session(peer_id);
        if let Some(hello) = self.inner.driver.initiate(peer_id) {
            self.inner
                .send_packet(
                    MessageBody::KeyExchange(hello).into_packet(self.inner.local_id, peer_id),
                )
                .await?;
        }
        Ok(())
    }

    /// Destroy the session with a peer (conversation deleted). The key
    /// leaves memory at once and is shredded on disk.
    pub fn forget_session(&self, peer_id: u32) {
        let conversation = ConversationId::private(peer_id);
        self.inner.channel.manager().remove(&conversation);
        let store = self.inner.store.lock().expect("store slot poisoned");
        if let Some(store) = store.as_ref() {
            if let Err(e) = store.delete_session_key(&conversation) {
                log::warn!("could not shred {conversation}: {e}");
            }
        }
    }

    /// Send a file as `FILE_TRANSFER_START` + encrypted chunks. Returns
    /// the transfer's file id.
    pub async fn send_file(
        &self,
        to_id: u32,
        filename: &str,
        bytes: &[u8],
    ) -> Result<String, ClientError> {
        let n = self.inner.next_file_id.fetch_add(1, Ordering::Relaxed);
        let file_id = format!("{}-{n}", self.inner.local_id);
        let (start, chunks) = plan_transfer(&file_id, filename, bytes, CHUNK_SIZE_DEFAULT);

        self.send_message(to_id, MessageBody::FileTransferStart(start)).await?;
        for chunk in chunks {
            self.send_message(to_id, MessageBody::FileChunk(chunk)).await?;
        }
        Ok(file_id)
    }

    /// Report a message as read to its sender.
    pub async fn mark_read(&self, peer_id: u32, seq: u64) -> Result<(), ClientError> {
        self.inner
            .send_packet(
                MessageBody::MessageAck(MessageAck {
                    peer_id: self.inner.local_id,
                    seq,
                    status: MessageStatus::Read,
                    reason: String::new(),
                })
                .into_packet(self.inner.local_id, peer_id),
            )
            .await
    }

    // ── Groups ─────────────────────────────────────────────────────────

    /// Admin: mint a fresh group key (next epoch), install it locally
    /// and distribute it to every member over their pairwise session.
    /// Call again after any membership change.
    pub async fn distribute_group_key(
        &self,
        group_id: u32,
        members: &[u32],
    ) -> Result<(), ClientError> {
        let epoch = self.inner.keyring.epoch(group_id).map_or(1, |e| e + 1);
        let dist = new_group_key(group_id, epoch);
        self.inner.keyring.install(self.inner.channel.manager(), &dist);
        self.inner.persist_session(&ConversationId::group(group_id));

        for member in members {
            if *member == self.inner.local_id {
                continue;
            }
            self.send_message(*member, MessageBody::GroupKeyDistribution(dist.clone()))
                .await?;
        }
        Ok(())
    }

    // ── Management ─────────────────────────────────────────────────────

    /// File a contact request with the server.
    pub async fn request_contact(&self, peer_id: u32) -> Result<(), ClientError> {
        self.inner
            .send_to_server(MessageBody::ContactRequest(tchat_proto::messages::ContactRequest {
                peer_id,
                pseudo: String::new(), // the server fills in our pseudo
            }))
            .await
    }

    /// Answer a contact request previously surfaced as a
    /// [`Event::ServerNotice`].
    pub async fn respond_contact(&self, peer_id: u32, accepted: bool) -> Result<(), ClientError> {
        self.inner
            .send_to_server(MessageBody::ContactRequestResponse(
                tchat_proto::messages::ContactRequestResponse { peer_id, accepted },
            ))
            .await
    }

    pub async fn remove_contact(&self, contact_id: u32) -> Result<(), ClientError> {
        self.inner
            .send_to_server(MessageBody::RemoveContact(tchat_proto::messages::RemoveContact {
                contact_id,
            }))
            .await
    }

    /// Create a group; the server's confirmation (with the assigned id)
    /// arrives as a [`Event::ServerNotice`].
    pub async fn create_group(&self, name: &str) -> Result<(), ClientError> {
        self.inner
            .send_to_server(MessageBody::CreateGroup(tchat_proto::messages::CreateGroup {
                group_id: 0,
                name: name.to_string(),
            }))
            .await
    }

    /// Admin: add a member. Remember to redistribute the group key.
    pub async fn add_group_member(&self, group_id: u32, member_id: u32) -> Result<(), ClientError> {
        self.inner
            .send_to_server(MessageBody::AddGroupMember(tchat_proto::messages::AddGroupMember {
                group_id,
                member_id,
            }))
            .await
    }

    /// Admin: remove a member. Key rotation afterwards is mandatory —
    /// call [`Client::distribute_group_key`] with the remaining members.
    pub async fn remove_group_member(
        &self,
        group_id: u32,
        member_id: u32,
    ) -> Result<(), ClientError> {
        self.inner
            .send_to_server(MessageBody::RemoveGroupMember(
                tchat_proto::messages::RemoveGroupMember { group_id, member_id },
            ))
            .await
    }

    pub async fn update_group_name(&self, group_id: u32, name: &str) -> Result<(), ClientError> {
        self.inner
            .send_to_server(MessageBody::UpdateGroupName(
                tchat_proto::messages::UpdateGroupName { group_id, name: name.to_string() },
            ))
            .await
    }

    pub async fn delete_group(&self, group_id: u32) -> Result<(), ClientError> {
        self.inner
            .send_to_server(MessageBody::DeleteGroup(tchat_proto::messages::DeleteGroup {
                group_id,
            }))
            .await
    }

    pub async fn leave_group(&self, group_id: u32) -> Result<(), ClientError> {
        self.inner
            .send_to_server(MessageBody::LeaveGroup(tchat_proto::messages::LeaveGroup {
                group_id,
            }))
            .await
    }

    pub async fn update_pseudo(&self, pseudo: &str) -> Result<(), ClientError> {
        self.inner
            .send_to_server(MessageBody::UpdatePseudo(tchat_proto::messages::UpdatePseudo {
                pseudo: pseudo.to_string(),
            }))
            .await
    }

    // ── Shutdown ───────────────────────────────────────────────────────

    /// Clean shutdown: flush the write queue (up to one second), stop
    /// the background tasks and wipe in-memory session keys.
    pub async fn disconnect(&self) {
        self.inner.connected.store(false, Ordering::Release);

        let deadline = tokio::time::Instant::now() + DISCONNECT_FLUSH;
        while self.inner.writer_tx.capacity() < WRITE_QUEUE_CAPACITY
            && tokio::time::Instant::now() < deadline
        {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        for task in self.inner.tasks.lock().expect("task list poisoned").drain(..) {
            task.abort();
        }
        for (_, queued) in self.inner.driver.abort_all() {
            for send in queued {
                self.inner.emit(Event::Status {
                    message_id: send.token,
                    status: MessageStatus::Failed,
                    reason: "disconnected".to_string(),
                });
            }
        }
        // Snapshot counters to disk before wiping; hop sessions are
        // connection-scoped and never persisted.
        for conversation in self.inner.channel.manager().conversations() {
            if !conversation.as_str().starts_with("server_session_") {
                self.inner.persist_session(&conversation);
            }
        }
        self.inner.channel.manager().clear();
        self.inner.emit(Event::Disconnected);
    }
}

// ─── background loops ────────────────────────────────────────────────────────

async fn write_loop(mut writer: OwnedWriteHalf, mut rx: mpsc::Receiver<Packet>) {
    while let Some(packet) = rx.recv().await {
        if let Err(e) = packet.write_to(&mut writer).await {
            log::debug!("write failed: {e}");
            break;
        }
    }
    use tokio::io::AsyncWriteExt;
    let _ = writer.shutdown().await;
}

/// Zero-length `EMPTY` packet every 15 s keeps the 30 s server read
/// timeout quiet.
async fn keepalive_loop(inner: Arc<ClientInner>) {
    let mut interval = tokio::time::interval(KEEPALIVE_INTERVAL);
    interval.tick().await; // immediate first tick
    loop {
        interval.tick().await;
        if !inner.connected.load(Ordering::Acquire) {
            break;
        }
        let packet = MessageBody::Empty.into_packet(inner.local_id, SERVER_ID);
        if inner.send_packet(packet).await.is_err() {
            break;
        }
    }
}

/// Sweep pending handshakes once a second; expired attempts fail their
/// queued sends with `HandshakeTimeout` semantics.
async fn expiry_loop(inner: Arc<ClientInner>) {
    let mut interval = tokio::time::interval(Duration::from_secs(1));
    loop {
        interval.tick().await;
        if !inner.connected.load(Ordering::Acquire) {
            break;
        }
        for (peer_id, queued) in inner.driver.expire(std::time::Instant::now()) {
            log::info!("handshake with {peer_id} timed out");
            for send in queued {
                inner.emit(Event::Status {
                    message_id: send.token,
                    status: MessageStatus::Failed,
                    reason: "handshake timeout".to_string(),
                });
            }
            inner.emit(Event::SessionFailed {
                peer_id,
                reason: "handshake timeout".to_string(),
            });
        }
    }
}

// ─── helpers ─────────────────────────────────────────────────────────────────

async fn read_connect_packet(stream: &mut TcpStream) -> Result<Packet, ClientError> {
    match timeout(CONNECT_TIMEOUT, Packet::read_from(stream)).await {
        Err(_) => Err(ClientError::Timeout),
        Ok(Err(e)) => Err(framing(e)),
        Ok(Ok(packet)) => Ok(packet),
    }
}

fn framing(e: FramingError) -> ClientError {
    match e {
        FramingError::Io(e) => ClientError::ConnectionFailed(e),
        _ => ClientError::Handshake("bad framing from server"),
    }
}

//! TchatsApp relay server.
//!
//! One TCP listener, one task per connection. Every accepted socket runs
//! the hop handshake (`SERVER_KEY_EXCHANGE` / `…_RESPONSE`), then
//! authenticates, then relays. Relayed packets are forwarded with
//! byte-identical payloads — the server cannot and does not touch the
//! end-to-end ciphertext. Server-originated sensitive traffic leaves
//! hop-encrypted as `SERVER_ENCRYPTED`.

#![deny(unsafe_code)]

pub mod directory;

mod connection;
mod router;

pub use directory::Directory;

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::net::TcpListener;
use tokio::sync::mpsc;

use tchat_proto::{MessageBody, MessageRegistry, Packet, SERVER_ID};
use tchat_session::{ConversationId, EncryptedChannel, ReplayMode, SessionKeyManager};

/// Server configuration: a port and nothing else (log level is read by
/// the binary, not the library).
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub port: u16,
}

impl ServerConfig {
    /// Read `TCHATSAPP_PORT`, falling back to the protocol default.
    pub fn from_env() -> Self {
        let port = std::env::var("TCHATSAPP_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(tchat_proto::DEFAULT_PORT);
        Self { port }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: tchat_proto::DEFAULT_PORT }
    }
}

// ─── ServerContext ───────────────────────────────────────────────────────────

/// Write queue handle for one online client.
#[derive(Clone)]
pub(crate) struct ClientHandle {
    pub(crate) tx: mpsc::Sender<Packet>,
    /// One-shot close signal; the payload is the reason, for the log.
    pub(crate) kill: mpsc::Sender<&'static str>,
    /// The hop conversation this client's sensitive traffic is sealed on.
    pub(crate) conversation: ConversationId,
}

/// Shared state of one server instance. No global singletons: tests run
/// several servers in one process.
pub(crate) struct ServerContext {
    pub(crate) registry: Arc<MessageRegistry>,
    /// Hop sessions for every live connection, keyed
    /// `server_session_<hex>`.
    pub(crate) hop: EncryptedChannel,
    pub(crate) directory: Directory,
    online: Mutex<HashMap<u32, ClientHandle>>,
}

impl ServerContext {
    fn new() -> Self {
        let registry = Arc::new(MessageRegistry::builtin());
        let manager = Arc::new(SessionKeyManager::new(ReplayMode::Strict));
        Self {
            hop: EncryptedChannel::new(manager, registry.clone()),
            registry,
            directory: Directory::new(),
            online: Mutex::new(HashMap::new()),
        }
    }

    /// Register a freshly authenticated client. A previous connection
    /// under the same id is killed: last login wins.
    pub(crate) fn register(&self, user_id: u32, handle: ClientHandle) {
        let old = self
            .online
            .lock()
            .expect("online map poisoned")
            .insert(user_id, handle);
        if let Some(old) = old {
            let _ = old.kill.try_send("replaced by a newer connection");
        }
    }

    /// Remove the client, but only if the registered handle still belongs
    /// to the departing connection.
    pub(crate) fn unregister(&self, user_id: u32, tx: &mpsc::Sender<Packet>) {
        let mut online = self.online.lock().expect("online map poisoned");
        if online.get(&user_id).is_some_and(|h| h.tx.same_channel(tx)) {
            online.remove(&user_id);
        }
    }

    pub(crate) fn handle_for(&self, user_id: u32) -> Option<ClientHandle> {
        self.online
            .lock()
            .expect("online map poisoned")
            .get(&user_id)
            .cloned()
    }

    /// Queue a packet on a client's bounded write queue. Overflow closes
    /// that client's connection: a reader that cannot drain 256 packets
    /// is not coming back.
    pub(crate) fn deliver(&self, handle: &ClientHandle, packet: Packet) {
        use tokio::sync::mpsc::error::TrySendError;
        match handle.tx.try_send(packet) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                let _ = handle.kill.try_send("write queue backpressure");
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }

    /// Send a server-originated body to a client, hop-encrypting it when
    /// the type is in the server-sensitive set.
    pub(crate) fn send_body(&self, handle: &ClientHandle, to_id: u32, body: MessageBody) {
        let packet = if body.kind().is_server_sensitive() {
            match self.hop.seal(&handle.conversation, SERVER_ID, to_id, &body) {
                Ok(envelope) => Packet::new(
                    tchat_proto::MessageType::ServerEncrypted,
                    SERVER_ID,
                    to_id,
                    tchat_proto::Serializable::to_bytes(&envelope),
                ),
                Err(e) => {
                    // Sensitive traffic never falls back to plaintext.
                    log::warn!("dropping {:?} to {to_id}: hop seal failed: {e}", body.kind());
                    return;
                }
            }
        } else {
            body.into_packet(SERVER_ID, to_id)
        };
        self.deliver(handle, packet);
    }
}

// ─── Server ──────────────────────────────────────────────────────────────────

/// A bound, not-yet-running relay server.
pub struct Server {
    listener: TcpListener,
    ctx: Arc<ServerContext>,
}

impl Server {
    /// Bind the listener. Port 0 picks a free port (tests).
    pub async fn bind(config: &ServerConfig) -> io::Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
        Ok(Self { listener, ctx: Arc::new(ServerContext::new()) })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept loop. Runs until the listener fails.
    pub async fn run(self) -> io::Result<()> {
        log::info!(
            "relay listening on {}",
            self.local_addr().map(|a| a.to_string()).unwrap_or_default()
        );
        loop {
            let (stream, peer) = self.listener.accept().await?;
            let ctx = self.ctx.clone();
            tokio::spawn(connection::serve(ctx, stream, peer));
        }
    }
}

//! Per-connection state machine.
//!
//! ```text
//! accept → AwaitHelloAck → AwaitAuth → Ready → (disconnect)
//! ```
//!
//! Until the hop key is installed, only `SERVER_KEY_EXCHANGE_RESPONSE`
//! is accepted; anything else terminates the connection. After the
//! handshake, parse errors drop the offending packet and log. A
//! connection failing never affects its neighbours.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;

use tchat_crypto::generate_keypair;
use tchat_proto::messages::{AckConnection, ServerKeyExchange};
use tchat_proto::{FramingError, MessageBody, MessageType, Packet, SERVER_ID};
use tchat_session::{derive_hop_session, ConversationId};

use crate::router;
use crate::{ClientHandle, ServerContext};

/// Bounded write queue per connection; overflow closes the connection.
pub(crate) const WRITE_QUEUE_CAPACITY: usize = 256;

/// Established connections must show traffic (keep-alives count) this
/// often.
pub(crate) const READ_TIMEOUT: Duration = Duration::from_secs(30);

// ─── ConnError ───────────────────────────────────────────────────────────────

#[derive(Debug)]
enum ConnError {
    Framing(FramingError),
    /// Protocol violation during the handshake phases.
    Handshake(&'static str),
    IdleTimeout,
    /// Closed from elsewhere (backpressure, login replaced).
    Killed(&'static str),
}

impl fmt::Display for ConnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Framing(e) => write!(f, "{e}"),
            Self::Handshake(why) => write!(f, "handshake violation: {why}"),
            Self::IdleTimeout => write!(f, "no traffic within {READ_TIMEOUT:?}"),
            Self::Killed(why) => write!(f, "closed: {why}"),
        }
    }
}

impl From<FramingError> for ConnError {
    fn from(e: FramingError) -> Self {
        Self::Framing(e)
    }
}

// ─── entry point ─────────────────────────────────────────────────────────────

pub(crate) async fn serve(ctx: Arc<ServerContext>, stream: TcpStream, peer: SocketAddr) {
    log::debug!("accepted {peer}");
    let (reader, writer) = stream.into_split();

    let (tx, rx) = mpsc::channel::<Packet>(WRITE_QUEUE_CAPACITY);
    let (kill_tx, kill_rx) = mpsc::channel::<&'static str>(1);
    let writer_task = tokio::spawn(write_loop(writer, rx));

    let (secret, public) = generate_keypair();
    let mut conn = Connection {
        ctx: ctx.clone(),
        tx,
        kill: kill_tx,
        phase: Phase::AwaitHelloAck { secret },
        server_pub: *public.as_bytes(),
        hop_conversation: None,
        user_id: None,
    };

    match conn.run(reader, kill_rx).await {
        Ok(()) => log::debug!("{peer} disconnected"),
        Err(e) => log::info!("{peer} closed: {e}"),
    }

    // Cleanup: presence, hop session, pending transfers die with us.
    if let Some(user_id) = conn.user_id {
        ctx.unregister(user_id, &conn.tx);
    }
    if let Some(conversation) = &conn.hop_conversation {
        ctx.hop.manager().remove(conversation);
    }
    drop(conn); // last tx clone → writer drains and closes the socket
    let _ = writer_task.await;
}

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

// ─── Connection ──────────────────────────────────────────────────────────────

enum Phase {
    AwaitHelloAck { secret: tchat_crypto::StaticSecret },
    AwaitAuth,
    Ready,
}

struct Connection {
    ctx: Arc<ServerContext>,
    tx: mpsc::Sender<Packet>,
    kill: mpsc::Sender<&'static str>,
    phase: Phase,
    server_pub: [u8; 32],
    hop_conversation: Option<ConversationId>,
    user_id: Option<u32>,
}

impl Connection {
    async fn run(
        &mut self,
        mut reader: OwnedReadHalf,
        mut kill_rx: mpsc::Receiver<&'static str>,
    ) -> Result<(), ConnError> {
        // Step 1 of the hop handshake: our fresh public key, in the clear.
        self.queue(
            MessageBody::ServerKeyExchange(ServerKeyExchange { public_key: self.server_pub })
                .into_packet(SERVER_ID, 0),
        );

        loop {
            let packet = tokio::select! {
                reason = kill_rx.recv() => {
                    return Err(ConnError::Killed(reason.unwrap_or("connection killed")));
                }
                read = timeout(READ_TIMEOUT, Packet::read_from(&mut reader)) => {
                    match read {
                        Err(_) => return Err(ConnError::IdleTimeout),
                        Ok(Err(FramingError::Io(e)))
                            if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                        {
                            return Ok(()); // clean close between packets
                        }
                        Ok(Err(e)) => return Err(e.into()),
                        Ok(Ok(packet)) => packet,
                    }
                }
            };
            self.handle(packet)?;
        }
    }

    fn handle(&mut self, packet: Packet) -> Result<(), ConnError> {
        match self.phase {
            Phase::AwaitHelloAck { .. } => self.handle_hello_ack(packet),
            Phase::AwaitAuth => self.handle_auth(packet),
            Phase::Ready => self.handle_ready(packet),
        }
    }

    // ── phase: hop handshake ───────────────────────────────────────────

    fn handle_hello_ack(&mut self, packet: Packet) -> Result<(), ConnError> {
        // Refuse everything except the handshake response outright.
        if packet.kind() != MessageType::ServerKeyExchangeResponse {
            return Err(ConnError::Handshake("packet before hop key was installed"));
        }
        let body = self
            .ctx
            .registry
            .decode(&packet)
            .map_err(|_| ConnError::Handshake("malformed key exchange response"))?;
        let MessageBody::ServerKeyExchangeResponse(resp) = body else {
            return Err(ConnError::Handshake("malformed key exchange response"));
        };

        let Phase::AwaitHelloAck { secret } =
            std::mem::replace(&mut self.phase, Phase::AwaitAuth)
        else {
            return Err(ConnError::Handshake("phase confusion"));
        };

        let Some((conversation, key)) =
            derive_hop_session(&secret, &resp.public_key, &self.server_pub, &resp.public_key)
        else {
            return Err(ConnError::Handshake("degenerate client public key"));
        };
        self.ctx.hop.manager().install(conversation.clone(), key);
        self.hop_conversation = Some(conversation);
        self.phase = Phase::AwaitAuth;
        Ok(())
    }

    // ── phase: authentication ──────────────────────────────────────────

    fn handle_auth(&mut self, packet: Packet) -> Result<(), ConnError> {
        let Some(body) = self.decode_for_server(&packet) else {
            return Ok(()); // dropped and logged
        };
        match body {
            MessageBody::CreateUser(create) => {
                let user_id = self.ctx.directory.create_user(&create.pseudo);
                self.finish_auth(user_id, true);
                Ok(())
            }
            MessageBody::ConnectUser(connect) => {
                if !self.ctx.directory.user_exists(connect.user_id) {
                    return Err(ConnError::Handshake("unknown user id"));
                }
                self.finish_auth(connect.user_id, false);
                Ok(())
            }
            MessageBody::Empty => Ok(()),
            other => {
                log::debug!("dropping {:?} before authentication", other.kind());
                Ok(())
            }
        }
    }

    fn finish_auth(&mut self, user_id: u32, is_new: bool) {
        let conversation = self
            .hop_conversation
            .clone()
            .expect("authenticated before hop handshake");
        let handle = ClientHandle {
            tx: self.tx.clone(),
            kill: self.kill.clone(),
            conversation,
        };
        self.ctx.register(user_id, handle.clone());
        self.user_id = Some(user_id);
        self.phase = Phase::Ready;
        log::info!("user {user_id} authenticated (new: {is_new})");

        self.ctx.send_body(
            &handle,
            user_id,
            MessageBody::AckConnection(AckConnection { user_id, is_new }),
        );
    }

    // ── phase: established ─────────────────────────────────────────────

    fn handle_ready(&mut self, packet: Packet) -> Result<(), ConnError> {
        let Some(user_id) = self.user_id else {
            return Err(ConnError::Handshake("phase confusion"));
        };
        if packet.to_id() == SERVER_ID {
            if let Some(body) = self.decode_for_server(&packet) {
                router::manage(&self.ctx, user_id, body);
            }
            return Ok(());
        }
        router::route(&self.ctx, user_id, &packet);
        Ok(())
    }

    // ── helpers ────────────────────────────────────────────────────────

    /// Decode a server-bound packet, unwrapping the hop layer when the
    /// client chose to wrap. Post-handshake parse failures drop + log.
    fn decode_for_server(&self, packet: &Packet) -> Option<MessageBody> {
        let body = match self.ctx.registry.decode(packet) {
            Ok(body) => body,
            Err(e) => {
                log::debug!("dropping server-bound packet: {e}");
                return None;
            }
        };
        match body {
            MessageBody::ServerEncrypted(envelope) => {
                let conversation = self.hop_conversation.as_ref()?;
                match self
                    .ctx
                    .hop
                    .open(conversation, packet.from_id(), packet.to_id(), &envelope)
                {
                    Ok(inner) => Some(inner),
                    Err(e) => {
                        log::debug!("dropping hop envelope: {e}");
                        None
                    }
                }
            }
            other => Some(other),
        }
    }

    fn queue(&self, packet: Packet) {
        use tokio::sync::mpsc::error::TrySendError;
        match self.tx.try_send(packet) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                let _ = self.kill.try_send("write queue backpressure");
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

//! The background reader: one task per client feeding the incoming
//! pipeline and the event stream.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::net::tcp::OwnedReadHalf;
use tokio::time::timeout;

use tchat_proto::messages::MessageAck;
use tchat_proto::{
    FramingError, MessageBody, MessageStatus, MessageType, Packet, GROUP_ID_BASE,
};
use tchat_session::ConversationId;

use crate::{ClientInner, Event, READ_TIMEOUT};

pub(crate) async fn run(inner: Arc<ClientInner>, mut reader: OwnedReadHalf) {
    loop {
        if !inner.connected.load(Ordering::Acquire) {
            break;
        }
        let packet = match timeout(READ_TIMEOUT, Packet::read_from(&mut reader)).await {
            Err(_) => {
                log::warn!("server silent for {READ_TIMEOUT:?}, closing");
                break;
            }
            Ok(Err(FramingError::Io(e))) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                log::info!("server closed the connection");
                break;
            }
            Ok(Err(e)) => {
                log::warn!("stream error: {e}");
                break;
            }
            Ok(Ok(packet)) => packet,
        };
        handle_packet(&inner, packet).await;
    }
    inner.connected.store(false, Ordering::Release);
    inner.emit(Event::Disconnected);
}

async fn handle_packet(inner: &Arc<ClientInner>, packet: Packet) {
    match packet.kind() {
        MessageType::Empty | MessageType::ServerKeyExchange => {} // keep-alive / late hello
        MessageType::ServerEncrypted => server_encrypted(inner, packet).await,
        MessageType::Encrypted => encrypted(inner, packet).await,
        MessageType::KeyExchange => key_exchange(inner, packet).await,
        MessageType::KeyExchangeResponse => key_exchange_response(inner, packet).await,
        MessageType::MessageAck => {
            // Plaintext DELIVERED/READ ack relayed from a peer.
            if let Ok(MessageBody::MessageAck(ack)) = inner.channel.registry().decode(&packet) {
                handle_ack(inner, ack);
            }
        }
        other => {
            log::debug!("dropping unexpected {other:?} packet");
            inner.emit(Event::ProtocolError { detail: format!("unexpected {other:?} packet") });
        }
    }
}

// ─── hop layer ───────────────────────────────────────────────────────────────

async fn server_encrypted(inner: &Arc<ClientInner>, packet: Packet) {
    let Ok(MessageBody::ServerEncrypted(envelope)) = inner.channel.registry().decode(&packet)
    else {
        inner.emit(Event::ProtocolError { detail: "malformed SERVER_ENCRYPTED".into() });
        return;
    };
    let body = match inner.channel.open(
        &inner.hop_conversation,
        packet.from_id(),
        packet.to_id(),
        &envelope,
    ) {
        Ok(body) => body,
        Err(e) => {
            log::debug!("dropping hop envelope: {e}");
            inner.emit(Event::ProtocolError { detail: e.to_string() });
            return;
        }
    };
    match body {
        MessageBody::MessageAck(ack) => handle_ack(inner, ack),
        MessageBody::AckConnection(_) => {} // connect-time duplicate
        other => inner.emit(Event::ServerNotice(other)),
    }
}

// ─── end-to-end layer ────────────────────────────────────────────────────────

async fn encrypted(inner: &Arc<ClientInner>, packet: Packet) {
    let Ok(MessageBody::Encrypted(envelope)) = inner.channel.registry().decode(&packet) else {
        inner.emit(Event::ProtocolError { detail: "malformed ENCRYPTED".into() });
        return;
    };

    let from = packet.from_id();
    let to = packet.to_id();
    let (conversation, group_id) = if to >= GROUP_ID_BASE {
        (ConversationId::group(to), Some(to))
    } else {
        (ConversationId::private(from), None)
    };

    let seq = envelope.seq;
    let body = match inner.channel.open(&conversation, from, to, &envelope) {
        Ok(body) => body,
        Err(e) => {
            // NoSessionKey, AuthenticationFailed, ReplayDetected: drop,
            // notify locally, never answer the peer.
            log::debug!("dropping envelope from {from}: {e}");
            inner.emit(Event::ProtocolError { detail: e.to_string() });
            return;
        }
    };

    dispatch_inner(inner, from, group_id, seq, body).await;
}

async fn dispatch_inner(
    inner: &Arc<ClientInner>,
    from: u32,
    group_id: Option<u32>,
    seq: u64,
    body: MessageBody,
) {
    match body {
        MessageBody::FileTransferStart(meta) => {
            let result = inner
                .transfers
                .lock()
                .expect("transfer map poisoned")
                .on_start(from, meta);
            if let Err(e) = result {
                inner.emit(Event::ProtocolError { detail: e.to_string() });
            }
        }
        MessageBody::FileChunk(chunk) => {
            let result = inner
                .transfers
                .lock()
                .expect("transfer map poisoned")
                .on_chunk(from, chunk);
            match result {
                Ok(Some(file)) => inner.emit(Event::FileReceived {
                    from_id: from,
                    file_id: file.file_id,
                    filename: file.filename,
                    bytes: file.bytes,
                }),
                Ok(None) => {}
                Err(e) => inner.emit(Event::ProtocolError { detail: e.to_string() }),
            }
        }
        MessageBody::GroupKeyDistribution(dist) => {
            let group = dist.group_id;
            if inner.keyring.install(inner.channel.manager(), &dist) {
                inner.persist_session(&ConversationId::group(group));
                inner.emit(Event::GroupKeyInstalled { group_id: group });
            }
        }
        MessageBody::MessageAck(ack) => handle_ack(inner, ack),
        body => {
            // Content for the UI. Private texts/media auto-ack DELIVERED.
            if group_id.is_none()
                && matches!(body.kind(), MessageType::Text | MessageType::Media)
            {
                let ack = MessageBody::MessageAck(MessageAck {
                    peer_id: inner.local_id,
                    seq,
                    status: MessageStatus::Delivered,
                    reason: String::new(),
                });
                let _ = inner.send_packet(ack.into_packet(inner.local_id, from)).await;
            }
            inner.emit(Event::Incoming { from_id: from, group_id, body });
        }
    }
}

// ─── handshakes ──────────────────────────────────────────────────────────────

async fn key_exchange(inner: &Arc<ClientInner>, packet: Packet) {
    let Ok(MessageBody::KeyExchange(hello)) = inner.channel.registry().decode(&packet) else {
        inner.emit(Event::ProtocolError { detail: "malformed KEY_EXCHANGE".into() });
        return;
    };
    let peer_id = packet.from_id();
    match inner
        .driver
        .on_key_exchange(peer_id, &hello, inner.channel.manager())
    {
        Ok(outcome) => {
            if let Some(response) = outcome.response {
                inner.persist_session(&ConversationId::private(peer_id));
                let packet = MessageBody::KeyExchangeResponse(response)
                    .into_packet(inner.local_id, peer_id);
                let _ = inner.send_packet(packet).await;
                inner.emit(Event::SessionEstablished { peer_id });
            }
            inner.flush_queued(peer_id, outcome.flush).await;
        }
        Err(e) => {
            log::info!("handshake with {peer_id} failed: {e}");
            inner.emit(Event::SessionFailed { peer_id, reason: e.to_string() });
        }
    }
}

async fn key_exchange_response(inner: &Arc<ClientInner>, packet: Packet) {
    let Ok(MessageBody::KeyExchangeResponse(response)) = inner.channel.registry().decode(&packet)
    else {
        inner.emit(Event::ProtocolError { detail: "malformed KEY_EXCHANGE_RESPONSE".into() });
        return;
    };
    let peer_id = packet.from_id();
    match inner
        .driver
        .on_key_exchange_response(peer_id, &response, inner.channel.manager())
    {
        Ok(queued) => {
            inner.persist_session(&ConversationId::private(peer_id));
            inner.emit(Event::SessionEstablished { peer_id });
            inner.flush_queued(peer_id, queued).await;
        }
        Err(e) => {
            log::info!("handshake with {peer_id} failed: {e}");
            inner.emit(Event::SessionFailed { peer_id, reason: e.to_string() });
        }
    }
}

// ─── acks ────────────────────────────────────────────────────────────────────

fn handle_ack(inner: &Arc<ClientInner>, ack: MessageAck) {
    let key = (ack.peer_id, ack.seq);
    let message_id = {
        let mut pending = inner.pending_acks.lock().expect("pending ack map poisoned");
        match ack.status {
            // Terminal states release the entry; Sent/Delivered keep it
            // for later progression.
            MessageStatus::Failed | MessageStatus::Read => pending.remove(&key),
            _ => pending.get(&key).copied(),
        }
    };

    match message_id {
        Some(message_id) => inner.emit(Event::Status {
            message_id,
            status: ack.status,
            reason: ack.reason,
        }),
        None => {
            // A failed relay of our KEY_EXCHANGE (seq 0) kills the
            // pending handshake: the peer is offline or unreachable.
            if ack.seq == 0
                && ack.status == MessageStatus::Failed
                && inner.driver.is_pending(ack.peer_id)
            {
                for send in inner.driver.abort(ack.peer_id) {
                    inner.emit(Event::Status {
                        message_id: send.token,
                        status: MessageStatus::Failed,
                        reason: ack.reason.clone(),
                    });
                }
                inner.emit(Event::SessionFailed {
                    peer_id: ack.peer_id,
                    reason: ack.reason,
                });
            }
        }
    }
}

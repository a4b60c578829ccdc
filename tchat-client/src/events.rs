//! Events delivered to the application.
//!
//! The UI registers no callbacks and there is no process-wide bus: each
//! client owns one [`EventStream`] and the application drains it.

use tchat_proto::{MessageBody, MessageStatus};
use tokio::sync::mpsc;

/// What `send_message` hands back immediately.
#[derive(Clone, Copy, Debug)]
pub struct SendReceipt {
    /// Client-local id; later [`Event::Status`] updates reference it.
    pub message_id: u64,
    pub initial_status: MessageStatus,
    /// True when the message is queued behind a pending handshake.
    pub pending: bool,
}

/// Everything the core reports upward.
#[derive(Debug)]
pub enum Event {
    /// A decrypted logical message from a peer. `group_id` is set for
    /// group traffic.
    Incoming { from_id: u32, group_id: Option<u32>, body: MessageBody },
    /// Delivery-status progression for one of our sends.
    Status { message_id: u64, status: MessageStatus, reason: String },
    /// An end-to-end session with `peer_id` is established.
    SessionEstablished { peer_id: u32 },
    /// A handshake died (timeout, offline peer, bad key material).
    SessionFailed { peer_id: u32, reason: String },
    /// A key for this group arrived (or rotated).
    GroupKeyInstalled { group_id: u32 },
    /// A complete, hash-verified file.
    FileReceived { from_id: u32, file_id: String, filename: String, bytes: Vec<u8> },
    /// Server-originated traffic: errors, notifications, contact and
    /// group bookkeeping (already hop-decrypted).
    ServerNotice(MessageBody),
    /// A packet was dropped; detail is local-only and never echoed to
    /// the network.
    ProtocolError { detail: String },
    /// The connection is gone; the stream ends after this.
    Disconnected,
}

/// Asynchronous stream of [`Event`]s.
pub struct EventStream {
    pub(crate) rx: mpsc::UnboundedReceiver<Event>,
}

impl EventStream {
    /// Wait for the next event. Returns `None` once the client has
    /// disconnected and the buffer is drained.
    pub async fn next(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}

//! Routing, authorization and acknowledgement emission.
//!
//! Relayed packets pass through with byte-identical payloads. The only
//! thing the server reads out of an `ENCRYPTED` payload is the
//! envelope's plaintext header (`seq`), for acknowledgement bookkeeping.

use tchat_proto::messages::{
    ContactRequest, ContactRequestResponse, CreateGroup, MessageAck, Notification, RemoveContact,
};
use tchat_proto::{
    Deserializable, EncryptedEnvelope, MessageBody, MessageStatus, MessageType, Packet,
};

use crate::ServerContext;

/// Relay a `to_id ≠ 0` packet from an authenticated sender.
pub(crate) fn route(ctx: &ServerContext, sender: u32, packet: &Packet) {
    let to = packet.to_id();
    let seq = envelope_seq(packet);

    // The header must say who is actually talking.
    if packet.from_id() != sender {
        log::debug!("user {sender} spoofed from_id {}", packet.from_id());
        ack(ctx, sender, to, seq, MessageStatus::Failed, "not authorized");
        return;
    }

    if ctx.directory.is_group(to) {
        route_group(ctx, sender, to, seq, packet);
        return;
    }

    // Key-exchange kinds bypass the contact check: E2E bootstrap must
    // work before the users are contacts. Intentional policy, not a gap.
    let kind = packet.kind();
    let bypass = matches!(kind, MessageType::KeyExchange | MessageType::KeyExchangeResponse);
    if !bypass && !ctx.directory.are_contacts(sender, to) {
        ack(ctx, sender, to, seq, MessageStatus::Failed, "not authorized");
        return;
    }

    match ctx.handle_for(to) {
        Some(handle) => {
            ctx.deliver(&handle, packet.clone());
            ack(ctx, sender, to, seq, MessageStatus::Sent, "");
        }
        None => ack(ctx, sender, to, seq, MessageStatus::Failed, "recipient offline"),
    }
}

fn route_group(ctx: &ServerContext, sender: u32, group_id: u32, seq: u64, packet: &Packet) {
    if !ctx.directory.is_member(group_id, sender) {
        ack(ctx, sender, group_id, seq, MessageStatus::Failed, "not authorized");
        return;
    }
    for member in ctx.directory.group_members(group_id) {
        if member == sender {
            continue;
        }
        if let Some(handle) = ctx.handle_for(member) {
            ctx.deliver(&handle, packet.clone());
        }
        // Offline members simply miss the message: no store-and-forward.
    }
    ack(ctx, sender, group_id, seq, MessageStatus::Sent, "");
}

/// Sequence of the relayed envelope, for `(peer, seq)` ack correlation.
/// Non-envelope packets (key exchanges) ack under seq 0.
fn envelope_seq(packet: &Packet) -> u64 {
    if packet.kind() == MessageType::Encrypted {
        EncryptedEnvelope::from_bytes(packet.payload())
            .map(|e| e.seq)
            .unwrap_or(0)
    } else {
        0
    }
}

fn ack(ctx: &ServerContext, sender: u32, peer_id: u32, seq: u64, status: MessageStatus, reason: &str) {
    if let Some(handle) = ctx.handle_for(sender) {
        ctx.send_body(
            &handle,
            sender,
            MessageBody::MessageAck(MessageAck {
                peer_id,
                seq,
                status,
                reason: reason.to_string(),
            }),
        );
    }
}

// ─── management (to_id = 0) ──────────────────────────────────────────────────

/// Handle a server-terminal message from an authenticated user.
pub(crate) fn manage(ctx: &ServerContext, sender: u32, body: MessageBody) {
    match body {
        MessageBody::ContactRequest(req) => contact_request(ctx, sender, req),
        MessageBody::ContactRequestResponse(resp) => contact_response(ctx, sender, resp),
        MessageBody::RemoveContact(req) => remove_contact(ctx, sender, req),
        MessageBody::CreateGroup(req) => create_group(ctx, sender, req),
        MessageBody::AddGroupMember(req) => {
            if ctx.directory.add_member(req.group_id, sender, req.member_id) {
                reply(ctx, sender, MessageBody::AddGroupMember(req.clone()));
                notify_user(ctx, req.member_id, MessageBody::AddGroupMember(req));
            } else {
                error_reply(ctx, sender, "not authorized");
            }
        }
        MessageBody::RemoveGroupMember(req) => {
            if ctx.directory.remove_member(req.group_id, sender, req.member_id) {
                reply(ctx, sender, MessageBody::RemoveGroupMember(req.clone()));
                notify_user(ctx, req.member_id, MessageBody::RemoveGroupMember(req));
            } else {
                error_reply(ctx, sender, "not authorized");
            }
        }
        MessageBody::UpdateGroupName(req) => {
            if ctx.directory.update_group_name(req.group_id, sender, &req.name) {
                for member in ctx.directory.group_members(req.group_id) {
                    notify_user(ctx, member, MessageBody::UpdateGroupName(req.clone()));
                }
            } else {
                error_reply(ctx, sender, "not authorized");
            }
        }
        MessageBody::DeleteGroup(req) => {
            let members = ctx.directory.group_members(req.group_id);
            if ctx.directory.delete_group(req.group_id, sender) {
                for member in members {
                    notify_user(ctx, member, MessageBody::DeleteGroup(req.clone()));
                }
            } else {
                error_reply(ctx, sender, "not authorized");
            }
        }
        MessageBody::LeaveGroup(req) => {
            if ctx.directory.leave_group(req.group_id, sender) {
                if let Some(admin) = ctx.directory.group_admin(req.group_id) {
                    notify_user(
                        ctx,
                        admin,
                        MessageBody::Notification(Notification {
                            text: format!("user {sender} left group {}", req.group_id),
                        }),
                    );
                }
            } else {
                error_reply(ctx, sender, "not authorized");
            }
        }
        MessageBody::UpdatePseudo(req) => {
            if ctx.directory.update_pseudo(sender, &req.pseudo) {
                reply(ctx, sender, MessageBody::UpdatePseudo(req));
            }
        }
        MessageBody::Empty => {
            // Echo the keep-alive so the client's own read timeout stays
            // quiet on idle connections.
            notify_user(ctx, sender, MessageBody::Empty);
        }
        other => {
            log::debug!("dropping unexpected server-bound {:?} from {sender}", other.kind());
        }
    }
}

fn contact_request(ctx: &ServerContext, sender: u32, req: ContactRequest) {
    if !ctx.directory.user_exists(req.peer_id) {
        error_reply(ctx, sender, "no such user");
        return;
    }
    let pseudo = ctx.directory.pseudo(sender).unwrap_or_default();
    match ctx.handle_for(req.peer_id) {
        Some(handle) => ctx.send_body(
            &handle,
            req.peer_id,
            MessageBody::ContactRequest(ContactRequest { peer_id: sender, pseudo }),
        ),
        None => error_reply(ctx, sender, "recipient offline"),
    }
}

fn contact_response(ctx: &ServerContext, sender: u32, resp: ContactRequestResponse) {
    if resp.accepted {
        ctx.directory.add_contact(sender, resp.peer_id);
    }
    notify_user(
        ctx,
        resp.peer_id,
        MessageBody::ContactRequestResponse(ContactRequestResponse {
            peer_id: sender,
            accepted: resp.accepted,
        }),
    );
}

fn remove_contact(ctx: &ServerContext, sender: u32, req: RemoveContact) {
    ctx.directory.remove_contact(sender, req.contact_id);
    notify_user(
        ctx,
        req.contact_id,
        MessageBody::RemoveContact(RemoveContact { contact_id: sender }),
    );
}

fn create_group(ctx: &ServerContext, sender: u32, req: CreateGroup) {
    let group_id = ctx.directory.create_group(sender, &req.name);
    reply(ctx, sender, MessageBody::CreateGroup(CreateGroup { group_id, name: req.name }));
}

/// Send a confirmation back to the requester.
fn reply(ctx: &ServerContext, user_id: u32, body: MessageBody) {
    notify_user(ctx, user_id, body);
}

fn notify_user(ctx: &ServerContext, user_id: u32, body: MessageBody) {
    if let Some(handle) = ctx.handle_for(user_id) {
        ctx.send_body(&handle, user_id, body);
    }
}

fn error_reply(ctx: &ServerContext, user_id: u32, text: &str) {
    notify_user(
        ctx,
        user_id,
        MessageBody::Error(tchat_proto::messages::ErrorBody { code: 1, text: text.to_string() }),
    );
}

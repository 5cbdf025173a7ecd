//! Relay dispatcher: applies each inbound event to the shared stores and
//! fans the resulting server events out to the right audience.
//!
//! A connection moves through three states, all derived from the roster:
//! no profile (only `auth` is accepted), profile with no room (room-scoped
//! events are dropped), and profile with a current room. An event that
//! arrives in an insufficient state, or with a required field empty after
//! trimming, is dropped before any store is touched — a bad frame from one
//! connection can never leave shared state half-updated.

use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;
use uuid::Uuid;

use crate::chat::broadcast::{broadcast_presence, broadcast_room_list, broadcast_to_room};
use crate::chat::history::{MessageKind, StoredMessage};
use crate::state::{AppState, SignalScope};
use crate::ws::broadcast::{broadcast_to_all_except, send_event};
use crate::ws::protocol::ServerEvent;
use crate::ws::{ConnectionId, ConnectionSender};

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Push the current presence and room-list snapshots to a connection that
/// just attached, before it has authenticated.
pub fn handle_connect(state: &AppState, tx: &ConnectionSender) {
    send_event(
        tx,
        &ServerEvent::PresenceUpdate {
            users: state.roster.snapshot(),
        },
    );
    send_event(
        tx,
        &ServerEvent::RoomList {
            rooms: state.rooms.list(),
        },
    );
}

/// `auth`: register or update the connection's profile.
///
/// Re-auth acts as a profile update and keeps the current room. The first
/// auth lands the connection in the configured default room, if any.
pub fn handle_auth(
    state: &AppState,
    conn_id: ConnectionId,
    tx: &ConnectionSender,
    display_name: String,
    avatar_seed: Option<String>,
    uid: Option<String>,
    status: Option<String>,
) {
    let display_name = display_name.trim().to_string();
    if display_name.is_empty() {
        tracing::debug!(conn_id = %conn_id, "Ignoring auth with empty display name");
        return;
    }

    let first_auth = state.roster.lookup(&conn_id).is_none();
    state.roster.register(
        conn_id,
        display_name,
        avatar_seed.unwrap_or_default(),
        status.unwrap_or_default(),
        uid,
    );
    broadcast_presence(state);

    if first_auth {
        if let Some(room_id) = state.relay.default_room.clone() {
            join_room(state, conn_id, tx, room_id);
        }
    }
}

/// `join-room`: switch the connection's room membership and push that
/// room's history snapshot to the joiner alone.
pub fn handle_join_room(
    state: &AppState,
    conn_id: ConnectionId,
    tx: &ConnectionSender,
    room_id: String,
) {
    if state.roster.lookup(&conn_id).is_none() {
        tracing::debug!(conn_id = %conn_id, "Ignoring join-room before auth");
        return;
    }
    let room_id = room_id.trim().to_string();
    if room_id.is_empty() {
        tracing::debug!(conn_id = %conn_id, "Ignoring join-room with empty room id");
        return;
    }
    join_room(state, conn_id, tx, room_id);
}

fn join_room(state: &AppState, conn_id: ConnectionId, tx: &ConnectionSender, room_id: String) {
    state.rooms.ensure_exists(&room_id);

    let previous = match state.roster.set_room(&conn_id, Some(room_id.clone())) {
        Some(previous) => previous,
        None => return,
    };
    let changed = previous.as_deref() != Some(room_id.as_str());

    let Some(profile) = state.roster.lookup(&conn_id) else {
        return;
    };

    if changed {
        if let Some(left) = previous {
            system_notice(state, &left, format!("{} left the room", profile.display_name));
        }
    }

    // The joiner alone gets the snapshot; it is a copy, never a live view.
    send_event(
        tx,
        &ServerEvent::HistorySnapshot {
            room_id: room_id.clone(),
            messages: state.history.snapshot(&room_id),
        },
    );

    if changed {
        tracing::info!(conn_id = %conn_id, room_id = %room_id, "Joined room");
        system_notice(
            state,
            &room_id,
            format!("{} joined the room", profile.display_name),
        );
        broadcast_presence(state);
    }
}

/// `message`: stamp id and timestamp server-side, append to the current
/// room's history, broadcast to the room. Dropped when the connection has
/// no room or the trimmed body is empty.
pub fn handle_message(
    state: &AppState,
    conn_id: ConnectionId,
    body: String,
    kind: MessageKind,
    expiring: bool,
) {
    let Some(profile) = state.roster.lookup(&conn_id) else {
        tracing::debug!(conn_id = %conn_id, "Ignoring message before auth");
        return;
    };
    let Some(room_id) = profile.room else {
        tracing::debug!(conn_id = %conn_id, "Ignoring message outside any room");
        return;
    };

    let body = body.trim().to_string();
    if body.is_empty() {
        tracing::debug!(conn_id = %conn_id, "Ignoring empty message body");
        return;
    }

    let message = StoredMessage {
        id: Uuid::now_v7(),
        room_id: room_id.clone(),
        sender_id: conn_id,
        sender_name: profile.display_name,
        sender_avatar: profile.avatar_seed,
        body,
        kind,
        timestamp: now_millis(),
        expiring,
    };

    state.history.append(message.clone());
    if expiring {
        schedule_expiry(state, room_id.clone(), message.id);
    }
    broadcast_to_room(state, &room_id, &ServerEvent::Message { message }, None);
}

/// `typing`: ephemeral relay to room peers, sender excluded, never persisted.
pub fn handle_typing(state: &AppState, conn_id: ConnectionId, is_typing: bool) {
    let Some(profile) = state.roster.lookup(&conn_id) else {
        return;
    };
    let Some(room_id) = profile.room else {
        return;
    };

    let event = ServerEvent::Typing {
        room_id: room_id.clone(),
        sender_id: conn_id,
        display_name: profile.display_name,
        is_typing,
    };
    broadcast_to_room(state, &room_id, &event, Some(conn_id));
}

/// `delete-message`: only the original sender may delete. Requests for
/// unknown messages or from non-senders are ignored.
pub fn handle_delete_message(state: &AppState, conn_id: ConnectionId, message_id: Uuid) {
    let Some(profile) = state.roster.lookup(&conn_id) else {
        return;
    };
    let Some(room_id) = profile.room else {
        return;
    };

    let Some(message) = state.history.get(&room_id, &message_id) else {
        tracing::debug!(conn_id = %conn_id, message_id = %message_id, "Delete for unknown message");
        return;
    };
    if message.sender_id != conn_id {
        tracing::debug!(conn_id = %conn_id, message_id = %message_id, "Rejecting delete from non-sender");
        return;
    }

    remove_and_notify(state, &room_id, message_id);
}

/// `create-room`: add a room and broadcast the refreshed directory.
/// Duplicate names are allowed; each creation is a distinct room.
pub fn handle_create_room(state: &AppState, conn_id: ConnectionId, name: String) {
    let Some(profile) = state.roster.lookup(&conn_id) else {
        tracing::debug!(conn_id = %conn_id, "Ignoring create-room before auth");
        return;
    };

    let name = name.trim().to_string();
    if name.is_empty() {
        tracing::debug!(conn_id = %conn_id, "Ignoring create-room with empty name");
        return;
    }

    let created_by = profile.uid.unwrap_or_else(|| conn_id.to_string());
    let room = state.rooms.create(name, Some(created_by));
    tracing::info!(room_id = %room.id, "Room created");
    broadcast_room_list(state);
}

/// `call-signal`: opaque relay. The payload is never inspected; the
/// audience is the sender's room or every other connection, per the
/// configured scope.
pub fn handle_call_signal(state: &AppState, conn_id: ConnectionId, payload: Value) {
    let Some(profile) = state.roster.lookup(&conn_id) else {
        tracing::debug!(conn_id = %conn_id, "Ignoring call-signal before auth");
        return;
    };

    let event = ServerEvent::CallSignal {
        from: conn_id,
        payload,
    };
    match state.relay.signal_scope {
        SignalScope::Room => {
            let Some(room_id) = profile.room else {
                tracing::debug!(conn_id = %conn_id, "Ignoring call-signal outside any room");
                return;
            };
            broadcast_to_room(state, &room_id, &event, Some(conn_id));
        }
        SignalScope::Global => {
            broadcast_to_all_except(&state.connections, &conn_id, &event);
        }
    }
}

/// Disconnect cleanup. Always runs, even for connections that never sent a
/// single event: removing an unknown profile is a no-op, so nothing here
/// can fail. Registered connections leave their room and drop out of the
/// next presence snapshot.
pub fn handle_disconnect(state: &AppState, conn_id: ConnectionId) {
    let profile = state.roster.lookup(&conn_id);
    if !state.roster.remove(&conn_id) {
        return;
    }
    if let Some(profile) = profile {
        if let Some(room_id) = profile.room {
            system_notice(
                state,
                &room_id,
                format!("{} left the room", profile.display_name),
            );
        }
    }
    broadcast_presence(state);
}

/// Deferred removal for an expiring message. Shares the delete path, so a
/// message deleted manually in the meantime makes this a no-op.
fn schedule_expiry(state: &AppState, room_id: String, message_id: Uuid) {
    let state = state.clone();
    let ttl = state.relay.message_ttl;
    tokio::spawn(async move {
        tokio::time::sleep(ttl).await;
        if remove_and_notify(&state, &room_id, message_id) {
            tracing::debug!(message_id = %message_id, room_id = %room_id, "Expiring message removed");
        }
    });
}

/// Remove a message and, if it was still present, notify the room.
fn remove_and_notify(state: &AppState, room_id: &str, message_id: Uuid) -> bool {
    if !state.history.remove(room_id, &message_id) {
        return false;
    }
    broadcast_to_room(
        state,
        room_id,
        &ServerEvent::MessageDeleted {
            room_id: room_id.to_string(),
            message_id,
        },
        None,
    );
    true
}

/// Broadcast-only system notice to a room. Never appended to history, so
/// join/leave chatter cannot evict real messages.
fn system_notice(state: &AppState, room_id: &str, body: String) {
    let message = StoredMessage {
        id: Uuid::now_v7(),
        room_id: room_id.to_string(),
        sender_id: Uuid::nil(),
        sender_name: "system".to_string(),
        sender_avatar: String::new(),
        body,
        kind: MessageKind::System,
        timestamp: now_millis(),
        expiring: false,
    };
    broadcast_to_room(state, room_id, &ServerEvent::Message { message }, None);
}

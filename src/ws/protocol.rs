//! JSON event boundary: closed tagged enums for inbound and outbound frames.
//!
//! Every inbound text frame must decode into `ClientEvent`. A frame with an
//! unknown tag, a missing required field, or a wrong-typed field fails the
//! decode and is dropped here with a debug log — it never reaches a handler
//! and never crashes the connection.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::chat::history::{MessageKind, StoredMessage};
use crate::chat::relay;
use crate::chat::rooms::Room;
use crate::chat::roster::Profile;
use crate::state::AppState;
use crate::ws::{ConnectionId, ConnectionSender};

/// Events a client may send.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Register or update the connection's profile.
    Auth {
        display_name: String,
        #[serde(default)]
        avatar_seed: Option<String>,
        #[serde(default)]
        uid: Option<String>,
        #[serde(default)]
        status: Option<String>,
    },
    /// Switch room membership; the joiner alone gets a history snapshot.
    JoinRoom { room_id: String },
    /// Append to the current room's history and broadcast to the room.
    Message {
        body: String,
        #[serde(default)]
        kind: MessageKind,
        #[serde(default)]
        expiring: bool,
    },
    /// Ephemeral typing indicator; relayed to room peers, never persisted.
    Typing { is_typing: bool },
    /// Remove an own message from history.
    DeleteMessage { message_id: Uuid },
    /// Add a room to the directory.
    CreateRoom { name: String },
    /// Opaque signaling payload relayed to the configured audience.
    CallSignal { payload: Value },
}

/// Events the server pushes.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Sent once per join, to the joining connection only.
    HistorySnapshot {
        room_id: String,
        messages: Vec<StoredMessage>,
    },
    Message {
        message: StoredMessage,
    },
    /// Full roster snapshot, pushed on every registry change.
    PresenceUpdate {
        users: Vec<Profile>,
    },
    /// Full directory snapshot, pushed on room creation.
    RoomList {
        rooms: Vec<Room>,
    },
    MessageDeleted {
        room_id: String,
        message_id: Uuid,
    },
    Typing {
        room_id: String,
        sender_id: ConnectionId,
        display_name: String,
        is_typing: bool,
    },
    CallSignal {
        from: ConnectionId,
        payload: Value,
    },
}

/// Handle one inbound text frame: decode at the boundary, then route to the
/// relay handler for the event type.
pub fn handle_text_frame(text: &str, tx: &ConnectionSender, state: &AppState, conn_id: ConnectionId) {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(e) => {
            tracing::debug!(conn_id = %conn_id, error = %e, "Dropping undecodable frame");
            return;
        }
    };

    match event {
        ClientEvent::Auth {
            display_name,
            avatar_seed,
            uid,
            status,
        } => relay::handle_auth(state, conn_id, tx, display_name, avatar_seed, uid, status),
        ClientEvent::JoinRoom { room_id } => relay::handle_join_room(state, conn_id, tx, room_id),
        ClientEvent::Message {
            body,
            kind,
            expiring,
        } => relay::handle_message(state, conn_id, body, kind, expiring),
        ClientEvent::Typing { is_typing } => relay::handle_typing(state, conn_id, is_typing),
        ClientEvent::DeleteMessage { message_id } => {
            relay::handle_delete_message(state, conn_id, message_id)
        }
        ClientEvent::CreateRoom { name } => relay::handle_create_room(state, conn_id, name),
        ClientEvent::CallSignal { payload } => relay::handle_call_signal(state, conn_id, payload),
    }
}

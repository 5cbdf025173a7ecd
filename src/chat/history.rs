//! Bounded per-room message history: one FIFO ring per room.

use std::collections::VecDeque;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::AppState;
use crate::ws::ConnectionId;

/// Message payload kinds carried in history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    File,
    System,
}

/// A message retained in room history. The body is an opaque payload — it
/// may be pre-encrypted by the client and is never inspected here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: Uuid,
    pub room_id: String,
    /// Connection that sent the message; delete requests are checked
    /// against it.
    pub sender_id: ConnectionId,
    pub sender_name: String,
    #[serde(default)]
    pub sender_avatar: String,
    pub body: String,
    #[serde(default)]
    pub kind: MessageKind,
    /// Milliseconds since the Unix epoch, stamped server-side at append.
    pub timestamp: u64,
    #[serde(default)]
    pub expiring: bool,
}

/// In-memory bounded history store.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    rooms: Arc<DashMap<String, VecDeque<StoredMessage>>>,
    capacity: usize,
}

impl HistoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a message to its room, evicting from the front until the
    /// bound holds. `len <= capacity` is true again before this returns.
    pub fn append(&self, message: StoredMessage) {
        let mut entry = self.rooms.entry(message.room_id.clone()).or_default();
        let history = entry.value_mut();
        history.push_back(message);
        while history.len() > self.capacity {
            history.pop_front();
        }
    }

    /// Owned copy of a room's history, oldest first. Empty for unseen rooms.
    pub fn snapshot(&self, room_id: &str) -> Vec<StoredMessage> {
        self.rooms
            .get(room_id)
            .map(|entry| entry.value().iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Look up a single message by id.
    pub fn get(&self, room_id: &str, message_id: &Uuid) -> Option<StoredMessage> {
        self.rooms.get(room_id).and_then(|entry| {
            entry
                .value()
                .iter()
                .find(|message| message.id == *message_id)
                .cloned()
        })
    }

    /// Remove a message by id. Returns whether anything was removed, so
    /// deferred expiry can tell a fresh removal from an already-gone one.
    pub fn remove(&self, room_id: &str, message_id: &Uuid) -> bool {
        let Some(mut entry) = self.rooms.get_mut(room_id) else {
            return false;
        };
        let history = entry.value_mut();
        let before = history.len();
        history.retain(|message| message.id != *message_id);
        history.len() < before
    }

    /// Case-sensitive substring search over stored bodies. Bodies are
    /// opaque to the server, so deployments whose clients encrypt before
    /// sending will match nothing here.
    pub fn search(&self, room_id: &str, needle: &str) -> Vec<StoredMessage> {
        self.rooms
            .get(room_id)
            .map(|entry| {
                entry
                    .value()
                    .iter()
                    .filter(|message| message.body.contains(needle))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    pub q: Option<String>,
}

/// GET /api/rooms/{room_id}/messages — History snapshot, oldest first, or a
/// substring search over stored bodies when `?q=` is present.
pub async fn room_messages(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Query(query): Query<MessagesQuery>,
) -> Json<Vec<StoredMessage>> {
    let messages = match &query.q {
        Some(needle) => state.history.search(&room_id, needle),
        None => state.history.snapshot(&room_id),
    };
    Json(messages)
}

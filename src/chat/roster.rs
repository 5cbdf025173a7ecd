//! Connection registry: the profile behind every authenticated connection.
//!
//! In-memory store (DashMap) keyed by connection id. The roster itself is a
//! pure store; presence broadcasts are issued by the relay dispatcher after
//! each mutation, so nothing here has hidden side effects.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{extract::State, Json};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::state::AppState;
use crate::ws::ConnectionId;

/// Profile tracked for one authenticated connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub conn_id: ConnectionId,
    pub display_name: String,
    /// Opaque seed for an externally generated avatar image.
    #[serde(default)]
    pub avatar_seed: String,
    /// Free-form status / bio text.
    #[serde(default)]
    pub status: String,
    /// Identity supplied by an external auth provider, if any.
    #[serde(default)]
    pub uid: Option<String>,
    /// Current room, if the connection has joined one.
    pub room: Option<String>,
    /// Registration ticket; keeps presence snapshots in a stable order.
    #[serde(skip)]
    seq: u64,
}

/// In-memory connection registry.
#[derive(Debug, Clone)]
pub struct Roster {
    entries: Arc<DashMap<ConnectionId, Profile>>,
    next_seq: Arc<AtomicU64>,
}

impl Roster {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            next_seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Create or update the profile for a connection.
    ///
    /// Re-registration acts as a profile update: it replaces the profile
    /// fields but keeps the existing room membership and snapshot position.
    pub fn register(
        &self,
        conn_id: ConnectionId,
        display_name: String,
        avatar_seed: String,
        status: String,
        uid: Option<String>,
    ) -> Profile {
        let mut entry = self.entries.entry(conn_id).or_insert_with(|| Profile {
            conn_id,
            display_name: String::new(),
            avatar_seed: String::new(),
            status: String::new(),
            uid: None,
            room: None,
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
        });
        let profile = entry.value_mut();
        profile.display_name = display_name;
        profile.avatar_seed = avatar_seed;
        profile.status = status;
        profile.uid = uid;
        profile.clone()
    }

    pub fn lookup(&self, conn_id: &ConnectionId) -> Option<Profile> {
        self.entries.get(conn_id).map(|entry| entry.value().clone())
    }

    /// Remove a connection's profile. Returns false (and does nothing) if
    /// the connection was never registered.
    pub fn remove(&self, conn_id: &ConnectionId) -> bool {
        self.entries.remove(conn_id).is_some()
    }

    /// Point the connection at a new room (or none). Returns the previous
    /// room wrapped in Some, or None if the connection is unknown.
    pub fn set_room(&self, conn_id: &ConnectionId, room: Option<String>) -> Option<Option<String>> {
        self.entries
            .get_mut(conn_id)
            .map(|mut entry| std::mem::replace(&mut entry.value_mut().room, room))
    }

    /// All profiles, ordered by registration sequence. The order is stable
    /// between consecutive snapshots so presence lists don't jitter.
    pub fn snapshot(&self) -> Vec<Profile> {
        let mut users: Vec<Profile> = self
            .entries
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        users.sort_by_key(|profile| profile.seq);
        users
    }

    /// Connections currently in the given room.
    pub fn members_of(&self, room_id: &str) -> Vec<ConnectionId> {
        self.entries
            .iter()
            .filter(|entry| entry.value().room.as_deref() == Some(room_id))
            .map(|entry| *entry.key())
            .collect()
    }
}

/// GET /api/presence — Current roster snapshot in registration order.
pub async fn get_presence(State(state): State<AppState>) -> Json<Vec<Profile>> {
    Json(state.roster.snapshot())
}

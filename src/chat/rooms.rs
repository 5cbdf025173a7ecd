//! Room directory: runtime-creatable named rooms.
//!
//! Rooms are never deleted; they live for the process lifetime. Names carry
//! no uniqueness constraint — two rooms named "general" are distinct
//! entities with distinct ids.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{extract::State, Json};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub name: String,
    /// Connection or external uid that created the room; absent for
    /// pre-seeded rooms such as the default lobby.
    #[serde(default)]
    pub created_by: Option<String>,
    /// Creation ticket; orders room lists.
    #[serde(skip)]
    position: u64,
}

/// In-memory room directory.
#[derive(Debug, Clone)]
pub struct RoomDirectory {
    rooms: Arc<DashMap<String, Room>>,
    next_position: Arc<AtomicU64>,
}

impl RoomDirectory {
    pub fn new() -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            next_position: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Create a room with a fresh id.
    pub fn create(&self, name: String, created_by: Option<String>) -> Room {
        let room = Room {
            id: Uuid::new_v4().to_string(),
            name,
            created_by,
            position: self.next_position.fetch_add(1, Ordering::Relaxed),
        };
        self.rooms.insert(room.id.clone(), room.clone());
        room
    }

    /// Admit a room id not seen before (ad hoc joins, the pre-seeded lobby).
    /// The room's display name defaults to its id. Idempotent.
    pub fn ensure_exists(&self, room_id: &str) -> Room {
        let entry = self.rooms.entry(room_id.to_string()).or_insert_with(|| Room {
            id: room_id.to_string(),
            name: room_id.to_string(),
            created_by: None,
            position: self.next_position.fetch_add(1, Ordering::Relaxed),
        });
        entry.value().clone()
    }

    /// All rooms in creation order.
    pub fn list(&self) -> Vec<Room> {
        let mut rooms: Vec<Room> = self
            .rooms
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        rooms.sort_by_key(|room| room.position);
        rooms
    }
}

/// GET /api/rooms — Room directory in creation order.
pub async fn list_rooms(State(state): State<AppState>) -> Json<Vec<Room>> {
    Json(state.rooms.list())
}

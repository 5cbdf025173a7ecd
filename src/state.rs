use std::time::Duration;

use crate::chat::history::HistoryStore;
use crate::chat::rooms::RoomDirectory;
use crate::chat::roster::Roster;
use crate::config::Config;
use crate::ws::{new_connection_map, ConnectionMap};

/// Audience policy for relayed call signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalScope {
    /// Relay to the sender's current room, sender excluded.
    Room,
    /// Relay to every connection except the sender.
    Global,
}

impl SignalScope {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "room" => Some(Self::Room),
            "global" => Some(Self::Global),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Room => "room",
            Self::Global => "global",
        }
    }
}

/// Relay policy knobs, resolved from config at startup.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Room joined automatically on first auth; None disables auto-join.
    pub default_room: Option<String>,
    /// Audience for relayed call signals.
    pub signal_scope: SignalScope,
    /// Delay before an expiring message is removed from history.
    pub message_ttl: Duration,
}

/// Shared application state passed to all handlers via axum State extractor.
///
/// Every store is an owned handle injected here at construction; nothing in
/// the relay reaches for ambient globals. All state is volatile and rebuilt
/// from zero at startup.
#[derive(Clone)]
pub struct AppState {
    /// Live WebSocket connections (connection id -> outbound sender).
    pub connections: ConnectionMap,
    /// Profiles of authenticated connections, with current room membership.
    pub roster: Roster,
    /// Known rooms, creation-ordered.
    pub rooms: RoomDirectory,
    /// Bounded per-room message history.
    pub history: HistoryStore,
    /// Relay policy.
    pub relay: RelayConfig,
}

impl AppState {
    /// Build fresh state from config. The default room, if configured, is
    /// pre-seeded in the directory so it shows up in room lists before
    /// anyone has joined it.
    pub fn from_config(config: &Config) -> Self {
        let default_room = Some(config.default_room.trim().to_string()).filter(|r| !r.is_empty());
        let signal_scope = SignalScope::from_str(&config.signal_scope).unwrap_or_else(|| {
            tracing::warn!(
                value = %config.signal_scope,
                "Unknown signal_scope, falling back to \"room\""
            );
            SignalScope::Room
        });

        let state = Self {
            connections: new_connection_map(),
            roster: Roster::new(),
            rooms: RoomDirectory::new(),
            history: HistoryStore::new(config.history_capacity),
            relay: RelayConfig {
                default_room: default_room.clone(),
                signal_scope,
                message_ttl: Duration::from_secs(config.message_ttl_secs),
            },
        };

        if let Some(room_id) = &default_room {
            state.rooms.ensure_exists(room_id);
        }

        state
    }
}

pub mod actor;
pub mod broadcast;
pub mod handler;
pub mod protocol;

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Identifier for one live WebSocket connection. Minted at upgrade time and
/// never reused; all roster and history bookkeeping keys off it.
pub type ConnectionId = Uuid;

/// Type alias for the sender half of a WebSocket connection's channel.
/// Other parts of the system can clone this to push events to a specific client.
pub type ConnectionSender = mpsc::UnboundedSender<axum::extract::ws::Message>;

/// Connection map: tracks the outbound sender for every live connection.
/// Each connection is its own identity; there is no multi-device grouping.
pub type ConnectionMap = Arc<DashMap<ConnectionId, ConnectionSender>>;

/// Create a new empty connection map.
pub fn new_connection_map() -> ConnectionMap {
    Arc::new(DashMap::new())
}

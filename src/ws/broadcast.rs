//! Low-level fan-out: encode a server event once, push to connection senders.

use axum::extract::ws::Message;

use crate::ws::protocol::ServerEvent;
use crate::ws::{ConnectionId, ConnectionMap, ConnectionSender};

fn encode(event: &ServerEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(text) => Some(Message::Text(text.into())),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode server event");
            None
        }
    }
}

/// Send an event down one connection's outbound channel.
pub fn send_event(tx: &ConnectionSender, event: &ServerEvent) {
    if let Some(msg) = encode(event) {
        let _ = tx.send(msg);
    }
}

/// Broadcast an event to every live connection.
pub fn broadcast_to_all(connections: &ConnectionMap, event: &ServerEvent) {
    let Some(msg) = encode(event) else { return };
    for entry in connections.iter() {
        let _ = entry.value().send(msg.clone());
    }
}

/// Broadcast an event to every live connection except one.
pub fn broadcast_to_all_except(
    connections: &ConnectionMap,
    exclude: &ConnectionId,
    event: &ServerEvent,
) {
    let Some(msg) = encode(event) else { return };
    for entry in connections.iter() {
        if entry.key() != exclude {
            let _ = entry.value().send(msg.clone());
        }
    }
}

/// Send an event to a precomputed set of connections.
pub fn send_to_many(connections: &ConnectionMap, ids: &[ConnectionId], event: &ServerEvent) {
    let Some(msg) = encode(event) else { return };
    for id in ids {
        if let Some(sender) = connections.get(id) {
            let _ = sender.send(msg.clone());
        }
    }
}

//! Domain-level broadcast helpers: compute the audience, then fan out.

use crate::state::AppState;
use crate::ws::broadcast::{broadcast_to_all, send_to_many};
use crate::ws::protocol::ServerEvent;
use crate::ws::ConnectionId;

/// Push the current presence snapshot to every live connection.
pub fn broadcast_presence(state: &AppState) {
    let event = ServerEvent::PresenceUpdate {
        users: state.roster.snapshot(),
    };
    broadcast_to_all(&state.connections, &event);
}

/// Push the current room list to every live connection.
pub fn broadcast_room_list(state: &AppState) {
    let event = ServerEvent::RoomList {
        rooms: state.rooms.list(),
    };
    broadcast_to_all(&state.connections, &event);
}

/// Send an event to every member of a room, optionally excluding one
/// connection (the sender of a typing indicator or call signal).
pub fn broadcast_to_room(
    state: &AppState,
    room_id: &str,
    event: &ServerEvent,
    exclude: Option<ConnectionId>,
) {
    let mut members = state.roster.members_of(room_id);
    if let Some(excluded) = exclude {
        members.retain(|id| *id != excluded);
    }
    send_to_many(&state.connections, &members, event);
}

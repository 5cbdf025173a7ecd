use axum::{routing::get, Router};

use crate::chat::{history, rooms, roster};
use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// Build the axum Router: the WebSocket endpoint plus a small read-only
/// REST surface over the volatile stores.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler::ws_upgrade))
        .route("/api/presence", get(roster::get_presence))
        .route("/api/rooms", get(rooms::list_rooms))
        .route("/api/rooms/{room_id}/messages", get(history::room_messages))
        .with_state(state)
}

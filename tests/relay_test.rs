//! End-to-end relay scenarios: room membership, history snapshots, typing,
//! deletion authorization, expiring messages, and call-signal scope.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use huddle_server::chat::history::HistoryStore;
use huddle_server::chat::rooms::RoomDirectory;
use huddle_server::chat::roster::Roster;
use huddle_server::routes::build_router;
use huddle_server::state::{AppState, RelayConfig, SignalScope};
use huddle_server::ws::new_connection_map;

type WsClient = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

fn test_state(capacity: usize, scope: SignalScope, ttl: Duration) -> AppState {
    AppState {
        connections: new_connection_map(),
        roster: Roster::new(),
        rooms: RoomDirectory::new(),
        history: HistoryStore::new(capacity),
        relay: RelayConfig {
            default_room: None,
            signal_scope: scope,
            message_ttl: ttl,
        },
    }
}

fn default_state() -> AppState {
    test_state(100, SignalScope::Room, Duration::from_secs(10))
}

async fn start_server(state: AppState) -> SocketAddr {
    let app = build_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn connect(addr: SocketAddr) -> WsClient {
    let (stream, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("Failed to connect to WebSocket");
    stream
}

async fn send_event(client: &mut WsClient, event: Value) {
    client
        .send(Message::Text(event.to_string().into()))
        .await
        .expect("Failed to send event");
}

/// Read frames until one satisfies the predicate; panics after a 2 s lull.
async fn recv_matching<F>(client: &mut WsClient, description: &str, predicate: F) -> Value
where
    F: Fn(&Value) -> bool,
{
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), client.next())
            .await
            .unwrap_or_else(|_| panic!("Timed out waiting for {description}"))
            .expect("Stream ended")
            .expect("WebSocket error");
        if let Message::Text(text) = msg {
            let value: Value = serde_json::from_str(text.as_str()).expect("Invalid server JSON");
            if predicate(&value) {
                return value;
            }
        }
    }
}

async fn recv_event(client: &mut WsClient, event_type: &str) -> Value {
    recv_matching(client, event_type, |v| v["type"] == event_type).await
}

/// Assert that no event of the given type arrives within the window.
async fn assert_no_event(client: &mut WsClient, event_type: &str, window: Duration) {
    let got = tokio::time::timeout(window, async {
        loop {
            match client.next().await {
                Some(Ok(Message::Text(text))) => {
                    let value: Value =
                        serde_json::from_str(text.as_str()).expect("Invalid server JSON");
                    if value["type"] == event_type {
                        return value;
                    }
                }
                Some(Ok(_)) => continue,
                // Stream ended — nothing more can arrive; wait out the window
                _ => std::future::pending::<()>().await,
            }
        }
    })
    .await;
    assert!(got.is_err(), "Unexpected {event_type} event: {:?}", got.ok());
}

/// Auth and join in one go, consuming the history snapshot.
async fn join(client: &mut WsClient, name: &str, room: &str) -> Value {
    send_event(client, json!({"type": "auth", "display_name": name})).await;
    send_event(client, json!({"type": "join-room", "room_id": room})).await;
    recv_event(client, "history-snapshot").await
}

/// Wait for a chat (non-system) message with the given body; returns it.
async fn recv_chat_message(client: &mut WsClient, body: &str) -> Value {
    recv_matching(client, "chat message", |v| {
        v["type"] == "message" && v["message"]["body"] == body
    })
    .await
}

async fn rest_history(addr: SocketAddr, room: &str) -> Vec<Value> {
    reqwest::get(format!("http://{addr}/api/rooms/{room}/messages"))
        .await
        .unwrap()
        .json::<Value>()
        .await
        .unwrap()
        .as_array()
        .unwrap()
        .clone()
}

#[tokio::test]
async fn join_message_and_late_joiner_snapshot() {
    let addr = start_server(default_state()).await;

    let mut ann = connect(addr).await;
    let snapshot = join(&mut ann, "ann", "LOBBY").await;
    assert_eq!(snapshot["room_id"], "LOBBY");
    assert!(snapshot["messages"].as_array().unwrap().is_empty());

    send_event(&mut ann, json!({"type": "message", "body": "hi"})).await;
    let broadcast = recv_chat_message(&mut ann, "hi").await;
    assert_eq!(broadcast["message"]["sender_name"], "ann");
    assert_eq!(broadcast["message"]["kind"], "text");

    // A later joiner gets exactly that one message in its snapshot.
    let mut bob = connect(addr).await;
    let snapshot = join(&mut bob, "bob", "LOBBY").await;
    let messages = snapshot["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["body"], "hi");
}

#[tokio::test]
async fn message_without_room_is_ignored() {
    let addr = start_server(default_state()).await;
    let mut ann = connect(addr).await;

    send_event(&mut ann, json!({"type": "auth", "display_name": "ann"})).await;
    send_event(&mut ann, json!({"type": "message", "body": "void"})).await;

    assert_no_event(&mut ann, "message", Duration::from_millis(300)).await;

    // No room was ever touched, so the directory is still empty.
    let rooms: Value = reqwest::get(format!("http://{addr}/api/rooms"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(rooms.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn typing_reaches_peers_but_not_the_sender() {
    let addr = start_server(default_state()).await;
    let mut ann = connect(addr).await;
    let mut bob = connect(addr).await;
    join(&mut ann, "ann", "x").await;
    join(&mut bob, "bob", "x").await;

    send_event(&mut ann, json!({"type": "typing", "is_typing": true})).await;

    let typing = recv_event(&mut bob, "typing").await;
    assert_eq!(typing["display_name"], "ann");
    assert_eq!(typing["is_typing"], true);
    assert_eq!(typing["room_id"], "x");

    assert_no_event(&mut ann, "typing", Duration::from_millis(300)).await;
}

#[tokio::test]
async fn sender_can_delete_own_message() {
    let addr = start_server(default_state()).await;
    let mut ann = connect(addr).await;
    let mut bob = connect(addr).await;
    join(&mut ann, "ann", "x").await;
    join(&mut bob, "bob", "x").await;

    send_event(&mut ann, json!({"type": "message", "body": "oops"})).await;
    let sent = recv_chat_message(&mut ann, "oops").await;
    let message_id = sent["message"]["id"].as_str().unwrap().to_string();

    send_event(
        &mut ann,
        json!({"type": "delete-message", "message_id": message_id}),
    )
    .await;

    let deleted = recv_event(&mut bob, "message-deleted").await;
    assert_eq!(deleted["message_id"].as_str().unwrap(), message_id);
    assert_eq!(deleted["room_id"], "x");

    assert!(rest_history(addr, "x").await.is_empty());
}

#[tokio::test]
async fn non_sender_delete_is_ignored() {
    let addr = start_server(default_state()).await;
    let mut ann = connect(addr).await;
    let mut bob = connect(addr).await;
    join(&mut ann, "ann", "x").await;
    join(&mut bob, "bob", "x").await;

    send_event(&mut ann, json!({"type": "message", "body": "keep"})).await;
    let seen = recv_chat_message(&mut bob, "keep").await;
    let message_id = seen["message"]["id"].as_str().unwrap().to_string();

    send_event(
        &mut bob,
        json!({"type": "delete-message", "message_id": message_id}),
    )
    .await;
    // Bob's later typing event proves the delete was already processed.
    send_event(&mut bob, json!({"type": "typing", "is_typing": true})).await;
    recv_event(&mut ann, "typing").await;

    assert_no_event(&mut ann, "message-deleted", Duration::from_millis(300)).await;
    let history = rest_history(addr, "x").await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["body"], "keep");
}

#[tokio::test]
async fn expiring_message_is_removed_once() {
    let addr = start_server(test_state(
        100,
        SignalScope::Room,
        Duration::from_millis(200),
    ))
    .await;
    let mut ann = connect(addr).await;
    join(&mut ann, "ann", "x").await;

    send_event(
        &mut ann,
        json!({"type": "message", "body": "poof", "expiring": true}),
    )
    .await;
    let sent = recv_chat_message(&mut ann, "poof").await;
    let message_id = sent["message"]["id"].as_str().unwrap().to_string();
    assert_eq!(sent["message"]["expiring"], true);

    let deleted = recv_event(&mut ann, "message-deleted").await;
    assert_eq!(deleted["message_id"].as_str().unwrap(), message_id);

    assert!(rest_history(addr, "x").await.is_empty());
    // Exactly one removal notice; the deferred timer never fires twice.
    assert_no_event(&mut ann, "message-deleted", Duration::from_millis(400)).await;
}

#[tokio::test]
async fn manual_delete_beats_the_expiry_timer() {
    let addr = start_server(test_state(
        100,
        SignalScope::Room,
        Duration::from_millis(300),
    ))
    .await;
    let mut ann = connect(addr).await;
    join(&mut ann, "ann", "x").await;

    send_event(
        &mut ann,
        json!({"type": "message", "body": "gone", "expiring": true}),
    )
    .await;
    let sent = recv_chat_message(&mut ann, "gone").await;
    let message_id = sent["message"]["id"].as_str().unwrap().to_string();

    send_event(
        &mut ann,
        json!({"type": "delete-message", "message_id": message_id}),
    )
    .await;
    recv_event(&mut ann, "message-deleted").await;

    // The timer still fires but finds nothing; no second notice.
    assert_no_event(&mut ann, "message-deleted", Duration::from_millis(600)).await;
}

#[tokio::test]
async fn create_room_broadcasts_updated_list() {
    let addr = start_server(default_state()).await;
    let mut ann = connect(addr).await;
    send_event(&mut ann, json!({"type": "auth", "display_name": "ann"})).await;

    send_event(&mut ann, json!({"type": "create-room", "name": "general"})).await;
    let list = recv_matching(&mut ann, "room list", |v| {
        v["type"] == "room-list" && v["rooms"].as_array().unwrap().len() == 1
    })
    .await;
    assert_eq!(list["rooms"][0]["name"], "general");

    // Duplicate names are allowed and become distinct rooms.
    send_event(&mut ann, json!({"type": "create-room", "name": "general"})).await;
    let list = recv_matching(&mut ann, "room list of two", |v| {
        v["type"] == "room-list" && v["rooms"].as_array().unwrap().len() == 2
    })
    .await;
    let rooms = list["rooms"].as_array().unwrap();
    assert_eq!(rooms[0]["name"], "general");
    assert_eq!(rooms[1]["name"], "general");
    assert_ne!(rooms[0]["id"], rooms[1]["id"]);
}

#[tokio::test]
async fn call_signal_stays_in_the_room() {
    let addr = start_server(default_state()).await;
    let mut ann = connect(addr).await;
    let mut bob = connect(addr).await;
    let mut cat = connect(addr).await;
    join(&mut ann, "ann", "x").await;
    join(&mut bob, "bob", "x").await;
    join(&mut cat, "cat", "y").await;

    send_event(
        &mut ann,
        json!({"type": "call-signal", "payload": {"sdp": "offer"}}),
    )
    .await;

    let signal = recv_event(&mut bob, "call-signal").await;
    assert_eq!(signal["payload"]["sdp"], "offer");
    assert!(signal["from"].is_string());

    assert_no_event(&mut cat, "call-signal", Duration::from_millis(300)).await;
    assert_no_event(&mut ann, "call-signal", Duration::from_millis(300)).await;
}

#[tokio::test]
async fn call_signal_global_scope_reaches_everyone_else() {
    let addr = start_server(test_state(
        100,
        SignalScope::Global,
        Duration::from_secs(10),
    ))
    .await;
    let mut ann = connect(addr).await;
    let mut bob = connect(addr).await;
    send_event(&mut ann, json!({"type": "auth", "display_name": "ann"})).await;
    send_event(&mut bob, json!({"type": "auth", "display_name": "bob"})).await;

    send_event(
        &mut ann,
        json!({"type": "call-signal", "payload": {"candidate": "host"}}),
    )
    .await;

    let signal = recv_event(&mut bob, "call-signal").await;
    assert_eq!(signal["payload"]["candidate"], "host");
    assert_no_event(&mut ann, "call-signal", Duration::from_millis(300)).await;
}

#[tokio::test]
async fn rest_search_matches_stored_bodies() {
    let addr = start_server(default_state()).await;
    let mut ann = connect(addr).await;
    join(&mut ann, "ann", "x").await;

    for body in ["Deploy at noon", "deploy postponed", "lunch?"] {
        send_event(&mut ann, json!({"type": "message", "body": body})).await;
        recv_chat_message(&mut ann, body).await;
    }

    let hits: Value = reqwest::get(format!("http://{addr}/api/rooms/x/messages?q=eploy"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(hits.as_array().unwrap().len(), 2);

    let hits: Value = reqwest::get(format!("http://{addr}/api/rooms/x/messages?q=Deploy"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(hits.as_array().unwrap().len(), 1);
    assert_eq!(hits[0]["body"], "Deploy at noon");
}

#[tokio::test]
async fn switching_rooms_scopes_broadcasts_to_the_new_room() {
    let addr = start_server(default_state()).await;
    let mut ann = connect(addr).await;
    let mut bob = connect(addr).await;
    join(&mut ann, "ann", "x").await;
    join(&mut bob, "bob", "x").await;

    // Ann moves to another room; Bob sees the leave notice, nothing more.
    send_event(&mut ann, json!({"type": "join-room", "room_id": "y"})).await;
    recv_event(&mut ann, "history-snapshot").await;
    recv_matching(&mut bob, "leave notice", |v| {
        v["type"] == "message" && v["message"]["kind"] == "system"
    })
    .await;

    send_event(&mut ann, json!({"type": "message", "body": "over here"})).await;
    recv_chat_message(&mut ann, "over here").await;
    assert_no_event(&mut bob, "message", Duration::from_millis(300)).await;

    assert!(rest_history(addr, "x").await.is_empty());
    assert_eq!(rest_history(addr, "y").await.len(), 1);
}

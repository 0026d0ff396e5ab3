// Shared fixtures: an in-process relay, a fake classifier upstream and socket helpers

#![allow(dead_code)]

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, Uri},
    Json, Router,
};
use drishti_api::{ClientMessage, ServerMessage};
use drishti_core::ServerConfig;
use drishti_server::{create_router, RelayState};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{tungstenite::Message, MaybeTlsStream, WebSocketStream};

pub type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Relay on an ephemeral port
pub async fn spawn_relay(default_classifier: &str) -> (SocketAddr, RelayState) {
    let config = ServerConfig {
        host: "127.0.0.1".to_string(),
        default_classifier: default_classifier.to_string(),
        ..ServerConfig::default()
    };
    let state = RelayState::new(&config).unwrap();
    let app = create_router(state.clone(), &config);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

/// Request seen by the fake classifier
#[derive(Debug, Clone)]
pub struct Captured {
    pub path: String,
    pub query: Option<String>,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl Captured {
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }
}

#[derive(Clone)]
struct ClassifierState {
    reply: JsonValue,
    seen: Arc<Mutex<Vec<Captured>>>,
}

async fn capture(
    State(state): State<ClassifierState>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Json<JsonValue> {
    state.seen.lock().push(Captured {
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        content_type: headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: body.to_vec(),
    });
    Json(state.reply.clone())
}

/// Fake classifier answering every request with `reply`.
/// Returns its base URL and the requests it received.
pub async fn spawn_classifier(reply: JsonValue) -> (String, Arc<Mutex<Vec<Captured>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new().fallback(capture).with_state(ClassifierState {
        reply,
        seen: Arc::clone(&seen),
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), seen)
}

pub async fn ws_connect(addr: SocketAddr) -> Socket {
    let (socket, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", addr))
        .await
        .unwrap();
    socket
}

pub async fn send(socket: &mut Socket, message: &ClientMessage) {
    socket
        .send(Message::Text(message.to_json().unwrap()))
        .await
        .unwrap();
}

/// Next relay event, `None` on timeout or close
pub async fn next_event(socket: &mut Socket, wait: Duration) -> Option<ServerMessage> {
    loop {
        let frame = tokio::time::timeout(wait, socket.next()).await.ok()??.ok()?;
        match frame {
            Message::Text(text) => return ServerMessage::from_json(&text).ok(),
            Message::Close(_) => return None,
            _ => continue,
        }
    }
}

/// Join `room` and wait until the relay lists this socket in it
pub async fn join(socket: &mut Socket, room: &str, url: &str, endpoint: &str) {
    send(socket, &ClientMessage::join(room, url, endpoint)).await;
    send(socket, &ClientMessage::GetRooms).await;
    loop {
        match next_event(socket, Duration::from_secs(5)).await {
            Some(ServerMessage::GetRooms { rooms }) if rooms.contains_key(room) => return,
            Some(_) => continue,
            None => panic!("relay did not confirm room {}", room),
        }
    }
}

/// Poll `check` until it holds or a few seconds pass
pub async fn eventually(check: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

pub fn confident_reply(label: &str) -> JsonValue {
    serde_json::json!({
        "result": "success",
        "classified": [
            {"xmin": 8, "ymin": 8, "xmax": 40, "ymax": 40, "confidence": 0.99, "label": label},
            {"xmin": 50, "ymin": 8, "xmax": 60, "ymax": 20, "confidence": 0.40, "label": "noise"}
        ]
    })
}

// WebSocket handler for room membership and detection fan-out

use crate::http::RelayState;
use crate::rooms::RoomRegistry;
use crate::websocket_manager::WebSocketManager;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use drishti_api::{ClientMessage, ConnectionId, ServerMessage};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// WebSocket upgrade handler
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<RelayState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, state: RelayState) {
    let connection_id = Uuid::new_v4().to_string();
    info!("WebSocket connection established: {}", connection_id);

    // Create channel for sending messages to this connection
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    if let Err(e) = state.manager.register_connection(connection_id.clone(), tx) {
        error!("Failed to register WebSocket connection {}: {}", connection_id, e);
        return;
    }

    let (mut sender, mut receiver) = socket.split();

    let send_connection_id = connection_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let json = match message.to_json() {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize WebSocket message: {}", e);
                    continue;
                }
            };

            if let Err(e) = sender.send(Message::Text(json)).await {
                warn!("Failed to send WebSocket message to {}: {}", send_connection_id, e);
                break;
            }
        }
    });

    let recv_connection_id = connection_id.clone();
    let recv_state = state.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    handle_message(&text, &recv_connection_id, &recv_state.manager, &recv_state.rooms);
                }
                Ok(Message::Binary(_)) => {
                    warn!("Received binary message from {}, ignoring", recv_connection_id);
                }
                Ok(Message::Close(_)) => {
                    debug!("WebSocket connection {} closed by client", recv_connection_id);
                    break;
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                Err(e) => {
                    warn!("WebSocket error from {}: {}", recv_connection_id, e);
                    break;
                }
            }
        }
    });

    // Wait for either task to complete
    tokio::select! {
        _ = send_task => {
            debug!("Send task completed for connection {}", connection_id);
        }
        _ = recv_task => {
            debug!("Receive task completed for connection {}", connection_id);
        }
    }

    for room in state.manager.unregister_connection(&connection_id) {
        state
            .rooms
            .evict_if_empty(&room, || state.manager.room_member_count(&room));
    }
    info!("WebSocket connection closed: {}", connection_id);
}

/// Handle incoming WebSocket message
pub fn handle_message(
    text: &str,
    connection_id: &ConnectionId,
    manager: &WebSocketManager,
    rooms: &RoomRegistry,
) {

    let message = match ClientMessage::from_json(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!("Failed to parse WebSocket message from {}: {}", connection_id, e);
            let error_msg = ServerMessage::error("parse_error", format!("Invalid message format: {}", e));
            manager.send_to_connection(connection_id, error_msg);
            return;
        }
    };

    match message {
        ClientMessage::Room { id, url, endpoint } => match manager.join_room(connection_id, &id) {
            Ok(()) => {
                rooms.register(&id, &url, &endpoint);
                info!("Connection {} joined room {}", connection_id, id);
            }
            Err(e) => {
                warn!("Failed to join {} to room {}: {}", connection_id, id, e);
                manager.send_to_connection(connection_id, ServerMessage::error("join_error", e));
            }
        },
        ClientMessage::GetRooms => {
            let reply = ServerMessage::GetRooms {
                rooms: manager.room_snapshot(),
            };
            if !manager.send_to_connection(connection_id, reply) {
                warn!("Failed to send rooms to {}", connection_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (WebSocketManager, RoomRegistry, mpsc::UnboundedReceiver<ServerMessage>) {
        let manager = WebSocketManager::default();
        let (tx, rx) = mpsc::unbounded_channel();
        manager.register_connection("c1".to_string(), tx).unwrap();
        (manager, RoomRegistry::new(), rx)
    }

    #[test]
    fn test_room_message_joins_and_registers() {
        let (manager, rooms, _rx) = setup();
        let id = "c1".to_string();
        handle_message(
            r#"{"event":"room","data":{"id":"A","url":"https://vision","endpoint":"/api"}}"#,
            &id,
            &manager,
            &rooms,
        );
        assert_eq!(manager.room_member_count(&"A".to_string()), 1);
        assert_eq!(rooms.target_for("A").as_deref(), Some("https://vision/api"));
    }

    #[test]
    fn test_get_rooms_replies_with_snapshot() {
        let (manager, rooms, mut rx) = setup();
        let id = "c1".to_string();
        handle_message(r#"{"event":"room","data":{"id":"A"}}"#, &id, &manager, &rooms);
        handle_message(r#"{"event":"getRooms"}"#, &id, &manager, &rooms);

        match rx.try_recv().unwrap() {
            ServerMessage::GetRooms { rooms } => assert_eq!(rooms["A"], vec!["c1".to_string()]),
            other => panic!("unexpected reply {:?}", other),
        }
    }

    #[test]
    fn test_malformed_message_gets_error() {
        let (manager, rooms, mut rx) = setup();
        handle_message("{nope", &"c1".to_string(), &manager, &rooms);
        assert!(matches!(rx.try_recv().unwrap(), ServerMessage::Error { .. }));
    }
}

// WebSocket Connection Manager
// Tracks active connections and room membership, and routes messages

use drishti_api::{ConnectionId, RoomId, RoomSnapshot, ServerMessage};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// WebSocket connection state
#[derive(Debug, Clone)]
pub struct ConnectionState {
    pub id: ConnectionId,
    pub rooms: HashSet<RoomId>,
}

/// WebSocket configuration
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    pub max_connections: usize,
    pub max_rooms_per_connection: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            max_connections: 1000,
            max_rooms_per_connection: 100,
        }
    }
}

/// WebSocket connection manager
pub struct WebSocketManager {
    /// Active connections: connection_id -> connection_state
    connections: Arc<RwLock<HashMap<ConnectionId, ConnectionState>>>,

    /// Room members: room -> set of connection_ids
    room_members: Arc<RwLock<HashMap<RoomId, HashSet<ConnectionId>>>>,

    /// Per-connection message senders: connection_id -> sender
    message_senders: Arc<RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<ServerMessage>>>>,

    config: WebSocketConfig,
}

impl WebSocketManager {
    pub fn new(config: WebSocketConfig) -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            room_members: Arc::new(RwLock::new(HashMap::new())),
            message_senders: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    /// Register a new connection
    pub fn register_connection(
        &self,
        connection_id: ConnectionId,
        sender: mpsc::UnboundedSender<ServerMessage>,
    ) -> Result<(), String> {
        if self.connections.read().len() >= self.config.max_connections {
            return Err(format!(
                "Maximum connections ({}) reached",
                self.config.max_connections
            ));
        }

        let state = ConnectionState {
            id: connection_id.clone(),
            rooms: HashSet::new(),
        };

        self.connections.write().insert(connection_id.clone(), state);
        self.message_senders.write().insert(connection_id.clone(), sender);

        info!("WebSocket connection registered: {}", connection_id);
        Ok(())
    }

    /// Unregister a connection. Returns the rooms left without members.
    pub fn unregister_connection(&self, connection_id: &ConnectionId) -> Vec<RoomId> {
        let state = self.connections.write().remove(connection_id);
        self.message_senders.write().remove(connection_id);

        let mut emptied = Vec::new();
        if let Some(state) = state {
            let mut members = self.room_members.write();
            for room in state.rooms {
                if let Some(set) = members.get_mut(&room) {
                    set.remove(connection_id);
                    if set.is_empty() {
                        members.remove(&room);
                        emptied.push(room);
                    }
                }
            }
        }

        info!("WebSocket connection unregistered: {}", connection_id);
        emptied
    }

    /// Join a connection to a room
    pub fn join_room(&self, connection_id: &ConnectionId, room: &RoomId) -> Result<(), String> {
        if room.is_empty() {
            return Err("Room id cannot be empty".to_string());
        }
        if room.len() > 256 {
            return Err("Room id too long (max 256 characters)".to_string());
        }
        if room.chars().any(char::is_control) {
            return Err("Invalid characters in room id".to_string());
        }

        {
            let mut connections = self.connections.write();
            let state = connections
                .get_mut(connection_id)
                .ok_or_else(|| "Connection not found".to_string())?;

            if state.rooms.contains(room) {
                debug!("Connection {} already in room {}", connection_id, room);
                return Ok(());
            }
            if state.rooms.len() >= self.config.max_rooms_per_connection {
                return Err(format!(
                    "Maximum rooms ({}) per connection reached",
                    self.config.max_rooms_per_connection
                ));
            }

            state.rooms.insert(room.clone());
        }

        self.room_members
            .write()
            .entry(room.clone())
            .or_default()
            .insert(connection_id.clone());

        debug!("Connection {} joined room {}", connection_id, room);
        Ok(())
    }

    /// Send message to a specific connection
    pub fn send_to_connection(&self, connection_id: &ConnectionId, message: ServerMessage) -> bool {
        let senders = self.message_senders.read();
        match senders.get(connection_id) {
            Some(sender) => match sender.send(message) {
                Ok(_) => true,
                Err(_) => {
                    debug!("Message sender closed for connection: {}", connection_id);
                    false
                }
            },
            None => {
                debug!("Attempted to send message to non-existent connection: {}", connection_id);
                false
            }
        }
    }

    /// Broadcast message to every member of a room. Returns the number of
    /// connections the message was queued for.
    pub fn broadcast_to_room(&self, room: &RoomId, message: ServerMessage) -> usize {
        let members: Vec<ConnectionId> = {
            let rooms = self.room_members.read();
            match rooms.get(room) {
                Some(members) => members.iter().cloned().collect(),
                None => return 0,
            }
        };

        let senders = self.message_senders.read();
        let mut sent_count = 0;
        for connection_id in members {
            let Some(sender) = senders.get(&connection_id) else {
                continue;
            };
            // A closed sender belongs to a socket that is shutting down and
            // will unregister itself
            match sender.send(message.clone()) {
                Ok(_) => sent_count += 1,
                Err(_) => warn!("Failed to send message to connection {} (channel closed)", connection_id),
            }
        }

        sent_count
    }

    /// Room membership: room id -> sorted connection ids
    pub fn room_snapshot(&self) -> RoomSnapshot {
        self.room_members
            .read()
            .iter()
            .map(|(room, members)| {
                let mut members: Vec<ConnectionId> = members.iter().cloned().collect();
                members.sort();
                (room.clone(), members)
            })
            .collect()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    pub fn room_count(&self) -> usize {
        self.room_members.read().len()
    }

    pub fn room_member_count(&self, room: &RoomId) -> usize {
        self.room_members.read().get(room).map(|m| m.len()).unwrap_or(0)
    }

    pub fn get_connection_state(&self, connection_id: &ConnectionId) -> Option<ConnectionState> {
        self.connections.read().get(connection_id).cloned()
    }
}

impl Default for WebSocketManager {
    fn default() -> Self {
        Self::new(WebSocketConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn connect(manager: &WebSocketManager, id: &str) -> mpsc::UnboundedReceiver<ServerMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        manager.register_connection(id.to_string(), tx).unwrap();
        rx
    }

    fn batch() -> ServerMessage {
        ServerMessage::AddRecognize(vec![json!({"timestamp": 1})])
    }

    #[test]
    fn test_broadcast_reaches_only_room_members() {
        let manager = WebSocketManager::default();
        let mut a1 = connect(&manager, "a1");
        let mut a2 = connect(&manager, "a2");
        let mut b1 = connect(&manager, "b1");
        manager.join_room(&"a1".to_string(), &"A".to_string()).unwrap();
        manager.join_room(&"a2".to_string(), &"A".to_string()).unwrap();
        manager.join_room(&"b1".to_string(), &"B".to_string()).unwrap();

        assert_eq!(manager.broadcast_to_room(&"A".to_string(), batch()), 2);
        assert_eq!(a1.try_recv().unwrap(), batch());
        assert_eq!(a2.try_recv().unwrap(), batch());
        assert!(b1.try_recv().is_err());
    }

    #[test]
    fn test_broadcast_to_unknown_room() {
        let manager = WebSocketManager::default();
        assert_eq!(manager.broadcast_to_room(&"nobody".to_string(), batch()), 0);
    }

    #[test]
    fn test_join_is_idempotent() {
        let manager = WebSocketManager::default();
        let _rx = connect(&manager, "c1");
        manager.join_room(&"c1".to_string(), &"A".to_string()).unwrap();
        manager.join_room(&"c1".to_string(), &"A".to_string()).unwrap();
        assert_eq!(manager.room_member_count(&"A".to_string()), 1);
    }

    #[test]
    fn test_join_validation() {
        let manager = WebSocketManager::default();
        let _rx = connect(&manager, "c1");
        assert!(manager.join_room(&"c1".to_string(), &String::new()).is_err());
        assert!(manager.join_room(&"c1".to_string(), &"bad\nroom".to_string()).is_err());
        assert!(manager.join_room(&"ghost".to_string(), &"A".to_string()).is_err());
    }

    #[test]
    fn test_unregister_reports_emptied_rooms() {
        let manager = WebSocketManager::default();
        let _r1 = connect(&manager, "c1");
        let _r2 = connect(&manager, "c2");
        manager.join_room(&"c1".to_string(), &"A".to_string()).unwrap();
        manager.join_room(&"c1".to_string(), &"B".to_string()).unwrap();
        manager.join_room(&"c2".to_string(), &"B".to_string()).unwrap();

        let emptied = manager.unregister_connection(&"c1".to_string());
        assert_eq!(emptied, vec!["A".to_string()]);
        assert_eq!(manager.room_member_count(&"B".to_string()), 1);
        assert_eq!(manager.connection_count(), 1);
    }

    #[test]
    fn test_room_snapshot() {
        let manager = WebSocketManager::default();
        let _r1 = connect(&manager, "c2");
        let _r2 = connect(&manager, "c1");
        manager.join_room(&"c2".to_string(), &"A".to_string()).unwrap();
        manager.join_room(&"c1".to_string(), &"A".to_string()).unwrap();

        let snapshot = manager.room_snapshot();
        assert_eq!(snapshot["A"], vec!["c1".to_string(), "c2".to_string()]);
    }

    #[test]
    fn test_connection_limit() {
        let manager = WebSocketManager::new(WebSocketConfig {
            max_connections: 1,
            max_rooms_per_connection: 1,
        });
        let _r1 = connect(&manager, "c1");
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(manager.register_connection("c2".to_string(), tx).is_err());

        manager.join_room(&"c1".to_string(), &"A".to_string()).unwrap();
        assert!(manager.join_room(&"c1".to_string(), &"B".to_string()).is_err());
    }
}

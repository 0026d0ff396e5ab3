// Real-time room protocol
//
// Every frame is a JSON text message `{"event": <name>, "data": <payload>}`.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Socket connection ID
pub type ConnectionId = String;

/// Room (session code) name
pub type RoomId = String;

/// Room membership: room id -> connected members
pub type RoomSnapshot = BTreeMap<RoomId, Vec<ConnectionId>>;

/// Client -> server messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientMessage {
    /// Join a room and register its classification endpoint
    #[serde(rename = "room")]
    Room {
        id: RoomId,
        #[serde(default)]
        url: String,
        #[serde(default)]
        endpoint: String,
    },
    #[serde(rename = "getRooms")]
    GetRooms,
}

/// Server -> client messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerMessage {
    /// One timestamped detection batch, wrapped in a list
    #[serde(rename = "addRecognize")]
    AddRecognize(Vec<JsonValue>),
    #[serde(rename = "getRooms")]
    GetRooms { rooms: RoomSnapshot },
    #[serde(rename = "error")]
    Error { code: String, message: String },
}

impl ClientMessage {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn join(id: impl Into<String>, url: impl Into<String>, endpoint: impl Into<String>) -> Self {
        ClientMessage::Room {
            id: id.into(),
            url: url.into(),
            endpoint: endpoint.into(),
        }
    }
}

impl ServerMessage {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Wire name of the event
    pub fn event_name(&self) -> &'static str {
        match self {
            ServerMessage::AddRecognize(_) => "addRecognize",
            ServerMessage::GetRooms { .. } => "getRooms",
            ServerMessage::Error { .. } => "error",
        }
    }
}

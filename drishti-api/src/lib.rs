//! Wire protocol shared by the relay server and its clients

pub mod websocket;
pub mod relay;

pub use websocket::{ClientMessage, ConnectionId, RoomId, RoomSnapshot, ServerMessage};
pub use relay::{ClassifyQuery, DetectionBatch, PublishRequest, PublishResponse};

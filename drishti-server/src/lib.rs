pub mod error;
pub mod http;
pub mod proxy;
pub mod rooms;
pub mod static_files;
pub mod websocket;
pub mod websocket_manager;

pub use error::RelayError;
pub use http::{create_router, RelayState};

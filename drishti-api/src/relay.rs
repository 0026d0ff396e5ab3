// HTTP bodies of the relay routes

use drishti_core::ClassifiedBox;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// `POST /publish` body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishRequest {
    /// Room to broadcast to
    pub id: String,
    pub data: Map<String, JsonValue>,
}

/// `POST /publish` reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishResponse {
    pub status: String,
}

impl PublishResponse {
    pub fn ok() -> Self {
        Self {
            status: "OK".to_string(),
        }
    }
}

/// `POST /classify` query string
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassifyQuery {
    pub id: Option<String>,
}

/// Detection batch published by a camera pipeline and relayed as `addRecognize`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionBatch {
    pub result: String,
    pub classified: Vec<ClassifiedBox>,
    /// Capture time on the publishing side (ms since epoch)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured_at: Option<i64>,
    /// Set by the relay when the batch is broadcast (ms since epoch)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl DetectionBatch {
    pub fn into_publish(self, room: impl Into<String>) -> Result<PublishRequest, serde_json::Error> {
        let data = match serde_json::to_value(self)? {
            JsonValue::Object(map) => map,
            _ => Map::new(),
        };
        Ok(PublishRequest {
            id: room.into(),
            data,
        })
    }
}

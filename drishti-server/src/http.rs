// HTTP routes of the relay server

use crate::error::RelayError;
use crate::proxy::{ClassifyProxy, UpstreamResponse};
use crate::rooms::RoomRegistry;
use crate::static_files::index_handler;
use crate::websocket::websocket_handler;
use crate::websocket_manager::{WebSocketConfig, WebSocketManager};
use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use drishti_api::{ClassifyQuery, PublishRequest, PublishResponse, ServerMessage};
use drishti_core::ServerConfig;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::{debug, info};

/// Largest accepted request body (classifier uploads)
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Shared relay state
#[derive(Clone)]
pub struct RelayState {
    pub manager: Arc<WebSocketManager>,
    pub rooms: Arc<RoomRegistry>,
    pub proxy: Arc<ClassifyProxy>,
}

impl RelayState {
    pub fn new(config: &ServerConfig) -> Result<Self, RelayError> {
        Ok(Self {
            manager: Arc::new(WebSocketManager::new(WebSocketConfig::default())),
            rooms: Arc::new(RoomRegistry::new()),
            proxy: Arc::new(ClassifyProxy::new(config)?),
        })
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    connections: usize,
    rooms: usize,
}

pub fn create_router(state: RelayState, config: &ServerConfig) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/publish", post(publish_handler))
        .route("/classify", post(classify_handler))
        .route("/ws", get(websocket_handler))
        .nest_service("/assets", ServeDir::new(&config.assets_dir))
        .nest_service("/static", ServeDir::new(&config.static_dir))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_handler(State(state): State<RelayState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        connections: state.manager.connection_count(),
        rooms: state.manager.room_count(),
    })
}

/// Timestamp a detection batch and fan it out to the room
async fn publish_handler(
    State(state): State<RelayState>,
    Json(request): Json<PublishRequest>,
) -> Json<PublishResponse> {
    let PublishRequest { id, mut data } = request;
    data.insert(
        "timestamp".to_string(),
        JsonValue::from(Utc::now().timestamp_millis()),
    );

    let delivered = state
        .manager
        .broadcast_to_room(&id, ServerMessage::AddRecognize(vec![JsonValue::Object(data)]));
    debug!("Published to room '{}' ({} sockets)", id, delivered);

    Json(PublishResponse::ok())
}

/// Forward a classification request to the room's classifier
async fn classify_handler(
    State(state): State<RelayState>,
    Query(query): Query<ClassifyQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, RelayError> {
    let target = query
        .id
        .as_deref()
        .and_then(|id| state.rooms.target_for(id))
        .unwrap_or_else(|| state.proxy.default_endpoint().to_string());

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());

    info!("Classify request for room {:?} -> {}", query.id, target);
    let upstream = state.proxy.forward(&target, content_type, body).await?;
    relay_response(upstream)
}

fn relay_response(upstream: UpstreamResponse) -> Result<Response, RelayError> {
    let status = StatusCode::from_u16(upstream.status)
        .map_err(|e| RelayError::Upstream(format!("invalid upstream status: {}", e)))?;

    let mut builder = Response::builder().status(status);
    if let Some(content_type) = upstream.content_type {
        builder = builder.header(header::CONTENT_TYPE, content_type);
    }
    builder
        .body(Body::from(upstream.body))
        .map_err(|e| RelayError::Internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use axum::http::Request;
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    fn router() -> (Router, RelayState) {
        let config = ServerConfig {
            default_classifier: "http://127.0.0.1:9/unreachable".to_string(),
            ..ServerConfig::default()
        };
        let state = RelayState::new(&config).unwrap();
        (create_router(state.clone(), &config), state)
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = router();
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: JsonValue = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "healthy");
    }

    #[tokio::test]
    async fn test_index_page() {
        let (app, _) = router();
        let response = app
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_publish_stamps_and_broadcasts() {
        let (app, state) = router();
        let (tx, mut rx) = mpsc::unbounded_channel();
        state.manager.register_connection("c1".to_string(), tx).unwrap();
        state.manager.join_room(&"c1".to_string(), &"A".to_string()).unwrap();

        let before = Utc::now().timestamp_millis();
        let response = app
            .oneshot(
                Request::post("/publish")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"id":"A","data":{"result":"success","classified":[]}}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], br#"{"status":"OK"}"#);

        match rx.try_recv().unwrap() {
            ServerMessage::AddRecognize(batches) => {
                assert_eq!(batches.len(), 1);
                assert_eq!(batches[0]["result"], "success");
                assert!(batches[0]["timestamp"].as_i64().unwrap() >= before);
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_publish_rejects_malformed_body() {
        let (app, _) = router();
        let response = app
            .oneshot(
                Request::post("/publish")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"data":{}}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn test_classify_unreachable_upstream_is_bad_gateway() {
        let (app, _) = router();
        let response = app
            .oneshot(
                Request::post("/classify?id=nobody")
                    .header(header::CONTENT_TYPE, "image/jpeg")
                    .body(Body::from(vec![0xFFu8, 0xD8]))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_relay_response_keeps_status_and_type() {
        let response = tokio_test::assert_ok!(relay_response(UpstreamResponse {
            status: 418,
            content_type: Some("application/json".to_string()),
            body: Bytes::from_static(b"{}"),
        }));
        assert_eq!(response.status().as_u16(), 418);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    }
}

//! Relay server clients: detection publishing and room membership

use crate::error::VisionError;
use async_trait::async_trait;
use drishti_api::{ClientMessage, PublishRequest, PublishResponse, ServerMessage};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Destination for confident detection batches
#[async_trait]
pub trait RelayPublisher: Send + Sync {
    async fn publish(&self, request: PublishRequest) -> Result<(), VisionError>;
}

/// Publishes through the relay's `POST /publish`
pub struct HttpRelayPublisher {
    client: reqwest::Client,
    url: String,
}

impl HttpRelayPublisher {
    pub fn new(relay_url: &str, timeout: Option<Duration>) -> Result<Self, VisionError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            url: format!("{}/publish", relay_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl RelayPublisher for HttpRelayPublisher {
    async fn publish(&self, request: PublishRequest) -> Result<(), VisionError> {
        let room = request.id.clone();
        let response = self.client.post(&self.url).json(&request).send().await?;

        if !response.status().is_success() {
            return Err(VisionError::Relay(format!("publish returned {}", response.status())));
        }

        let reply: PublishResponse = response.json().await?;
        if reply != PublishResponse::ok() {
            warn!("Relay answered publish to '{}' with status '{}'", room, reply.status);
        } else {
            debug!("Published detections to room '{}'", room);
        }
        Ok(())
    }
}

/// Websocket URL of the relay's socket endpoint
pub fn websocket_url(relay_url: &str) -> String {
    let base = relay_url.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        base.to_string()
    };
    format!("{}/ws", base)
}

/// Room socket connection to the relay
pub struct RoomClient {
    outgoing: mpsc::UnboundedSender<ClientMessage>,
    incoming: mpsc::UnboundedReceiver<ServerMessage>,
}

impl RoomClient {
    pub async fn connect(relay_url: &str) -> Result<Self, VisionError> {
        let url = websocket_url(relay_url);
        let (stream, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| VisionError::Relay(format!("Failed to connect to {}: {}", url, e)))?;
        info!("Connected to relay socket at {}", url);

        let (mut sink, mut source) = stream.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ClientMessage>();
        let (in_tx, in_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(message) = out_rx.recv().await {
                let text = match message.to_json() {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Failed to serialize room message: {}", e);
                        continue;
                    }
                };
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        tokio::spawn(async move {
            while let Some(Ok(message)) = source.next().await {
                match message {
                    Message::Text(text) => match ServerMessage::from_json(&text) {
                        Ok(event) => {
                            if in_tx.send(event).is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("Ignoring malformed relay message: {}", e),
                    },
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            debug!("Relay socket closed");
        });

        Ok(Self {
            outgoing: out_tx,
            incoming: in_rx,
        })
    }

    /// Join room `id` and register its classifier (`url` + `endpoint`)
    pub fn join(&self, id: &str, url: &str, endpoint: &str) -> Result<(), VisionError> {
        self.send(ClientMessage::join(id, url, endpoint))
    }

    /// Ask for the room membership snapshot
    pub fn request_rooms(&self) -> Result<(), VisionError> {
        self.send(ClientMessage::GetRooms)
    }

    /// Next event from the relay, `None` once the socket closed
    pub async fn next_event(&mut self) -> Option<ServerMessage> {
        self.incoming.recv().await
    }

    fn send(&self, message: ClientMessage) -> Result<(), VisionError> {
        self.outgoing
            .send(message)
            .map_err(|_| VisionError::Relay("room socket closed".to_string()))
    }
}

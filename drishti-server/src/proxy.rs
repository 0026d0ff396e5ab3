//! `/classify` passthrough to the room's classifier

use crate::error::RelayError;
use axum::body::Bytes;
use drishti_core::ServerConfig;
use std::time::Duration;
use tracing::{debug, warn};

/// Upstream answer relayed back unchanged
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

pub struct ClassifyProxy {
    client: reqwest::Client,
    default_endpoint: String,
}

impl ClassifyProxy {
    pub fn new(config: &ServerConfig) -> Result<Self, RelayError> {
        let mut builder = reqwest::Client::builder().danger_accept_invalid_certs(config.accept_invalid_certs);
        if let Some(ms) = config.classify_timeout_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }
        let client = builder
            .build()
            .map_err(|e| RelayError::Internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            default_endpoint: config.default_classifier.clone(),
        })
    }

    pub fn default_endpoint(&self) -> &str {
        &self.default_endpoint
    }

    /// POST `body` to `target` with the caller's content type
    pub async fn forward(
        &self,
        target: &str,
        content_type: Option<&str>,
        body: Bytes,
    ) -> Result<UpstreamResponse, RelayError> {
        debug!("Forwarding {} bytes to {}", body.len(), target);

        let mut request = self.client.post(target).body(body);
        if let Some(content_type) = content_type {
            request = request.header(reqwest::header::CONTENT_TYPE, content_type);
        }

        let response = request.send().await.map_err(|e| {
            warn!("Classifier upstream {} unreachable: {}", target, e);
            RelayError::Upstream(e.to_string())
        })?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?;

        Ok(UpstreamResponse {
            status,
            content_type,
            body,
        })
    }
}

// Configuration for the relay server and the camera pipeline

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::types::RECOGNITION_THRESHOLD;

/// Upstream used by the classify proxy when a room has no endpoint registered
pub const DEFAULT_CLASSIFIER_ENDPOINT: &str =
    "https://127.0.0.1:1100/powerai-vision/api/dlapis/default";

/// Deployment mode, only used for the startup banner and log defaults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Development,
    Production,
}

impl RunMode {
    pub fn from_env_value(value: &str) -> Self {
        if value.eq_ignore_ascii_case("production") {
            RunMode::Production
        } else {
            RunMode::Development
        }
    }

    pub fn is_production(&self) -> bool {
        *self == RunMode::Production
    }
}

/// Relay server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Fallback upstream for `/classify`
    pub default_classifier: String,
    /// Served under `/assets`
    pub assets_dir: String,
    /// Served under `/static`
    pub static_dir: String,
    /// Skip TLS verification towards classifier upstreams
    pub accept_invalid_certs: bool,
    /// No timeout when unset
    pub classify_timeout_ms: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            default_classifier: DEFAULT_CLASSIFIER_ENDPOINT.to_string(),
            assets_dir: "builtAssets".to_string(),
            static_dir: "static".to_string(),
            accept_invalid_certs: true,
            classify_timeout_ms: None,
        }
    }
}

/// Camera pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EyeConfig {
    /// Capture device index
    pub camera_id: u32,
    pub frame_rate: u32,
    pub resolution: (u32, u32),
    /// Base URL of the relay server (`/classify` and `/publish` live there)
    pub relay_url: String,
    /// Room the pipeline reports to
    pub session_code: Option<String>,
    pub recognition_threshold: f32,
    pub jpeg_quality: u8,
    /// No timeout when unset
    pub classifier_timeout_ms: Option<u64>,
}

impl Default for EyeConfig {
    fn default() -> Self {
        Self {
            camera_id: 0,
            frame_rate: 20,
            resolution: (640, 480),
            relay_url: "http://localhost:3000".to_string(),
            session_code: None,
            recognition_threshold: RECOGNITION_THRESHOLD,
            jpeg_quality: 85,
            classifier_timeout_ms: None,
        }
    }
}

/// Complete configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DrishtiConfig {
    pub log_level: String,
    pub mode: RunMode,
    pub server: ServerConfig,
    pub eye: EyeConfig,
}

impl Default for DrishtiConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            mode: RunMode::Development,
            server: ServerConfig::default(),
            eye: EyeConfig::default(),
        }
    }
}

impl DrishtiConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.as_ref().display(), e)))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Defaults overlaid with the process environment
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Overlay values from the process environment
    pub fn with_env(mut self) -> Self {
        self.apply_env(|key| std::env::var(key).ok());
        self
    }

    /// Overlay values from an arbitrary lookup
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(port) = lookup("PORT") {
            match port.parse::<u16>() {
                Ok(p) => self.server.port = p,
                Err(_) => tracing::warn!("Ignoring invalid PORT value: {}", port),
            }
        }

        if let Some(host) = lookup("DRISHTI_HOST") {
            self.server.host = host;
        }

        if let Some(endpoint) = lookup("DRISHTI_DEFAULT_CLASSIFIER") {
            self.server.default_classifier = endpoint;
        }

        if let Some(url) = lookup("DRISHTI_RELAY_URL") {
            self.eye.relay_url = url;
        }

        if let Some(code) = lookup("DRISHTI_SESSION_CODE") {
            self.eye.session_code = Some(code).filter(|c| !c.is_empty());
        }

        if let Some(level) = lookup("DRISHTI_LOG_LEVEL") {
            self.log_level = level;
        }

        if let Some(mode) = lookup("DRISHTI_ENV") {
            self.mode = RunMode::from_env_value(&mode);
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::Validation("server.host cannot be empty".to_string()));
        }

        if self.server.port == 0 {
            return Err(ConfigError::Validation("server.port cannot be 0".to_string()));
        }

        if self.server.default_classifier.trim().is_empty() {
            return Err(ConfigError::Validation(
                "server.default_classifier cannot be empty".to_string(),
            ));
        }

        self.eye.validate()
    }
}

impl EyeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frame_rate == 0 || self.frame_rate > 120 {
            return Err(ConfigError::Validation(
                "eye.frame_rate must be between 1 and 120".to_string(),
            ));
        }

        if self.resolution.0 == 0 || self.resolution.1 == 0 {
            return Err(ConfigError::Validation("eye.resolution must be non-zero".to_string()));
        }

        if self.relay_url.trim().is_empty() {
            return Err(ConfigError::Validation("eye.relay_url cannot be empty".to_string()));
        }

        if !(0.0..=1.0).contains(&self.recognition_threshold) {
            return Err(ConfigError::Validation(
                "eye.recognition_threshold must be within [0, 1]".to_string(),
            ));
        }

        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err(ConfigError::Validation(
                "eye.jpeg_quality must be between 1 and 100".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

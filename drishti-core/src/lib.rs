pub mod types;
pub mod error;
pub mod config;
pub mod reconcile;

pub use error::{Error, Result};
pub use types::{
    ClassifiedBox, ClassifierResponse, Detection, Rect, RotatedBox, TrackSummary,
    RECOGNITION_THRESHOLD,
};
pub use config::{DrishtiConfig, EyeConfig, ServerConfig, ConfigError, RunMode};
pub use reconcile::{untracked, filter_confident};

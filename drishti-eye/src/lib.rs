//! drishti-eye: camera side of Drishti
//!
//! Captures frames, tracks classified objects with CamShift in a background
//! tracking worker, submits frames to the remote classifier from a background
//! detection worker and publishes confident detections to the relay.

pub mod backend;
#[cfg(feature = "opencv")]
pub mod camera;
pub mod classifier;
pub mod display;
pub mod error;
pub mod messages;
pub mod orchestrator;
pub mod processing;
pub mod relay;
pub mod vision;

pub use classifier::{Classifier, HttpClassifier};
pub use error::VisionError;
pub use orchestrator::{Orchestrator, OrchestratorHandle, PipelineSnapshot};
pub use processing::{DetectionWorker, ObjectTracker};
pub use relay::{HttpRelayPublisher, RelayPublisher, RoomClient};
pub use vision::{Frame, VisionBackend};

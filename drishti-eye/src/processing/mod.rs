//! Vision processing workers

pub mod detection;
pub mod tracker;

pub use detection::{spawn_detector, DetectionWorker};
pub use tracker::{spawn_tracker, ObjectTracker, TrackedObject};

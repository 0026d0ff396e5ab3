//! Vision backends

#[cfg(feature = "opencv")]
pub mod cv;

#[cfg(feature = "opencv")]
pub use cv::{OpenCvBackend, WindowSink};

//! Destinations for annotated frames

use crate::error::VisionError;
use crate::vision::Frame;
use tokio::sync::watch;

/// Receives every annotated frame the tracker produces
pub trait FrameSink: Send + 'static {
    fn show(&mut self, frame: &Frame) -> Result<(), VisionError>;
}

/// Discards frames (headless runs)
#[derive(Debug, Default)]
pub struct NullSink;

impl FrameSink for NullSink {
    fn show(&mut self, _frame: &Frame) -> Result<(), VisionError> {
        Ok(())
    }
}

/// Keeps the latest annotated frame in a watch channel
pub struct WatchSink {
    sender: watch::Sender<Option<Frame>>,
}

impl WatchSink {
    pub fn new() -> (Self, watch::Receiver<Option<Frame>>) {
        let (sender, receiver) = watch::channel(None);
        (Self { sender }, receiver)
    }
}

impl FrameSink for WatchSink {
    fn show(&mut self, frame: &Frame) -> Result<(), VisionError> {
        // No receiver left is not an error for a preview
        self.sender.send_replace(Some(frame.clone()));
        Ok(())
    }
}

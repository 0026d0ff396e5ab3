//! Messages exchanged between the orchestrator and its two workers
//!
//! Each variant maps to a wire-style kind name, used for logging.

use crate::vision::Frame;
use drishti_core::{Detection, TrackSummary};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Orchestrator -> tracking worker
#[derive(Debug, Clone)]
pub enum TrackerCommand {
    /// Prepare buffers for the frame geometry and process the first frame
    Start { width: u32, height: u32, frame: Frame },
    /// Advance every tracked object on `frame` and draw it
    Process { frame: Frame },
    /// Adopt detections not already covered by a tracked object
    NewObjects { frame: Frame, detections: Vec<Detection> },
    /// Forget every tracked object
    Reset,
}

impl TrackerCommand {
    pub fn kind(&self) -> &'static str {
        match self {
            TrackerCommand::Start { .. } => "tracker-start",
            TrackerCommand::Process { .. } => "tracker-process",
            TrackerCommand::NewObjects { .. } => "tracker-new-objects",
            TrackerCommand::Reset => "tracker-reset",
        }
    }
}

/// Tracking worker -> orchestrator
#[derive(Debug, Clone)]
pub enum TrackerEvent {
    Inited,
    /// Annotated frame ready for display
    Processed { frame: Frame },
    /// Frame could not be processed and nothing was drawn
    Dropped { reason: String },
    /// Current tracked set after a reconciliation or reset
    NewObjectsDone { tracked: Vec<TrackSummary> },
}

impl TrackerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            TrackerEvent::Inited => "tracker-inited",
            TrackerEvent::Processed { .. } => "tracker-processed",
            TrackerEvent::Dropped { .. } => "tracker-dropped",
            TrackerEvent::NewObjectsDone { .. } => "tracker-new-objects-done",
        }
    }
}

/// Orchestrator -> detection worker
#[derive(Debug, Clone)]
pub enum DetectorCommand {
    /// Classify `frame`, reporting to room `code` when set
    Process { frame: Frame, code: Option<String> },
}

impl DetectorCommand {
    pub fn kind(&self) -> &'static str {
        match self {
            DetectorCommand::Process { .. } => "detector-process",
        }
    }
}

/// Detection worker -> orchestrator
#[derive(Debug, Clone)]
pub enum DetectorEvent {
    Inited,
    /// Confident detections for the last frame, possibly empty
    Processed { detections: Vec<Detection> },
}

impl DetectorEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            DetectorEvent::Inited => "detector-inited",
            DetectorEvent::Processed { .. } => "detector-processed",
        }
    }
}

/// Orchestrator's end of a worker: command sender, event receiver and task
pub struct WorkerChannels<C, E> {
    pub commands: mpsc::UnboundedSender<C>,
    pub events: mpsc::UnboundedReceiver<E>,
    pub task: JoinHandle<()>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        let frame = Frame::new(2, 2);
        assert_eq!(TrackerCommand::Reset.kind(), "tracker-reset");
        assert_eq!(
            TrackerCommand::Process { frame: frame.clone() }.kind(),
            "tracker-process"
        );
        assert_eq!(
            TrackerEvent::NewObjectsDone { tracked: vec![] }.kind(),
            "tracker-new-objects-done"
        );
        assert_eq!(
            DetectorCommand::Process { frame, code: None }.kind(),
            "detector-process"
        );
        assert_eq!(
            DetectorEvent::Processed { detections: vec![] }.kind(),
            "detector-processed"
        );
    }
}

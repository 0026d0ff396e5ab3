//! Pipeline orchestration
//!
//! Drives the tracking and detection workers from the latest camera frame.
//! Each worker has exactly one command in flight; a reply triggers the next
//! command. Detection batches wait in a single pending slot (last wins) until
//! the tracker finishes its current frame.

use crate::display::FrameSink;
use crate::error::VisionError;
use crate::messages::{DetectorCommand, DetectorEvent, TrackerCommand, TrackerEvent, WorkerChannels};
use crate::vision::Frame;
use drishti_core::{Detection, TrackSummary};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Orchestrator-side view of the pipeline
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineSnapshot {
    /// Last confident detection batch
    pub recognized: Vec<Detection>,
    /// Objects the tracking worker reported after its last reconciliation
    pub tracked: Vec<TrackSummary>,
    pub frames_rendered: u64,
    pub frames_dropped: u64,
}

enum Control {
    Reset,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrackerPhase {
    /// `Start` not sent yet, or the last one failed
    Idle,
    /// `Start` in flight
    Starting,
    Running,
}

enum Step {
    Control(Option<Control>),
    Tracker(Option<TrackerEvent>),
    Detector(Option<DetectorEvent>),
    FrameReady(bool),
}

pub struct Orchestrator<S: FrameSink> {
    frames: watch::Receiver<Option<Frame>>,
    sink: S,
    tracker: WorkerChannels<TrackerCommand, TrackerEvent>,
    detector: WorkerChannels<DetectorCommand, DetectorEvent>,
    session_code: Option<String>,
    state: Arc<RwLock<PipelineSnapshot>>,
    pending: Option<Vec<Detection>>,
    tracker_phase: TrackerPhase,
    tracker_waiting: bool,
    detector_waiting: bool,
    /// Bumped on every reset
    generation: u64,
    /// Generation at which the in-flight `NewObjects` was sent
    reconcile_generation: Option<u64>,
}

impl<S: FrameSink> Orchestrator<S> {
    pub fn new(
        frames: watch::Receiver<Option<Frame>>,
        sink: S,
        tracker: WorkerChannels<TrackerCommand, TrackerEvent>,
        detector: WorkerChannels<DetectorCommand, DetectorEvent>,
    ) -> Self {
        Self {
            frames,
            sink,
            tracker,
            detector,
            session_code: None,
            state: Arc::new(RwLock::new(PipelineSnapshot::default())),
            pending: None,
            tracker_phase: TrackerPhase::Idle,
            tracker_waiting: false,
            detector_waiting: false,
            generation: 0,
            reconcile_generation: None,
        }
    }

    /// Room that detections are reported to
    pub fn with_session_code(mut self, code: Option<String>) -> Self {
        self.session_code = code;
        self
    }

    /// Run the loop as a background task
    pub fn spawn(self) -> OrchestratorHandle {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let state = Arc::clone(&self.state);
        let task = tokio::spawn(self.run(control_rx));

        OrchestratorHandle {
            control: control_tx,
            state,
            task,
        }
    }

    async fn run(mut self, mut control: mpsc::UnboundedReceiver<Control>) {
        info!("Pipeline started (room: {})", self.session_code.as_deref().unwrap_or("none"));

        loop {
            let waiting = self.tracker_waiting || self.detector_waiting;
            let step = tokio::select! {
                message = control.recv() => Step::Control(message),
                event = self.tracker.events.recv() => Step::Tracker(event),
                event = self.detector.events.recv() => Step::Detector(event),
                changed = self.frames.changed(), if waiting => Step::FrameReady(changed.is_ok()),
            };

            match step {
                Step::Control(Some(Control::Reset)) => self.reset(),
                Step::Control(Some(Control::Shutdown)) | Step::Control(None) => break,
                Step::Tracker(Some(event)) => self.on_tracker_event(event),
                Step::Detector(Some(event)) => self.on_detector_event(event),
                Step::Tracker(None) => {
                    warn!("Tracking worker stopped unexpectedly");
                    break;
                }
                Step::Detector(None) => {
                    warn!("Detection worker stopped unexpectedly");
                    break;
                }
                Step::FrameReady(true) => self.dispatch_waiting(),
                Step::FrameReady(false) => {
                    info!("Frame source closed");
                    break;
                }
            }
        }

        let Orchestrator { tracker, detector, .. } = self;
        drop(tracker.commands);
        drop(detector.commands);
        // An in-flight classification has no timeout by default
        detector.task.abort();
        if let Err(e) = tracker.task.await {
            warn!("Tracking worker ended abnormally: {}", e);
        }
        info!("Pipeline stopped");
    }

    fn on_tracker_event(&mut self, event: TrackerEvent) {
        debug!("[orchestrator] {}", event.kind());
        match event {
            TrackerEvent::Inited => self.start_tracker(),
            TrackerEvent::Processed { frame } => {
                if let Err(e) = self.sink.show(&frame) {
                    warn!("Failed to display frame: {}", e);
                }
                self.state.write().frames_rendered += 1;
                if self.tracker_phase == TrackerPhase::Starting {
                    // The readiness `NewObjectsDone` follows
                    self.tracker_phase = TrackerPhase::Running;
                } else {
                    self.after_tracker_frame();
                }
            }
            TrackerEvent::Dropped { reason } => {
                debug!("Tracker dropped a frame: {}", reason);
                self.state.write().frames_dropped += 1;
                if self.tracker_phase == TrackerPhase::Starting {
                    warn!("Tracker failed to start, retrying on the next frame");
                    self.tracker_phase = TrackerPhase::Idle;
                    self.tracker_waiting = true;
                } else {
                    self.after_tracker_frame();
                }
            }
            TrackerEvent::NewObjectsDone { tracked } => {
                match self.reconcile_generation.take() {
                    Some(generation) if generation == self.generation => {
                        self.state.write().tracked = tracked;
                    }
                    Some(_) => debug!("Ignoring reconciliation from before reset"),
                    None => debug!("Tracker ready for detections"),
                }
                self.request_tracker_frame();
            }
        }
    }

    fn on_detector_event(&mut self, event: DetectorEvent) {
        debug!("[orchestrator] {}", event.kind());
        if let DetectorEvent::Processed { detections } = event {
            if !detections.is_empty() {
                info!("Recognized {} objects", detections.len());
                self.pending = Some(detections.clone());
            }
            self.state.write().recognized = detections;
        }
        self.request_detection();
    }

    fn start_tracker(&mut self) {
        let latest = self.frames.borrow_and_update().clone();
        let Some(frame) = latest else {
            self.tracker_waiting = true;
            return;
        };

        self.tracker_phase = TrackerPhase::Starting;
        let (width, height) = frame.dimensions();
        self.send_tracker(TrackerCommand::Start { width, height, frame });
    }

    /// Hand over the pending batch if there is one, otherwise ask for the next frame
    fn after_tracker_frame(&mut self) {
        let Some(detections) = self.pending.take() else {
            self.request_tracker_frame();
            return;
        };

        let latest = self.frames.borrow().clone();
        let Some(frame) = latest else {
            self.request_tracker_frame();
            return;
        };

        self.reconcile_generation = Some(self.generation);
        self.send_tracker(TrackerCommand::NewObjects { frame, detections });
    }

    /// Process the next unseen frame, or wait for one
    fn request_tracker_frame(&mut self) {
        let fresh = self.frames.has_changed().unwrap_or(false);
        if !fresh {
            self.tracker_waiting = true;
            return;
        }
        self.process_latest_frame();
    }

    fn process_latest_frame(&mut self) {
        let latest = self.frames.borrow_and_update().clone();
        match latest {
            Some(frame) => self.send_tracker(TrackerCommand::Process { frame }),
            None => self.tracker_waiting = true,
        }
    }

    fn request_detection(&mut self) {
        let latest = self.frames.borrow().clone();
        let Some(frame) = latest else {
            self.detector_waiting = true;
            return;
        };

        let command = DetectorCommand::Process {
            frame,
            code: self.session_code.clone(),
        };
        if self.detector.commands.send(command).is_err() {
            debug!("Detection worker is gone");
        }
    }

    /// `changed()` already marked the new frame as seen
    fn dispatch_waiting(&mut self) {
        if std::mem::take(&mut self.tracker_waiting) {
            if self.tracker_phase == TrackerPhase::Running {
                self.process_latest_frame();
            } else {
                self.start_tracker();
            }
        }

        if std::mem::take(&mut self.detector_waiting) {
            self.request_detection();
        }
    }

    fn send_tracker(&mut self, command: TrackerCommand) {
        if self.tracker.commands.send(command).is_err() {
            debug!("Tracking worker is gone");
        }
    }

    fn reset(&mut self) {
        info!("Resetting recognized and tracked objects");
        self.generation += 1;
        self.pending = None;
        {
            let mut state = self.state.write();
            state.recognized.clear();
            state.tracked.clear();
        }
        self.send_tracker(TrackerCommand::Reset);
    }
}

/// Control side of a running orchestrator
pub struct OrchestratorHandle {
    control: mpsc::UnboundedSender<Control>,
    state: Arc<RwLock<PipelineSnapshot>>,
    task: JoinHandle<()>,
}

impl OrchestratorHandle {
    /// Forget every recognized and tracked object
    pub fn reset(&self) -> Result<(), VisionError> {
        self.control
            .send(Control::Reset)
            .map_err(|_| VisionError::Channel("orchestrator stopped".to_string()))
    }

    pub fn snapshot(&self) -> PipelineSnapshot {
        self.state.read().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the loop and both workers
    pub async fn shutdown(self) -> Result<(), VisionError> {
        let _ = self.control.send(Control::Shutdown);
        self.task
            .await
            .map_err(|e| VisionError::Processing(format!("orchestrator task failed: {}", e)))
    }
}

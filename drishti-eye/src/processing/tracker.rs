//! CamShift multi-object tracking
//!
//! Every tracked object keeps the hue histogram of the region it was adopted
//! from and a search window that follows it from frame to frame.

use crate::error::VisionError;
use crate::messages::{TrackerCommand, TrackerEvent, WorkerChannels};
use crate::vision::{Frame, VisionBackend};
use drishti_core::{untracked, Detection, Rect, TrackSummary};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Object followed across frames
#[derive(Debug, Clone)]
pub struct TrackedObject<H> {
    pub label: String,
    pub histogram: H,
    /// Search window for the next frame
    pub region: Rect,
}

/// Tracker state, owned by the tracking worker
pub struct ObjectTracker<B: VisionBackend> {
    backend: B,
    geometry: Option<(u32, u32)>,
    tracked: Vec<TrackedObject<B::Histogram>>,
}

impl<B: VisionBackend> ObjectTracker<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            geometry: None,
            tracked: Vec::new(),
        }
    }

    /// Prepare working buffers for `width` x `height` and process the first frame
    pub fn start(&mut self, width: u32, height: u32, frame: Frame) -> Result<Frame, VisionError> {
        self.backend.prepare(width, height)?;
        self.geometry = Some((width, height));
        info!("Tracker started at {}x{}", width, height);
        self.process(frame)
    }

    /// Advance every tracked object and draw it onto the frame.
    ///
    /// Search windows are only committed once every object has been located,
    /// so a failure leaves the tracked set exactly as it was.
    pub fn process(&mut self, mut frame: Frame) -> Result<Frame, VisionError> {
        self.ensure_geometry(frame.width(), frame.height())?;
        if self.tracked.is_empty() {
            return Ok(frame);
        }

        self.backend.begin_frame(&frame)?;

        let mut windows = Vec::with_capacity(self.tracked.len());
        for object in &self.tracked {
            let (rotated, window) = self.backend.locate(&object.histogram, object.region)?;
            self.backend.annotate(&mut frame, &rotated, &object.label)?;
            windows.push(window);
        }

        for (object, window) in self.tracked.iter_mut().zip(windows) {
            // A collapsed window cannot seed the next search
            if !window.is_empty() {
                object.region = window;
            } else {
                debug!("Keeping previous window for '{}'", object.label);
            }
        }

        Ok(frame)
    }

    /// Adopt every detection that no tracked object already covers.
    /// Returns the tracked set afterwards.
    pub fn reconcile_new(&mut self, frame: &Frame, detections: &[Detection]) -> Vec<TrackSummary> {
        let regions: Vec<Rect> = self.tracked.iter().map(|object| object.region).collect();

        for detection in untracked(&regions, detections) {
            let Some(region) = detection.region.clamp_to(frame.width(), frame.height()) else {
                warn!("Detection '{}' lies outside the frame, skipping", detection.label);
                continue;
            };

            match self.backend.region_histogram(frame, region) {
                Ok(histogram) => {
                    debug!("Tracking '{}' at {:?}", detection.label, region);
                    self.tracked.push(TrackedObject {
                        label: detection.label.clone(),
                        histogram,
                        region,
                    });
                }
                Err(e) => warn!("Could not build histogram for '{}': {}", detection.label, e),
            }
        }

        self.summaries()
    }

    /// Forget every tracked object
    pub fn reset(&mut self) {
        if !self.tracked.is_empty() {
            info!("Tracker reset, dropping {} objects", self.tracked.len());
        }
        self.tracked.clear();
    }

    pub fn summaries(&self) -> Vec<TrackSummary> {
        self.tracked
            .iter()
            .map(|object| TrackSummary {
                label: object.label.clone(),
                region: object.region,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tracked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }

    fn ensure_geometry(&mut self, width: u32, height: u32) -> Result<(), VisionError> {
        match self.geometry {
            None => Err(VisionError::Processing("tracker not started".to_string())),
            Some(geometry) if geometry == (width, height) => Ok(()),
            Some(_) => {
                debug!("Frame geometry changed to {}x{}", width, height);
                self.backend.prepare(width, height)?;
                self.geometry = Some((width, height));
                Ok(())
            }
        }
    }
}

/// Run the tracker on a blocking worker thread
pub fn spawn_tracker<B: VisionBackend>(backend: B) -> WorkerChannels<TrackerCommand, TrackerEvent> {
    let (command_tx, mut command_rx) = mpsc::unbounded_channel::<TrackerCommand>();
    let (event_tx, event_rx) = mpsc::unbounded_channel::<TrackerEvent>();

    let task = tokio::task::spawn_blocking(move || {
        let mut tracker = ObjectTracker::new(backend);
        if event_tx.send(TrackerEvent::Inited).is_err() {
            return;
        }

        while let Some(command) = command_rx.blocking_recv() {
            debug!("[tracker] {}", command.kind());
            let replies = handle_command(&mut tracker, command);
            if replies.into_iter().any(|event| event_tx.send(event).is_err()) {
                break;
            }
        }

        debug!("Tracking worker stopped");
    });

    WorkerChannels {
        commands: command_tx,
        events: event_rx,
        task,
    }
}

/// Replies to one command, in order. A successful `Start` is followed by
/// `NewObjectsDone` to signal readiness for detections.
fn handle_command<B: VisionBackend>(tracker: &mut ObjectTracker<B>, command: TrackerCommand) -> Vec<TrackerEvent> {
    match command {
        TrackerCommand::Start { width, height, frame } => match tracker.start(width, height, frame) {
            Ok(frame) => vec![
                TrackerEvent::Processed { frame },
                TrackerEvent::NewObjectsDone {
                    tracked: tracker.summaries(),
                },
            ],
            Err(e) => vec![dropped(e)],
        },
        TrackerCommand::Process { frame } => match tracker.process(frame) {
            Ok(frame) => vec![TrackerEvent::Processed { frame }],
            Err(e) => vec![dropped(e)],
        },
        TrackerCommand::NewObjects { frame, detections } => {
            let tracked = tracker.reconcile_new(&frame, &detections);
            vec![TrackerEvent::NewObjectsDone { tracked }]
        }
        TrackerCommand::Reset => {
            tracker.reset();
            Vec::new()
        }
    }
}

fn dropped(error: VisionError) -> TrackerEvent {
    warn!("Dropping frame: {}", error);
    TrackerEvent::Dropped {
        reason: error.to_string(),
    }
}

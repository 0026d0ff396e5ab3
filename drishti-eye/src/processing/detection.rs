//! Remote object detection
//!
//! Encodes the latest frame, asks the classifier for boxes, keeps the
//! confident ones and reports them to the relay room without waiting.

use crate::classifier::{encode_jpeg, Classifier};
use crate::messages::{DetectorCommand, DetectorEvent, WorkerChannels};
use crate::relay::RelayPublisher;
use crate::vision::Frame;
use chrono::Utc;
use drishti_api::DetectionBatch;
use drishti_core::{filter_confident, Detection, RECOGNITION_THRESHOLD};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub struct DetectionWorker<C: Classifier> {
    classifier: C,
    publisher: Option<Arc<dyn RelayPublisher>>,
    threshold: f32,
    jpeg_quality: u8,
}

impl<C: Classifier> DetectionWorker<C> {
    pub fn new(classifier: C) -> Self {
        Self {
            classifier,
            publisher: None,
            threshold: RECOGNITION_THRESHOLD,
            jpeg_quality: 85,
        }
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn RelayPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }

    /// Classify `frame`. Every failure yields an empty list.
    pub async fn process(&self, frame: &Frame, code: Option<&str>) -> Vec<Detection> {
        let captured_at = Utc::now().timestamp_millis();

        let image = match encode_jpeg(frame, self.jpeg_quality) {
            Ok(image) => image,
            Err(e) => {
                warn!("Failed to encode frame: {}", e);
                return Vec::new();
            }
        };

        let response = match self.classifier.classify(image, code.map(str::to_string)).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Classification failed: {}", e);
                return Vec::new();
            }
        };

        if !response.is_success() {
            debug!("Classifier answered '{}'", response.result);
            return Vec::new();
        }

        let detections = filter_confident(&response.classified, self.threshold);
        if detections.is_empty() {
            return detections;
        }

        if let (Some(publisher), Some(code)) = (&self.publisher, code) {
            let mut classified = response.classified;
            classified.retain(|b| b.confidence >= self.threshold);
            let batch = DetectionBatch {
                result: response.result,
                classified,
                captured_at: Some(captured_at),
                timestamp: None,
            };

            match batch.into_publish(code) {
                Ok(request) => {
                    let publisher = Arc::clone(publisher);
                    tokio::spawn(async move {
                        if let Err(e) = publisher.publish(request).await {
                            warn!("Failed to publish detections: {}", e);
                        }
                    });
                }
                Err(e) => warn!("Failed to build publish request: {}", e),
            }
        }

        detections
    }
}

/// Run the detection worker as a background task
pub fn spawn_detector<C: Classifier + 'static>(
    worker: DetectionWorker<C>,
) -> WorkerChannels<DetectorCommand, DetectorEvent> {
    let (command_tx, mut command_rx) = mpsc::unbounded_channel::<DetectorCommand>();
    let (event_tx, event_rx) = mpsc::unbounded_channel::<DetectorEvent>();

    let task = tokio::spawn(async move {
        if event_tx.send(DetectorEvent::Inited).is_err() {
            return;
        }

        while let Some(command) = command_rx.recv().await {
            debug!("[detector] {}", command.kind());
            let DetectorCommand::Process { frame, code } = command;
            let detections = worker.process(&frame, code.as_deref()).await;
            if event_tx.send(DetectorEvent::Processed { detections }).is_err() {
                break;
            }
        }

        debug!("Detection worker stopped");
    });

    WorkerChannels {
        commands: command_tx,
        events: event_rx,
        task,
    }
}

// Camera pipeline against a live relay
// Classification upload, detection publishing and the orchestrated worker loop

mod common;

use common::*;
use drishti_api::ServerMessage;
use drishti_core::{Rect, RotatedBox};
use drishti_eye::display::WatchSink;
use drishti_eye::processing::{spawn_detector, spawn_tracker};
use drishti_eye::{
    Classifier, DetectionWorker, Frame, HttpClassifier, HttpRelayPublisher, Orchestrator, RoomClient,
    VisionBackend, VisionError,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Objects stay where they were first seen
struct StillBackend;

impl VisionBackend for StillBackend {
    type Histogram = ();

    fn prepare(&mut self, _width: u32, _height: u32) -> Result<(), VisionError> {
        Ok(())
    }

    fn begin_frame(&mut self, _frame: &Frame) -> Result<(), VisionError> {
        Ok(())
    }

    fn region_histogram(&mut self, _frame: &Frame, _region: Rect) -> Result<(), VisionError> {
        Ok(())
    }

    fn locate(&mut self, _histogram: &(), window: Rect) -> Result<(RotatedBox, Rect), VisionError> {
        Ok((RotatedBox::from(window), window))
    }

    fn annotate(&mut self, frame: &mut Frame, _rotated: &RotatedBox, _label: &str) -> Result<(), VisionError> {
        frame.put_pixel(0, 0, image::Rgba([255, 0, 0, 255]));
        Ok(())
    }
}

// ============================================================================
// Classifier Upload Tests
// ============================================================================

#[tokio::test]
async fn test_classifier_uploads_jpeg_through_relay() {
    let (upstream, seen) = spawn_classifier(confident_reply("mug")).await;
    let (addr, _state) = spawn_relay("http://127.0.0.1:9/none").await;
    let mut dashboard = ws_connect(addr).await;
    join(&mut dashboard, "cam", &upstream, "/detect").await;

    let classifier = HttpClassifier::new(&format!("http://{}", addr), Some(Duration::from_secs(5))).unwrap();
    let image = drishti_eye::classifier::encode_jpeg(&Frame::new(32, 24), 80).unwrap();
    let response = classifier.classify(image, Some("cam".to_string())).await.unwrap();

    assert!(response.is_success());
    assert_eq!(response.classified.len(), 2);

    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].path, "/detect");
    assert!(seen[0]
        .content_type
        .as_deref()
        .unwrap()
        .starts_with("multipart/form-data"));
    let body = seen[0].body_text();
    assert!(body.contains(r#"name="files""#));
    assert!(body.contains(r#"filename="file.jpeg""#));
    assert!(body.contains("image/jpeg"));
}

#[tokio::test]
async fn test_classifier_error_status_is_error() {
    let (addr, _state) = spawn_relay("http://127.0.0.1:9/none").await;
    let classifier = HttpClassifier::new(&format!("http://{}", addr), Some(Duration::from_secs(5))).unwrap();

    let result = classifier.classify(vec![0xff, 0xd8], None).await;
    assert!(result.is_err());
}

// ============================================================================
// Detection Publishing Tests
// ============================================================================

#[tokio::test]
async fn test_detections_published_to_room() {
    let (upstream, _seen) = spawn_classifier(confident_reply("mug")).await;
    let (addr, _state) = spawn_relay(&format!("{}/default", upstream)).await;
    let relay_url = format!("http://{}", addr);
    let mut watcher = ws_connect(addr).await;
    join(&mut watcher, "cam", "", "").await;

    let worker = DetectionWorker::new(HttpClassifier::new(&relay_url, None).unwrap())
        .with_publisher(Arc::new(HttpRelayPublisher::new(&relay_url, None).unwrap()));
    let detections = worker.process(&Frame::new(64, 48), Some("cam")).await;

    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0].label, "mug");
    assert_eq!(detections[0].region, Rect::new(8, 8, 32, 32));

    match next_event(&mut watcher, Duration::from_secs(5)).await {
        Some(ServerMessage::AddRecognize(batches)) => {
            let batch = &batches[0];
            assert_eq!(batch["result"], "success");
            assert_eq!(batch["classified"].as_array().unwrap().len(), 1);
            assert_eq!(batch["classified"][0]["label"], "mug");
            assert!(batch["captured_at"].is_i64());
            assert!(batch["timestamp"].as_i64().unwrap() >= batch["captured_at"].as_i64().unwrap());
        }
        other => panic!("expected addRecognize, got {:?}", other),
    }
}

#[tokio::test]
async fn test_nothing_published_without_code() {
    let (upstream, _seen) = spawn_classifier(confident_reply("mug")).await;
    let (addr, _state) = spawn_relay(&format!("{}/default", upstream)).await;
    let relay_url = format!("http://{}", addr);
    let mut watcher = ws_connect(addr).await;
    join(&mut watcher, "cam", "", "").await;

    let worker = DetectionWorker::new(HttpClassifier::new(&relay_url, None).unwrap())
        .with_publisher(Arc::new(HttpRelayPublisher::new(&relay_url, None).unwrap()));
    let detections = worker.process(&Frame::new(64, 48), None).await;

    assert_eq!(detections.len(), 1);
    assert!(next_event(&mut watcher, Duration::from_millis(300)).await.is_none());
}

// ============================================================================
// Room Client Tests
// ============================================================================

#[tokio::test]
async fn test_room_client_registers_endpoint() {
    let (addr, state) = spawn_relay("http://127.0.0.1:9/none").await;
    let mut room = RoomClient::connect(&format!("http://{}", addr)).await.unwrap();

    room.join("cam", "https://vision.local", "/api/cam").unwrap();
    room.request_rooms().unwrap();

    match tokio::time::timeout(Duration::from_secs(5), room.next_event()).await.unwrap() {
        Some(ServerMessage::GetRooms { rooms }) => assert_eq!(rooms["cam"].len(), 1),
        other => panic!("expected getRooms, got {:?}", other),
    }
    assert_eq!(
        state.rooms.target_for("cam").as_deref(),
        Some("https://vision.local/api/cam")
    );

    drop(room);
    assert!(eventually(|| state.rooms.target_for("cam").is_none()).await);
}

// ============================================================================
// Orchestrated Pipeline Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pipeline_tracks_and_publishes() {
    let (upstream, seen) = spawn_classifier(confident_reply("mug")).await;
    let (addr, _state) = spawn_relay(&format!("{}/default", upstream)).await;
    let relay_url = format!("http://{}", addr);
    let mut watcher = ws_connect(addr).await;
    join(&mut watcher, "cam", "", "").await;

    let detector = spawn_detector(
        DetectionWorker::new(HttpClassifier::new(&relay_url, None).unwrap())
            .with_publisher(Arc::new(HttpRelayPublisher::new(&relay_url, None).unwrap())),
    );
    let tracker = spawn_tracker(StillBackend);
    let (frame_tx, frame_rx) = watch::channel(None);
    let (sink, preview) = WatchSink::new();
    let handle = Orchestrator::new(frame_rx, sink, tracker, detector)
        .with_session_code(Some("cam".to_string()))
        .spawn();

    let feeder = tokio::spawn(async move {
        while frame_tx.send(Some(Frame::new(64, 48))).is_ok() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    });

    assert!(matches!(
        next_event(&mut watcher, Duration::from_secs(5)).await,
        Some(ServerMessage::AddRecognize(_))
    ));

    let mut tracked = false;
    for _ in 0..300 {
        let snapshot = handle.snapshot();
        if snapshot.tracked.len() == 1 && snapshot.frames_rendered > 1 {
            assert_eq!(snapshot.tracked[0].label, "mug");
            assert_eq!(snapshot.recognized.len(), 1);
            tracked = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(tracked);

    // Frames rendered after adoption carry the annotation
    let annotated = eventually(|| {
        preview
            .borrow()
            .as_ref()
            .map(|frame| frame.get_pixel(0, 0).0 == [255, 0, 0, 255])
            .unwrap_or(false)
    })
    .await;
    assert!(annotated);
    assert!(!seen.lock().is_empty());

    handle.shutdown().await.unwrap();
    feeder.abort();
}

// Drishti camera pipeline
// Tracks objects on the local webcam and reports classifier detections to a relay room

use anyhow::Context;
use clap::Parser;
use drishti_core::DrishtiConfig;
use drishti_eye::backend::{OpenCvBackend, WindowSink};
use drishti_eye::camera::CameraManager;
use drishti_eye::display::{FrameSink, NullSink};
use drishti_eye::messages::{DetectorCommand, DetectorEvent, TrackerCommand, TrackerEvent, WorkerChannels};
use drishti_eye::processing::{spawn_detector, spawn_tracker, DetectionWorker};
use drishti_eye::{Frame, HttpClassifier, HttpRelayPublisher, Orchestrator, OrchestratorHandle, RoomClient};
use drishti_api::ServerMessage;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "drishti-eye", version, about = "Webcam object tracking with a remote classifier")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Capture device index
    #[arg(long)]
    camera: Option<u32>,

    /// Relay server base URL
    #[arg(long)]
    relay_url: Option<String>,

    /// Room (session code) to report detections to
    #[arg(long)]
    code: Option<String>,

    /// Register this classifier base URL for the session room over the relay socket
    #[arg(long)]
    classifier_url: Option<String>,

    /// Path appended to --classifier-url
    #[arg(long, default_value = "")]
    classifier_endpoint: String,

    /// Run without a preview window
    #[arg(long)]
    headless: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => DrishtiConfig::from_file(path)?.with_env(),
        None => DrishtiConfig::from_env(),
    };
    if let Some(camera) = args.camera {
        config.eye.camera_id = camera;
    }
    if let Some(url) = &args.relay_url {
        config.eye.relay_url = url.clone();
    }
    if let Some(code) = &args.code {
        config.eye.session_code = Some(code.clone()).filter(|c| !c.is_empty());
    }
    config.validate()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    if config.mode.is_production() {
        info!("🚀 Starting drishti-eye in production mode");
    } else {
        info!("🚀 Starting drishti-eye in development mode");
    }

    let eye = config.eye.clone();

    let camera = CameraManager::new(eye.clone());
    let frames = match camera.start_stream() {
        Ok(frames) => frames,
        Err(e) => {
            // Without a camera the pipeline stays inert
            error!("❌ Camera unavailable: {}", e);
            wait_for_shutdown().await;
            return Ok(());
        }
    };

    let room_events = match (&eye.session_code, &args.classifier_url) {
        (Some(code), Some(url)) => Some(register_room(&eye.relay_url, code, url, &args.classifier_endpoint).await?),
        (None, Some(url)) => {
            warn!("No session code configured, not registering classifier {}", url);
            None
        }
        _ => None,
    };

    let timeout = eye.classifier_timeout_ms.map(Duration::from_millis);
    let classifier = HttpClassifier::new(&eye.relay_url, timeout)?;
    let publisher = Arc::new(HttpRelayPublisher::new(&eye.relay_url, timeout)?);
    info!("📡 Classifying through {}", classifier.url());

    let detector = spawn_detector(
        DetectionWorker::new(classifier)
            .with_publisher(publisher)
            .with_threshold(eye.recognition_threshold)
            .with_jpeg_quality(eye.jpeg_quality),
    );
    let tracker = spawn_tracker(OpenCvBackend::new()?);

    let handle = if args.headless {
        start_pipeline(frames, NullSink, tracker, detector, eye.session_code.clone())
    } else {
        let window = WindowSink::new("drishti").context("failed to open preview window")?;
        start_pipeline(frames, window, tracker, detector, eye.session_code.clone())
    };
    info!("✅ Pipeline running; type 'reset' and Enter to forget tracked objects");

    if let Some(mut room) = room_events {
        tokio::spawn(async move {
            while let Some(event) = room.next_event().await {
                if let ServerMessage::AddRecognize(batches) = event {
                    info!("Room received {} detection batch(es)", batches.len());
                }
            }
        });
    }

    let handle = Arc::new(handle);
    let control = Arc::clone(&handle);
    let console = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match line.trim() {
                "r" | "reset" => {
                    if let Err(e) = control.reset() {
                        warn!("Reset failed: {}", e);
                    }
                }
                "" => {}
                other => warn!("Unknown command '{}'", other),
            }
        }
    });

    wait_for_shutdown().await;
    camera.stop();
    console.abort();
    let _ = console.await;

    match Arc::try_unwrap(handle) {
        Ok(handle) => handle.shutdown().await?,
        Err(_) => warn!("Pipeline still referenced, exiting without waiting"),
    }

    info!("👋 drishti-eye stopped");
    Ok(())
}

fn start_pipeline<S: FrameSink>(
    frames: watch::Receiver<Option<Frame>>,
    sink: S,
    tracker: WorkerChannels<TrackerCommand, TrackerEvent>,
    detector: WorkerChannels<DetectorCommand, DetectorEvent>,
    code: Option<String>,
) -> OrchestratorHandle {
    Orchestrator::new(frames, sink, tracker, detector)
        .with_session_code(code)
        .spawn()
}

async fn register_room(relay_url: &str, code: &str, url: &str, endpoint: &str) -> anyhow::Result<RoomClient> {
    let room = RoomClient::connect(relay_url).await?;
    room.join(code, url, endpoint)?;
    info!("🏠 Registered room '{}' with classifier {}{}", code, url, endpoint);
    Ok(room)
}

async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("🛑 Shutdown signal received");
}

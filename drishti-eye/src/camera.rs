//! USB webcam capture

use crate::backend::cv::frame_to_mat;
use crate::error::VisionError;
use crate::vision::Frame;
use drishti_core::EyeConfig;
use opencv::{
    core::Mat,
    imgproc,
    prelude::*,
    videoio::{VideoCapture, CAP_ANY, CAP_PROP_FPS, CAP_PROP_FRAME_HEIGHT, CAP_PROP_FRAME_WIDTH},
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Consecutive read failures before the stream gives up
const MAX_READ_ERRORS: u32 = 10;

/// Camera manager feeding the latest frame into a watch channel
pub struct CameraManager {
    config: EyeConfig,
    is_running: Arc<AtomicBool>,
}

impl CameraManager {
    pub fn new(config: EyeConfig) -> Self {
        Self {
            config,
            is_running: Arc::new(AtomicBool::new(false)),
        }
    }

    fn open(&self) -> Result<VideoCapture, VisionError> {
        let camera_id = self.config.camera_id as i32;
        let mut capture = VideoCapture::new(camera_id, CAP_ANY)
            .map_err(|e| VisionError::Camera(format!("Failed to open camera {}: {}", camera_id, e)))?;

        if !capture.is_opened()? {
            return Err(VisionError::Camera(format!("Camera {} failed to open", camera_id)));
        }

        let (width, height) = self.config.resolution;
        capture
            .set(CAP_PROP_FRAME_WIDTH, width as f64)
            .map_err(|e| VisionError::Camera(format!("Failed to set width: {}", e)))?;
        capture
            .set(CAP_PROP_FRAME_HEIGHT, height as f64)
            .map_err(|e| VisionError::Camera(format!("Failed to set height: {}", e)))?;
        capture
            .set(CAP_PROP_FPS, self.config.frame_rate as f64)
            .map_err(|e| VisionError::Camera(format!("Failed to set FPS: {}", e)))?;

        info!(
            "Camera {} initialized at {}x{} @ {}fps",
            camera_id, width, height, self.config.frame_rate
        );
        Ok(capture)
    }

    /// Open the camera and start capturing; older frames are overwritten
    pub fn start_stream(&self) -> Result<watch::Receiver<Option<Frame>>, VisionError> {
        if self.is_running.swap(true, Ordering::SeqCst) {
            return Err(VisionError::Camera("Camera stream already running".to_string()));
        }

        let mut capture = match self.open() {
            Ok(capture) => capture,
            Err(e) => {
                self.is_running.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        let (tx, rx) = watch::channel(None);
        let is_running = Arc::clone(&self.is_running);
        let frame_interval = Duration::from_secs_f64(1.0 / self.config.frame_rate.max(1) as f64);

        tokio::task::spawn_blocking(move || {
            let mut errors = 0u32;
            while is_running.load(Ordering::SeqCst) {
                let started = Instant::now();

                match read_frame(&mut capture) {
                    Ok(Some(frame)) => {
                        errors = 0;
                        if tx.send(Some(frame)).is_err() {
                            warn!("Frame receiver dropped, stopping camera stream");
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        errors += 1;
                        error!("Camera read error: {}", e);
                        if errors > MAX_READ_ERRORS {
                            error!("Too many camera read errors ({}), stopping stream", errors);
                            break;
                        }
                    }
                }

                let elapsed = started.elapsed();
                if elapsed < frame_interval {
                    std::thread::sleep(frame_interval - elapsed);
                }
            }

            is_running.store(false, Ordering::SeqCst);
            info!("Camera stream stopped");
        });

        info!("Camera stream started");
        Ok(rx)
    }

    pub fn stop(&self) {
        self.is_running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }
}

/// Read one BGR frame and convert it to RGBA; `None` when the device had nothing
fn read_frame(capture: &mut VideoCapture) -> Result<Option<Frame>, VisionError> {
    let mut bgr = Mat::default();
    if !capture.read(&mut bgr)? || bgr.empty() {
        return Ok(None);
    }

    let mut rgba = Mat::default();
    imgproc::cvt_color(&bgr, &mut rgba, imgproc::COLOR_BGR2RGBA, 0)?;
    let (width, height) = (rgba.cols() as u32, rgba.rows() as u32);
    let frame = Frame::from_raw(width, height, rgba.data_bytes()?.to_vec())
        .ok_or_else(|| VisionError::Camera("frame buffer size mismatch".to_string()))?;
    Ok(Some(frame))
}

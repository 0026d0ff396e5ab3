//! Seam between the tracker and the image-processing library

use crate::error::VisionError;
use drishti_core::{Rect, RotatedBox};

/// Raw RGBA frame as captured from the camera
pub type Frame = image::RgbaImage;

/// Colour-histogram tracking primitives
///
/// The tracker owns one backend inside its worker. `prepare` is called once
/// per frame geometry, `begin_frame` once per processed frame, before any
/// `locate` call for that frame.
pub trait VisionBackend: Send + 'static {
    /// Normalized hue histogram of a region
    type Histogram: Send + 'static;

    /// Allocate per-geometry working buffers
    fn prepare(&mut self, width: u32, height: u32) -> Result<(), VisionError>;

    /// Convert `frame` to the working colour space and refresh its mask
    fn begin_frame(&mut self, frame: &Frame) -> Result<(), VisionError>;

    /// Build the histogram used to follow `region` in later frames
    fn region_histogram(&mut self, frame: &Frame, region: Rect) -> Result<Self::Histogram, VisionError>;

    /// Run one CamShift step from `window` over the frame passed to `begin_frame`.
    /// Returns the rotated box for display and the next search window.
    fn locate(&mut self, histogram: &Self::Histogram, window: Rect) -> Result<(RotatedBox, Rect), VisionError>;

    /// Draw the rotated box and its label onto `frame`
    fn annotate(&mut self, frame: &mut Frame, rotated: &RotatedBox, label: &str) -> Result<(), VisionError>;
}

//! OpenCV implementation of the tracking primitives

use crate::display::FrameSink;
use crate::error::VisionError;
use crate::vision::{Frame, VisionBackend};
use drishti_core::{Rect, RotatedBox};
use opencv::{
    core::{self, Mat, Point, Scalar, TermCriteria, Vector},
    highgui,
    imgproc,
    prelude::*,
    video,
};
use tracing::debug;

/// Hue histogram bins over `[0, 180)`
const HUE_BINS: i32 = 180;

/// Drawing colour (RGBA red)
fn draw_color() -> Scalar {
    Scalar::new(255.0, 0.0, 0.0, 255.0)
}

fn mask_low() -> Scalar {
    Scalar::new(30.0, 30.0, 0.0, 0.0)
}

fn mask_high() -> Scalar {
    Scalar::new(180.0, 180.0, 180.0, 0.0)
}

/// Copy an RGBA frame into a continuous `CV_8UC4` matrix
pub fn frame_to_mat(frame: &Frame) -> Result<Mat, VisionError> {
    let mut mat = Mat::new_rows_cols_with_default(
        frame.height() as i32,
        frame.width() as i32,
        core::CV_8UC4,
        Scalar::all(0.0),
    )?;
    mat.data_bytes_mut()?.copy_from_slice(frame.as_raw());
    Ok(mat)
}

fn to_cv_rect(rect: Rect) -> core::Rect {
    core::Rect::new(rect.x, rect.y, rect.width, rect.height)
}

fn from_cv_rect(rect: core::Rect) -> Rect {
    Rect::new(rect.x, rect.y, rect.width, rect.height)
}

fn to_point((x, y): (f32, f32)) -> Point {
    Point::new(x.round() as i32, y.round() as i32)
}

/// HSV conversion plus the saturation/value mask used for histograms
fn hsv_with_mask(rgba: &Mat) -> Result<(Mat, Mat), VisionError> {
    let mut rgb = Mat::default();
    imgproc::cvt_color(rgba, &mut rgb, imgproc::COLOR_RGBA2RGB, 0)?;
    let mut hsv = Mat::default();
    imgproc::cvt_color(&rgb, &mut hsv, imgproc::COLOR_RGB2HSV, 0)?;
    let mut mask = Mat::default();
    core::in_range(&hsv, &mask_low(), &mask_high(), &mut mask)?;
    Ok((hsv, mask))
}

/// CamShift over hue back-projections
pub struct OpenCvBackend {
    hsv: Mat,
    mask: Mat,
    back_project: Mat,
    probability: Mat,
    criteria: TermCriteria,
    channels: Vector<i32>,
    ranges: Vector<f32>,
}

impl OpenCvBackend {
    pub fn new() -> Result<Self, VisionError> {
        // Stop after 10 iterations or when the window moves by less than a pixel
        let criteria = TermCriteria::new(
            core::TermCriteria_Type::COUNT as i32 + core::TermCriteria_Type::EPS as i32,
            10,
            1.0,
        )?;

        Ok(Self {
            hsv: Mat::default(),
            mask: Mat::default(),
            back_project: Mat::default(),
            probability: Mat::default(),
            criteria,
            channels: Vector::from_slice(&[0]),
            ranges: Vector::from_slice(&[0.0, HUE_BINS as f32]),
        })
    }
}

impl VisionBackend for OpenCvBackend {
    type Histogram = Mat;

    fn prepare(&mut self, width: u32, height: u32) -> Result<(), VisionError> {
        let (rows, cols) = (height as i32, width as i32);
        self.hsv = Mat::new_rows_cols_with_default(rows, cols, core::CV_8UC3, Scalar::all(0.0))?;
        self.mask = Mat::new_rows_cols_with_default(rows, cols, core::CV_8UC1, Scalar::all(0.0))?;
        self.back_project = Mat::new_rows_cols_with_default(rows, cols, core::CV_8UC1, Scalar::all(0.0))?;
        self.probability = Mat::new_rows_cols_with_default(rows, cols, core::CV_8UC1, Scalar::all(0.0))?;
        debug!("OpenCV buffers prepared for {}x{}", width, height);
        Ok(())
    }

    fn begin_frame(&mut self, frame: &Frame) -> Result<(), VisionError> {
        let rgba = frame_to_mat(frame)?;
        let (hsv, mask) = hsv_with_mask(&rgba)?;
        self.hsv = hsv;
        self.mask = mask;
        Ok(())
    }

    fn region_histogram(&mut self, frame: &Frame, region: Rect) -> Result<Mat, VisionError> {
        let rgba = frame_to_mat(frame)?;
        let roi = Mat::roi(&rgba, to_cv_rect(region))?.try_clone()?;
        let (hsv, mask) = hsv_with_mask(&roi)?;

        let mut histogram = Mat::default();
        imgproc::calc_hist(
            &hsv,
            &self.channels,
            &mask,
            &mut histogram,
            &Vector::from_slice(&[HUE_BINS]),
            &self.ranges,
            false,
        )?;

        let mut normalized = Mat::default();
        core::normalize(&histogram, &mut normalized, 0.0, 255.0, core::NORM_MINMAX, -1, &Mat::default())?;
        Ok(normalized)
    }

    fn locate(&mut self, histogram: &Mat, window: Rect) -> Result<(RotatedBox, Rect), VisionError> {
        imgproc::calc_back_project(
            &self.hsv,
            &self.channels,
            histogram,
            &mut self.back_project,
            &self.ranges,
            1.0,
        )?;
        core::bitwise_and(&self.back_project, &self.mask, &mut self.probability, &Mat::default())?;

        let mut search = to_cv_rect(window);
        let rotated = video::cam_shift(&self.probability, &mut search, self.criteria)?;

        Ok((
            RotatedBox {
                center: (rotated.center.x, rotated.center.y),
                size: (rotated.size.width, rotated.size.height),
                angle: rotated.angle,
            },
            from_cv_rect(search),
        ))
    }

    fn annotate(&mut self, frame: &mut Frame, rotated: &RotatedBox, label: &str) -> Result<(), VisionError> {
        let mut mat = frame_to_mat(frame)?;
        let corners = rotated.corners();

        for i in 0..corners.len() {
            let from = to_point(corners[i]);
            let to = to_point(corners[(i + 1) % corners.len()]);
            imgproc::line(&mut mat, from, to, draw_color(), 3, imgproc::LINE_8, 0)?;
        }
        imgproc::put_text(
            &mut mat,
            label,
            to_point(corners[3]),
            imgproc::FONT_HERSHEY_SIMPLEX,
            1.0,
            draw_color(),
            1,
            imgproc::LINE_8,
            false,
        )?;

        frame.copy_from_slice(mat.data_bytes()?);
        Ok(())
    }
}

/// Preview window, closed on drop
pub struct WindowSink {
    name: String,
}

impl WindowSink {
    pub fn new(name: impl Into<String>) -> Result<Self, VisionError> {
        let name = name.into();
        highgui::named_window(&name, highgui::WINDOW_AUTOSIZE)?;
        Ok(Self { name })
    }
}

impl FrameSink for WindowSink {
    fn show(&mut self, frame: &Frame) -> Result<(), VisionError> {
        let rgba = frame_to_mat(frame)?;
        let mut bgr = Mat::default();
        imgproc::cvt_color(&rgba, &mut bgr, imgproc::COLOR_RGBA2BGR, 0)?;
        highgui::imshow(&self.name, &bgr)?;
        highgui::wait_key(1)?;
        Ok(())
    }
}

impl Drop for WindowSink {
    fn drop(&mut self) {
        let _ = highgui::destroy_window(&self.name);
    }
}

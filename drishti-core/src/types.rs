// Shared data model for the camera pipeline and the relay

use serde::{Deserialize, Serialize};

/// Minimum classifier confidence for a box to be tracked or relayed
pub const RECOGNITION_THRESHOLD: f32 = 0.98;

/// Pixel region, top-left anchored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Center point of the region
    pub fn center(&self) -> (f64, f64) {
        (
            self.x as f64 + self.width as f64 / 2.0,
            self.y as f64 + self.height as f64 / 2.0,
        )
    }

    /// Mean of width and height
    pub fn average_size(&self) -> f64 {
        (self.width as f64 + self.height as f64) / 2.0
    }

    pub fn area(&self) -> i64 {
        self.width.max(0) as i64 * self.height.max(0) as i64
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Intersect with a `width` x `height` frame anchored at the origin.
    /// Returns `None` when nothing of the region lies inside the frame.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Rect> {
        let frame_w = i64::from(width);
        let frame_h = i64::from(height);
        let x0 = i64::from(self.x).clamp(0, frame_w);
        let y0 = i64::from(self.y).clamp(0, frame_h);
        let x1 = (i64::from(self.x) + i64::from(self.width)).clamp(0, frame_w);
        let y1 = (i64::from(self.y) + i64::from(self.height)).clamp(0, frame_h);

        let clamped = Rect::new(x0 as i32, y0 as i32, (x1 - x0) as i32, (y1 - y0) as i32);
        if clamped.is_empty() {
            None
        } else {
            Some(clamped)
        }
    }
}

/// One entry of a classifier response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedBox {
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
    pub confidence: f32,
    pub label: String,
}

/// Body returned by the remote classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierResponse {
    pub result: String,
    #[serde(default)]
    pub classified: Vec<ClassifiedBox>,
}

impl ClassifierResponse {
    pub fn is_success(&self) -> bool {
        self.result == "success"
    }
}

/// Classified object accepted from the classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub region: Rect,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f32, region: Rect) -> Self {
        Self {
            label: label.into(),
            confidence,
            region,
        }
    }

    /// Convert corner coordinates into a pixel region
    pub fn from_box(classified: &ClassifiedBox) -> Self {
        let region = Rect::new(
            classified.xmin.round() as i32,
            classified.ymin.round() as i32,
            (classified.xmax - classified.xmin).round() as i32,
            (classified.ymax - classified.ymin).round() as i32,
        );
        Self::new(classified.label.clone(), classified.confidence, region)
    }
}

/// Rotated box produced by the tracking primitive. Angle is in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RotatedBox {
    pub center: (f32, f32),
    pub size: (f32, f32),
    pub angle: f32,
}

impl RotatedBox {
    /// Corner points, in the same order OpenCV's `RotatedRect::points` yields them
    pub fn corners(&self) -> [(f32, f32); 4] {
        let radians = self.angle.to_radians();
        let b = radians.cos() * 0.5;
        let a = radians.sin() * 0.5;
        let (cx, cy) = self.center;
        let (w, h) = self.size;

        let p0 = (cx - a * h - b * w, cy + b * h - a * w);
        let p1 = (cx + a * h - b * w, cy - b * h - a * w);
        let p2 = (2.0 * cx - p0.0, 2.0 * cy - p0.1);
        let p3 = (2.0 * cx - p1.0, 2.0 * cy - p1.1);
        [p0, p1, p2, p3]
    }
}

impl From<Rect> for RotatedBox {
    fn from(rect: Rect) -> Self {
        let (cx, cy) = rect.center();
        Self {
            center: (cx as f32, cy as f32),
            size: (rect.width as f32, rect.height as f32),
            angle: 0.0,
        }
    }
}

/// Backend-free view of a tracked object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSummary {
    pub label: String,
    pub region: Rect,
}

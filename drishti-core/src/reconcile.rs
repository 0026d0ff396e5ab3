//! Decides which classifier detections start new tracks.
//!
//! A detection counts as already tracked when the center of any tracked
//! region lies closer to the detection's center than the detection's average
//! box size. Everything else is returned once, in input order.

use crate::types::{ClassifiedBox, Detection, Rect};

/// Detections that no tracked region claims
pub fn untracked<'a>(tracked: &[Rect], detections: &'a [Detection]) -> Vec<&'a Detection> {
    if detections.is_empty() {
        return Vec::new();
    }

    if tracked.is_empty() {
        return detections.iter().collect();
    }

    detections
        .iter()
        .filter(|detection| !is_tracked(tracked, &detection.region))
        .collect()
}

fn is_tracked(tracked: &[Rect], region: &Rect) -> bool {
    let (x, y) = region.center();
    let radius = region.average_size();

    tracked.iter().any(|candidate| {
        let (tx, ty) = candidate.center();
        let distance = ((x - tx).powi(2) + (y - ty).powi(2)).sqrt();
        distance < radius
    })
}

/// Keep boxes at or above `threshold` and convert them to detections
pub fn filter_confident(boxes: &[ClassifiedBox], threshold: f32) -> Vec<Detection> {
    boxes
        .iter()
        .filter(|b| b.confidence >= threshold)
        .map(Detection::from_box)
        .collect()
}

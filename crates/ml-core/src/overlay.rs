//! Read-time mapping of detector-space boxes onto a rendered frame.
//!
//! Boxes stay in the detector's square space; every render recomputes the
//! scale from the size the frame was actually drawn at.

use serde::Serialize;

use crate::detector::{DETECTOR_INPUT_SIZE, Detection};

/// Per-axis factors from detector space to screen space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScaleFactors {
    pub x: f32,
    pub y: f32,
}

impl ScaleFactors {
    pub const IDENTITY: ScaleFactors = ScaleFactors { x: 1.0, y: 1.0 };

    /// Factors for a frame rendered at `width` x `height`.
    ///
    /// Until both dimensions are real (finite and positive) the identity scale
    /// is used, so an unloaded image never divides by zero.
    pub fn for_render(width: f32, height: f32) -> Self {
        if !is_observed(width) || !is_observed(height) {
            return Self::IDENTITY;
        }
        Self {
            x: width / DETECTOR_INPUT_SIZE,
            y: height / DETECTOR_INPUT_SIZE,
        }
    }

    /// Scale `(x1, y1, x2, y2)` into screen space.
    pub fn apply(&self, bbox: [f32; 4]) -> [f32; 4] {
        [
            bbox[0] * self.x,
            bbox[1] * self.y,
            bbox[2] * self.x,
            bbox[3] * self.y,
        ]
    }

    /// Map a screen-space box back into detector space.
    pub fn invert(&self, bbox: [f32; 4]) -> [f32; 4] {
        [
            bbox[0] / self.x,
            bbox[1] / self.y,
            bbox[2] / self.x,
            bbox[3] / self.y,
        ]
    }
}

fn is_observed(dimension: f32) -> bool {
    dimension.is_finite() && dimension > 0.0
}

/// Screen rectangle for one detection, positioned relative to the rendered image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayRect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
    pub label: String,
    pub score: f32,
}

impl OverlayRect {
    /// Caption drawn above the box, e.g. `pothole (0.91)`.
    pub fn caption(&self) -> String {
        format!("{} ({:.2})", self.label, self.score)
    }
}

/// Lay `detections` over an image rendered at `rendered_width` x `rendered_height`.
pub fn map_boxes(
    detections: &[Detection],
    rendered_width: f32,
    rendered_height: f32,
) -> Vec<OverlayRect> {
    let scale = ScaleFactors::for_render(rendered_width, rendered_height);
    detections
        .iter()
        .map(|detection| {
            let [x1, y1, x2, y2] = scale.apply(detection.bbox);
            OverlayRect {
                left: x1,
                top: y1,
                width: x2 - x1,
                height: y2 - y1,
                label: detection.label.clone(),
                score: detection.score,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pothole() -> Detection {
        Detection::new([100.0, 100.0, 200.0, 200.0], "pothole", 0.91)
    }

    fn rect_tuple(rect: &OverlayRect) -> (f32, f32, f32, f32) {
        (rect.left, rect.top, rect.width, rect.height)
    }

    #[test]
    fn scales_each_axis_independently() {
        let rects = map_boxes(&[pothole(), pothole()], 640.0, 320.0);
        assert_eq!(rects.len(), 2);
        assert_eq!(rect_tuple(&rects[0]), (100.0, 50.0, 100.0, 50.0));
        assert_eq!(rect_tuple(&rects[1]), (100.0, 50.0, 100.0, 50.0));
    }

    #[test]
    fn half_size_square_render_halves_everything() {
        let rects = map_boxes(&[pothole()], 320.0, 320.0);
        assert_eq!(rect_tuple(&rects[0]), (50.0, 50.0, 50.0, 50.0));
        assert_eq!(rects[0].caption(), "pothole (0.91)");
    }

    #[test]
    fn unknown_dimensions_fall_back_to_identity() {
        for (w, h) in [(0.0, 0.0), (0.0, 480.0), (f32::NAN, 320.0), (-5.0, 10.0)] {
            let rects = map_boxes(&[pothole()], w, h);
            assert_eq!(rect_tuple(&rects[0]), (100.0, 100.0, 100.0, 100.0));
        }
    }

    #[test]
    fn recomputes_for_each_render_size() {
        let detections = [pothole()];
        let small = map_boxes(&detections, 320.0, 320.0);
        let large = map_boxes(&detections, 1280.0, 1280.0);
        assert_eq!(rect_tuple(&small[0]), (50.0, 50.0, 50.0, 50.0));
        assert_eq!(rect_tuple(&large[0]), (200.0, 200.0, 200.0, 200.0));
        assert_eq!(detections[0].bbox, [100.0, 100.0, 200.0, 200.0]);
    }

    #[test]
    fn scaling_is_reversible() {
        let original = [12.5, 40.0, 633.0, 600.25];
        for (w, h) in [(640.0, 320.0), (333.0, 777.0), (1.0, 1.0), (1920.0, 1080.0)] {
            let scale = ScaleFactors::for_render(w, h);
            let restored = scale.invert(scale.apply(original));
            for (a, b) in original.iter().zip(restored.iter()) {
                assert!((a - b).abs() < 1e-3, "{a} vs {b} at {w}x{h}");
            }
        }
    }

    #[test]
    fn empty_detections_produce_no_rects() {
        assert!(map_boxes(&[], 640.0, 640.0).is_empty());
    }
}

//! Detection records produced by the backend models and the read-time geometry
//! used to lay them over rendered frames.

pub mod detector;
pub mod overlay;

pub use detector::{DETECTOR_INPUT_SIZE, Detection, DetectionModel, UnknownModel};
pub use overlay::{OverlayRect, ScaleFactors, map_boxes};

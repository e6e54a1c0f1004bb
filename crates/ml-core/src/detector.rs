use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Side length of the square coordinate space every detector reports boxes in.
pub const DETECTOR_INPUT_SIZE: f32 = 640.0;

/// Single detection attached to a streamed frame.
///
/// `bbox` is `(x1, y1, x2, y2)` in the fixed [`DETECTOR_INPUT_SIZE`] square and is
/// never rewritten; screen placement happens in [`crate::overlay`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(rename = "box")]
    pub bbox: [f32; 4],
    pub label: String,
    pub score: f32,
}

impl Detection {
    pub fn new(bbox: [f32; 4], label: impl Into<String>, score: f32) -> Self {
        Self {
            bbox,
            label: label.into(),
            score,
        }
    }
}

/// Detection backends the streaming service can run on each frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionModel {
    #[default]
    Dino,
    Owlvit,
    Yolo,
}

impl DetectionModel {
    pub const ALL: [DetectionModel; 3] = [
        DetectionModel::Dino,
        DetectionModel::Owlvit,
        DetectionModel::Yolo,
    ];

    /// Identifier sent on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            DetectionModel::Dino => "dino",
            DetectionModel::Owlvit => "owlvit",
            DetectionModel::Yolo => "yolo",
        }
    }

    /// Name shown in model pickers.
    pub fn display_name(self) -> &'static str {
        match self {
            DetectionModel::Dino => "GroundingDINO",
            DetectionModel::Owlvit => "OWL-ViT",
            DetectionModel::Yolo => "YOLO-v8",
        }
    }
}

impl fmt::Display for DetectionModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown detection model {0:?} (expected dino, owlvit or yolo)")]
pub struct UnknownModel(pub String);

impl FromStr for DetectionModel {
    type Err = UnknownModel;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        DetectionModel::ALL
            .into_iter()
            .find(|model| {
                normalized == model.as_str()
                    || normalized == model.display_name().to_ascii_lowercase()
            })
            .ok_or_else(|| UnknownModel(value.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wire_and_display_names() {
        assert_eq!("dino".parse::<DetectionModel>(), Ok(DetectionModel::Dino));
        assert_eq!("GroundingDINO".parse::<DetectionModel>(), Ok(DetectionModel::Dino));
        assert_eq!(" OWL-ViT ".parse::<DetectionModel>(), Ok(DetectionModel::Owlvit));
        assert_eq!("yolo".parse::<DetectionModel>(), Ok(DetectionModel::Yolo));
        assert!("resnet".parse::<DetectionModel>().is_err());
    }

    #[test]
    fn detection_uses_box_key_on_the_wire() {
        let detection = Detection::new([100.0, 100.0, 200.0, 200.0], "pothole", 0.91);
        let json = serde_json::to_value(&detection).unwrap();
        assert_eq!(json["box"][2], 200.0_f64);
        assert_eq!(json["label"], "pothole");

        let model = serde_json::to_value(DetectionModel::Owlvit).unwrap();
        assert_eq!(model, "owlvit");
    }
}

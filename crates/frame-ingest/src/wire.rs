//! JSON shapes exchanged with the streaming backend.
//!
//! Inbound frame events come in two flavours: a `detections` array of
//! `{box, label, score}` records, or the older parallel `boxes`/`labels`/`scores`
//! arrays. Both decode into the same [`Frame`].

use ml_core::{Detection, DetectionModel};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Direction, Frame};

/// Begin-session command sent to the backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StartStream {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "startLatInput")]
    pub start_lat: String,
    #[serde(rename = "startLngInput")]
    pub start_lng: String,
    #[serde(rename = "endLatInput")]
    pub end_lat: String,
    #[serde(rename = "endLngInput")]
    pub end_lng: String,
    pub num_points: u32,
    pub model: DetectionModel,
}

/// One pushed frame event as it appears on the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct FrameEvent {
    pub direction: Direction,
    #[serde(default, rename = "imageRef", alias = "url", alias = "image_ref")]
    pub image_ref: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default, alias = "lng")]
    pub lon: Option<f64>,
    #[serde(default)]
    pub detections: Option<Vec<Detection>>,
    #[serde(default)]
    pub detected: Option<bool>,
    #[serde(default)]
    pub boxes: Vec<[f32; 4]>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub scores: Vec<f32>,
}

impl FrameEvent {
    pub fn into_frame(self) -> Frame {
        let detections = match (self.detections, self.detected) {
            (Some(detections), _) => detections,
            (None, Some(false)) => Vec::new(),
            (None, _) => {
                let labels = self.labels;
                let scores = self.scores;
                self.boxes
                    .into_iter()
                    .enumerate()
                    .map(|(idx, bbox)| Detection {
                        bbox,
                        label: labels.get(idx).cloned().unwrap_or_default(),
                        score: scores.get(idx).copied().unwrap_or_default(),
                    })
                    .collect()
            }
        };

        Frame {
            direction: self.direction,
            image_ref: self.image_ref.filter(|value| !value.is_empty()),
            lat: self.lat,
            lon: self.lon,
            detections,
        }
    }
}

#[derive(Debug, Error)]
pub enum WireError {
    #[error("malformed frame event")]
    Json(#[from] serde_json::Error),
}

/// Decode one line of a newline-delimited or server-sent event stream.
///
/// Blank lines, SSE comments and non-`data` fields carry no frame and yield
/// `Ok(None)`.
pub fn decode_event(line: &str) -> Result<Option<FrameEvent>, WireError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return Ok(None);
    }
    let payload = match line.strip_prefix("data:") {
        Some(rest) => rest.trim_start(),
        None if is_sse_field(line) => return Ok(None),
        None => line,
    };
    if payload.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(payload)?))
}

fn is_sse_field(line: &str) -> bool {
    ["event:", "id:", "retry:"]
        .iter()
        .any(|field| line.starts_with(field))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_detection_records() {
        let event = decode_event(
            r#"{"direction":"front","imageRef":"s3://a.jpg","lat":37.775,"lon":-122.419,
                "detections":[{"box":[100,100,200,200],"label":"pothole","score":0.91}]}"#,
        )
        .unwrap()
        .unwrap();
        let frame = event.into_frame();
        assert_eq!(frame.direction, Direction::Front);
        assert_eq!(frame.image_ref.as_deref(), Some("s3://a.jpg"));
        assert_eq!(frame.position(), Some((37.775, -122.419)));
        assert_eq!(frame.detections.len(), 1);
        assert_eq!(frame.detections[0].label, "pothole");
    }

    #[test]
    fn zips_parallel_arrays() {
        let event = decode_event(
            r#"data: {"direction":"left","url":"https://bucket/x.jpg","lat":1.0,"lon":2.0,
                "detected":true,"boxes":[[1,2,3,4],[5,6,7,8]],
                "labels":["graffiti"],"scores":[0.5,0.7]}"#,
        )
        .unwrap()
        .unwrap();
        let frame = event.into_frame();
        assert_eq!(frame.image_ref.as_deref(), Some("https://bucket/x.jpg"));
        assert_eq!(frame.detections.len(), 2);
        assert_eq!(frame.detections[0].label, "graffiti");
        assert_eq!(frame.detections[1].label, "");
        assert_eq!(frame.detections[1].score, 0.7);
    }

    #[test]
    fn undetected_frames_carry_no_boxes() {
        let event = decode_event(
            r#"{"direction":"back","url":null,"detected":false,"boxes":[[1,2,3,4]]}"#,
        )
        .unwrap()
        .unwrap();
        let frame = event.into_frame();
        assert!(frame.detections.is_empty());
        assert!(frame.image_ref.is_none());
        assert!(frame.position().is_none());
    }

    #[test]
    fn skips_stream_framing_lines() {
        for line in ["", "   ", ": keep-alive", "event: frame", "id: 4", "retry: 500", "data:"] {
            assert!(decode_event(line).unwrap().is_none(), "{line:?}");
        }
        assert!(decode_event("{not json").is_err());
        assert!(decode_event(r#"{"direction":"up"}"#).is_err());
    }

    #[test]
    fn start_command_uses_backend_field_names() {
        let command = StartStream {
            user_id: "7".into(),
            start_lat: "37.774900".into(),
            start_lng: "-122.419400".into(),
            end_lat: "37.804900".into(),
            end_lng: "-122.271100".into(),
            num_points: 10,
            model: DetectionModel::Dino,
        };
        let json = serde_json::to_value(&command).unwrap();
        assert_eq!(json["userId"], "7");
        assert_eq!(json["startLatInput"], "37.774900");
        assert_eq!(json["endLngInput"], "-122.271100");
        assert_eq!(json["num_points"], 10u32);
        assert_eq!(json["model"], "dino");
    }
}

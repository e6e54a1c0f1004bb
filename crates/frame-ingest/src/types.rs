use std::{fmt, str::FromStr};

use ml_core::Detection;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Monotonic session counter. Every event a transport delivers is tagged with
/// the generation of the session that requested it.
pub type Generation = u64;

/// Camera heading a frame was captured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Front,
    Back,
    Left,
    Right,
}

impl Direction {
    /// Tab order used by viewers.
    pub const ALL: [Direction; 4] = [
        Direction::Front,
        Direction::Back,
        Direction::Left,
        Direction::Right,
    ];

    pub fn index(self) -> usize {
        match self {
            Direction::Front => 0,
            Direction::Back => 1,
            Direction::Left => 2,
            Direction::Right => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Front => "front",
            Direction::Back => "back",
            Direction::Left => "left",
            Direction::Right => "right",
        }
    }

    /// Capitalised tab label.
    pub fn label(self) -> &'static str {
        match self {
            Direction::Front => "Front",
            Direction::Back => "Back",
            Direction::Left => "Left",
            Direction::Right => "Right",
        }
    }

    /// Street View heading requested for this direction, in degrees.
    pub fn heading_degrees(self) -> u16 {
        match self {
            Direction::Front => 90,
            Direction::Right => 180,
            Direction::Back => 270,
            Direction::Left => 360,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown direction {0:?} (expected front, back, left or right)")]
pub struct UnknownDirection(pub String);

impl FromStr for Direction {
    type Err = UnknownDirection;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Direction::ALL
            .into_iter()
            .find(|direction| direction.as_str() == normalized)
            .ok_or_else(|| UnknownDirection(value.to_string()))
    }
}

/// Annotated capture for one direction at one sampled route point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frame {
    pub direction: Direction,
    /// Opaque locator for the image (URL or blob key). `None` when the backend
    /// could not publish the image.
    pub image_ref: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub detections: Vec<Detection>,
}

impl Frame {
    /// Capture position, only when both coordinates are known.
    pub fn position(&self) -> Option<(f64, f64)> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }
}

/// Event delivered by a transport into the viewer loop.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// The backend took the begin-session command. Frames follow.
    Accepted { generation: Generation },
    /// The backend could not be reached or refused the command. Nothing
    /// follows for this generation.
    Refused { generation: Generation, reason: String },
    Frame { generation: Generation, frame: Frame },
    /// The backend finished streaming the session.
    Ended { generation: Generation },
    /// The stream broke before the backend finished.
    Disconnected { generation: Generation, reason: String },
}

impl Inbound {
    pub fn generation(&self) -> Generation {
        match self {
            Inbound::Accepted { generation }
            | Inbound::Refused { generation, .. }
            | Inbound::Frame { generation, .. }
            | Inbound::Ended { generation }
            | Inbound::Disconnected { generation, .. } => *generation,
        }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport is closed")]
    Closed,
    #[error("failed to spawn stream reader")]
    Spawn(#[source] std::io::Error),
    #[error("failed to encode start command")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

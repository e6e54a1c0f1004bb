//! Route form state and the validated request built from it.

use std::{fmt, str::FromStr};

use frame_ingest::StartStream;
use ml_core::DetectionModel;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Same point with both coordinates rounded to six decimals.
    pub fn rounded(self) -> Self {
        Self::new(round6(self.lat), round6(self.lng))
    }
}

impl fmt::Display for LatLng {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, {}",
            format_coordinate(self.lat),
            format_coordinate(self.lng)
        )
    }
}

pub fn round6(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}

/// Fixed six-decimal rendering used on the route form and the wire.
pub fn format_coordinate(value: f64) -> String {
    format!("{value:.6}")
}

/// Editable text fields of the route form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RouteField {
    StartLat,
    StartLng,
    EndLat,
    EndLng,
    NumPoints,
}

impl RouteField {
    pub const ALL: [RouteField; 5] = [
        RouteField::StartLat,
        RouteField::StartLng,
        RouteField::EndLat,
        RouteField::EndLng,
        RouteField::NumPoints,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RouteField::StartLat => "startLat",
            RouteField::StartLng => "startLng",
            RouteField::EndLat => "endLat",
            RouteField::EndLng => "endLng",
            RouteField::NumPoints => "numPoints",
        }
    }
}

impl fmt::Display for RouteField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown route field {0:?}")]
pub struct UnknownRouteField(pub String);

impl FromStr for RouteField {
    type Err = UnknownRouteField;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        RouteField::ALL
            .into_iter()
            .find(|field| field.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| UnknownRouteField(value.to_string()))
    }
}

/// Why a draft could not become a [`RouteRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidRoute {
    #[error("{0} is empty")]
    Missing(RouteField),
    #[error("{field} is not a number: {value:?}")]
    NotNumeric { field: RouteField, value: String },
    #[error("numPoints must be a positive integer, got {0:?}")]
    PointCount(String),
}

/// Immutable, validated parameters for one streaming session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRequest {
    pub start: LatLng,
    pub end: LatLng,
    pub num_points: u32,
    pub model: DetectionModel,
}

impl RouteRequest {
    /// Begin-session command for this route on behalf of `user_id`.
    pub fn to_command(&self, user_id: &str) -> StartStream {
        StartStream {
            user_id: user_id.to_string(),
            start_lat: format_coordinate(self.start.lat),
            start_lng: format_coordinate(self.start.lng),
            end_lat: format_coordinate(self.end.lat),
            end_lng: format_coordinate(self.end.lng),
            num_points: self.num_points,
            model: self.model,
        }
    }
}

/// Route form contents. Written by the coordinate picker and by manual edits;
/// read on submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteDraft {
    pub start_lat: String,
    pub start_lng: String,
    pub end_lat: String,
    pub end_lng: String,
    pub num_points: String,
    pub model: DetectionModel,
}

impl RouteDraft {
    pub fn set_field(&mut self, field: RouteField, value: impl Into<String>) {
        let slot = match field {
            RouteField::StartLat => &mut self.start_lat,
            RouteField::StartLng => &mut self.start_lng,
            RouteField::EndLat => &mut self.end_lat,
            RouteField::EndLng => &mut self.end_lng,
            RouteField::NumPoints => &mut self.num_points,
        };
        *slot = value.into();
    }

    pub fn set_model(&mut self, model: DetectionModel) {
        self.model = model;
    }

    /// Record a picked start point. Any previously chosen end is cleared.
    pub fn set_start(&mut self, point: LatLng) {
        self.start_lat = format_coordinate(point.lat);
        self.start_lng = format_coordinate(point.lng);
        self.end_lat.clear();
        self.end_lng.clear();
    }

    pub fn set_end(&mut self, point: LatLng) {
        self.end_lat = format_coordinate(point.lat);
        self.end_lng = format_coordinate(point.lng);
    }

    pub fn start(&self) -> Option<LatLng> {
        pair(&self.start_lat, &self.start_lng)
    }

    pub fn end(&self) -> Option<LatLng> {
        pair(&self.end_lat, &self.end_lng)
    }

    pub fn to_request(&self) -> Result<RouteRequest, InvalidRoute> {
        let start_lat = coordinate(RouteField::StartLat, &self.start_lat)?;
        let start_lng = coordinate(RouteField::StartLng, &self.start_lng)?;
        let end_lat = coordinate(RouteField::EndLat, &self.end_lat)?;
        let end_lng = coordinate(RouteField::EndLng, &self.end_lng)?;

        let raw_points = self.num_points.trim();
        if raw_points.is_empty() {
            return Err(InvalidRoute::Missing(RouteField::NumPoints));
        }
        let num_points = match raw_points.parse::<u32>() {
            Ok(count) if count > 0 => count,
            _ => return Err(InvalidRoute::PointCount(self.num_points.clone())),
        };

        Ok(RouteRequest {
            start: LatLng::new(start_lat, start_lng).rounded(),
            end: LatLng::new(end_lat, end_lng).rounded(),
            num_points,
            model: self.model,
        })
    }
}

fn coordinate(field: RouteField, raw: &str) -> Result<f64, InvalidRoute> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(InvalidRoute::Missing(field));
    }
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(InvalidRoute::NotNumeric {
            field,
            value: raw.to_string(),
        }),
    }
}

fn pair(lat: &str, lng: &str) -> Option<LatLng> {
    let lat = lat.trim().parse::<f64>().ok().filter(|v| v.is_finite())?;
    let lng = lng.trim().parse::<f64>().ok().filter(|v| v.is_finite())?;
    Some(LatLng::new(lat, lng))
}

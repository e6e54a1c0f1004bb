//! Offline stand-in for the streaming backend.
//!
//! Samples the requested route, then emits one frame per heading for every
//! point with synthetic detections, pacing events on a background thread.

use std::{
    iter::Enumerate,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    thread,
    time::Duration,
};

use ml_core::{DETECTOR_INPUT_SIZE, Detection};
use tracing::{debug, info};

use crate::{
    transport::{InboundSender, Transport},
    types::{Direction, Frame, Generation, Inbound, TransportError},
    wire::StartStream,
};

const STREETVIEW_ENDPOINT: &str = "https://maps.googleapis.com/maps/api/streetview";
const STREETVIEW_SIZE: &str = "640x640";
const STREETVIEW_FOV: u16 = 90;
const STREETVIEW_PITCH: i16 = 0;

/// Order headings are fetched for each sampled point.
pub const HEADING_ORDER: [Direction; 4] = [
    Direction::Front,
    Direction::Right,
    Direction::Back,
    Direction::Left,
];

/// Evenly spaced points from `start` to `end` inclusive, rounded to six
/// decimals. A single point yields just `start`.
pub fn route_points(start: (f64, f64), end: (f64, f64), num_points: u32) -> RoutePoints {
    RoutePoints {
        start,
        end,
        next: 0,
        count: num_points,
    }
}

/// Iterator returned by [`route_points`]. Each point is computed on demand.
#[derive(Debug, Clone)]
pub struct RoutePoints {
    start: (f64, f64),
    end: (f64, f64),
    next: u32,
    count: u32,
}

impl Iterator for RoutePoints {
    type Item = (f64, f64);

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.count {
            return None;
        }
        let t = match self.count {
            1 => 0.0,
            n => f64::from(self.next) / f64::from(n - 1),
        };
        self.next += 1;
        Some((
            round6(self.start.0 + (self.end.0 - self.start.0) * t),
            round6(self.start.1 + (self.end.1 - self.start.1) * t),
        ))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.count - self.next) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for RoutePoints {}

fn round6(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}

/// Street View static image URL for a point and heading. The API key is left
/// out; callers that fetch the image append it.
pub fn streetview_url(lat: f64, lon: f64, direction: Direction) -> String {
    format!(
        "{STREETVIEW_ENDPOINT}?size={STREETVIEW_SIZE}&fov={STREETVIEW_FOV}\
         &heading={}&pitch={STREETVIEW_PITCH}&location={lat},{lon}",
        direction.heading_degrees()
    )
}

#[derive(Clone, Debug)]
pub struct SimulationConfig {
    /// Pause between consecutive frame events.
    pub frame_delay: Duration,
    /// Labels the synthetic detector cycles through.
    pub labels: Vec<String>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            frame_delay: Duration::from_millis(250),
            labels: [
                "a graffiti vandalism",
                "a hole on the road",
                "a crack on the road",
                "a tent on the sidewalk",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

pub struct SimulatedTransport {
    config: SimulationConfig,
    sink: InboundSender,
    latest: Arc<AtomicU64>,
}

impl SimulatedTransport {
    pub fn new(config: SimulationConfig, sink: InboundSender) -> Self {
        Self {
            config,
            sink,
            latest: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl Transport for SimulatedTransport {
    fn begin_session(
        &mut self,
        generation: Generation,
        command: &StartStream,
    ) -> Result<(), TransportError> {
        let frames = frames_for(command, &self.config.labels)?;
        if self.sink.is_closed() {
            return Err(TransportError::Closed);
        }

        let sink = self.sink.clone();
        let latest = self.latest.clone();
        let delay = self.config.frame_delay;
        latest.store(generation, Ordering::SeqCst);

        thread::Builder::new()
            .name(format!("stream-sim-{generation}"))
            .spawn(move || replay(frames, generation, delay, &sink, &latest))
            .map_err(TransportError::Spawn)?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}

fn frames_for(
    command: &StartStream,
    labels: &[String],
) -> Result<SimulatedFrames, TransportError> {
    let parse = |field: &str, value: &str| {
        value
            .trim()
            .parse::<f64>()
            .map_err(|err| {
                TransportError::Other(anyhow::anyhow!("invalid {field} {value:?}: {err}"))
            })
    };
    let start = (
        parse("startLatInput", &command.start_lat)?,
        parse("startLngInput", &command.start_lng)?,
    );
    let end = (
        parse("endLatInput", &command.end_lat)?,
        parse("endLngInput", &command.end_lng)?,
    );

    Ok(SimulatedFrames {
        points: route_points(start, end, command.num_points).enumerate(),
        current: None,
        slot: 0,
        labels: labels.to_vec(),
    })
}

/// One frame per heading for every sampled point, in fetch order.
struct SimulatedFrames {
    points: Enumerate<RoutePoints>,
    current: Option<(usize, (f64, f64))>,
    slot: usize,
    labels: Vec<String>,
}

impl Iterator for SimulatedFrames {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        if self.current.is_none() || self.slot == HEADING_ORDER.len() {
            self.current = Some(self.points.next()?);
            self.slot = 0;
        }
        let (point, (lat, lon)) = self.current?;
        let direction = HEADING_ORDER[self.slot];
        let detections = synthetic_detections(point, self.slot, &self.labels);
        self.slot += 1;
        Some(Frame {
            direction,
            image_ref: Some(streetview_url(lat, lon, direction)),
            lat: Some(lat),
            lon: Some(lon),
            detections,
        })
    }
}

/// Deterministic fake detector: roughly every third capture gets one box.
fn synthetic_detections(point: usize, slot: usize, labels: &[String]) -> Vec<Detection> {
    let seed = point * HEADING_ORDER.len() + slot;
    if labels.is_empty() || seed % 3 != 0 {
        return Vec::new();
    }
    let label = &labels[(seed / 3) % labels.len()];
    let offset = (seed * 37 % 320) as f32;
    let x1 = offset.min(DETECTOR_INPUT_SIZE - 160.0);
    let y1 = (offset / 2.0 + 160.0).min(DETECTOR_INPUT_SIZE - 120.0);
    let score = 0.35 + (seed % 6) as f32 * 0.1;
    vec![Detection::new([x1, y1, x1 + 160.0, y1 + 120.0], label.clone(), score)]
}

fn replay(
    frames: SimulatedFrames,
    generation: Generation,
    delay: Duration,
    sink: &InboundSender,
    latest: &AtomicU64,
) {
    info!(generation, points = frames.points.len(), "Simulated stream started");
    if sink.send(Inbound::Accepted { generation }).is_err() {
        return;
    }
    for frame in frames {
        if latest.load(Ordering::SeqCst) != generation {
            debug!(generation, "Simulated stream superseded");
            return;
        }
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        if sink.send(Inbound::Frame { generation, frame }).is_err() {
            return;
        }
    }
    let _ = sink.send(Inbound::Ended { generation });
}

#[cfg(test)]
mod tests {
    use ml_core::DetectionModel;

    use super::*;
    use crate::transport::inbound_channel;

    fn command(num_points: u32) -> StartStream {
        StartStream {
            user_id: "1".into(),
            start_lat: "37.785215".into(),
            start_lng: "-122.417924".into(),
            end_lat: "37.785821".into(),
            end_lng: "-122.412989".into(),
            num_points,
            model: DetectionModel::Owlvit,
        }
    }

    #[test]
    fn samples_route_inclusive_of_both_ends() {
        let points: Vec<_> = route_points((0.0, 10.0), (1.0, 12.0), 5).collect();
        assert_eq!(
            points,
            [(0.0, 10.0), (0.25, 10.5), (0.5, 11.0), (0.75, 11.5), (1.0, 12.0)]
        );
        assert!(route_points((3.0, 4.0), (9.0, 9.0), 1).eq([(3.0, 4.0)]));
        assert_eq!(route_points((3.0, 4.0), (9.0, 9.0), 0).next(), None);
    }

    #[test]
    fn rounds_samples_to_six_decimals() {
        let points: Vec<_> = route_points((0.0, 0.0), (1.0, 1.0), 4).collect();
        assert_eq!(points[1], (0.333333, 0.333333));
        assert_eq!(points[2], (0.666667, 0.666667));
    }

    #[test]
    fn builds_streetview_urls_per_heading() {
        let url = streetview_url(37.5, -122.25, Direction::Back);
        assert!(url.starts_with(STREETVIEW_ENDPOINT));
        assert!(url.contains("size=640x640"));
        assert!(url.contains("fov=90"));
        assert!(url.contains("heading=270"));
        assert!(url.contains("pitch=0"));
        assert!(url.ends_with("location=37.5,-122.25"));
    }

    #[test]
    fn emits_headings_in_fetch_order() {
        let labels = SimulationConfig::default().labels;
        let frames: Vec<Frame> = frames_for(&command(2), &labels).unwrap().collect();
        let directions: Vec<Direction> = frames.iter().map(|frame| frame.direction).collect();
        assert_eq!(
            directions,
            [
                Direction::Front,
                Direction::Right,
                Direction::Back,
                Direction::Left,
                Direction::Front,
                Direction::Right,
                Direction::Back,
                Direction::Left,
            ]
        );
        assert_eq!(frames[0].position(), Some((37.785215, -122.417924)));
        assert_eq!(frames[7].position(), Some((37.785821, -122.412989)));
        assert!(!frames[0].detections.is_empty());
        for detection in frames.iter().flat_map(|frame| &frame.detections) {
            assert!(detection.bbox[2] <= DETECTOR_INPUT_SIZE);
            assert!(detection.bbox[3] <= DETECTOR_INPUT_SIZE);
        }
    }

    #[test]
    fn rejects_unparseable_coordinates() {
        let mut bad = command(2);
        bad.end_lng = "east".into();
        let (tx, _rx) = inbound_channel();
        let mut transport = SimulatedTransport::new(SimulationConfig::default(), tx);
        assert!(matches!(
            transport.begin_session(1, &bad),
            Err(TransportError::Other(_))
        ));
    }

    #[tokio::test]
    async fn streams_frames_then_end_marker() {
        let (tx, mut rx) = inbound_channel();
        let config = SimulationConfig {
            frame_delay: Duration::ZERO,
            ..SimulationConfig::default()
        };
        let mut transport = SimulatedTransport::new(config, tx);
        transport.begin_session(3, &command(3)).unwrap();

        let mut accepted = false;
        let mut frames = 0;
        while let Some(event) = rx.recv().await {
            assert_eq!(event.generation(), 3);
            match event {
                Inbound::Accepted { .. } => {
                    assert_eq!(frames, 0);
                    accepted = true;
                }
                Inbound::Frame { .. } => frames += 1,
                Inbound::Ended { .. } => break,
                other => panic!("unexpected event: {other:?}"),
            }
        }
        assert!(accepted);
        assert_eq!(frames, 12);
    }

    #[test]
    fn huge_routes_are_sampled_on_demand() {
        let points = route_points((0.0, 0.0), (1.0, 1.0), u32::MAX);
        assert_eq!(points.len(), u32::MAX as usize);

        let labels = SimulationConfig::default().labels;
        let mut frames = frames_for(&command(u32::MAX), &labels).unwrap();
        let first: Vec<Frame> = frames.by_ref().take(4).collect();
        assert!(first.iter().all(|frame| frame.position() == Some((37.785215, -122.417924))));
        let next = frames.next().unwrap();
        assert_eq!(next.direction, Direction::Front);
        assert_eq!(
            next.position(),
            route_points((37.785215, -122.417924), (37.785821, -122.412989), u32::MAX).nth(1)
        );
    }

    #[tokio::test]
    async fn huge_session_streams_until_superseded() {
        let (tx, mut rx) = inbound_channel();
        let config = SimulationConfig {
            frame_delay: Duration::from_millis(1),
            ..SimulationConfig::default()
        };
        let mut transport = SimulatedTransport::new(config, tx);
        transport.begin_session(1, &command(u32::MAX)).unwrap();

        assert_eq!(rx.recv().await, Some(Inbound::Accepted { generation: 1 }));
        assert!(matches!(rx.recv().await, Some(Inbound::Frame { generation: 1, .. })));

        transport.begin_session(2, &command(1)).unwrap();
        loop {
            match rx.recv().await {
                Some(Inbound::Ended { generation: 2 }) => break,
                Some(event) => assert_ne!(event, Inbound::Ended { generation: 1 }),
                None => panic!("simulated stream closed early"),
            }
        }
    }
}

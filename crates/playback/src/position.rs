//! Vehicle marker feedback for the frame on screen.

use frame_ingest::{Direction, FrameBuffer};
use tracing::trace;

use crate::{map::MapSink, route::LatLng};

/// Publishes the capture position of the frame under the cursor for the
/// active direction.
///
/// A `(direction, cursor)` pair is published at most once. If the frame has
/// not arrived yet the pair stays watched and is published when it does. A
/// frame without both coordinates publishes nothing and the map keeps its
/// previous marker.
#[derive(Debug, Default)]
pub struct PositionEmitter {
    watched: Option<(Direction, usize)>,
    settled: bool,
    last: Option<LatLng>,
}

impl PositionEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_published(&self) -> Option<LatLng> {
        self.last
    }

    /// Re-evaluate after any change to the cursor, the active direction, or
    /// the buffer. Returns the position when one was published.
    pub fn observe(
        &mut self,
        buffer: &FrameBuffer,
        direction: Direction,
        cursor: usize,
        map: &mut dyn MapSink,
    ) -> Option<LatLng> {
        let key = (direction, cursor);
        if self.watched != Some(key) {
            self.watched = Some(key);
            self.settled = false;
        }
        if self.settled {
            return None;
        }

        let frame = buffer.get(direction, cursor)?;
        self.settled = true;
        let (lat, lon) = frame.position()?;
        let position = LatLng::new(lat, lon);
        trace!(%direction, cursor, %position, "vehicle position");
        map.set_vehicle_position(position);
        self.last = Some(position);
        Some(position)
    }

    /// Forget the watched pair so the next observation publishes again. Used
    /// when a new session replaces the buffer contents.
    pub fn rewatch(&mut self) {
        self.watched = None;
        self.settled = false;
    }
}

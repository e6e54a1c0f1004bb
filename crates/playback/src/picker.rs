//! Map-click capture of route endpoints.

use serde::Serialize;
use tracing::debug;

use crate::{
    map::MapSink,
    route::{LatLng, RouteDraft},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Awaiting {
    #[default]
    Start,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PickState {
    pub armed: bool,
    pub awaiting: Awaiting,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pick {
    Ignored,
    Start(LatLng),
    End(LatLng),
}

/// Alternates map clicks between the route start and end while armed.
#[derive(Debug, Default)]
pub struct CoordinatePicker {
    state: PickState,
}

impl CoordinatePicker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PickState {
        self.state
    }

    pub fn arm(&mut self) {
        self.state.armed = true;
    }

    /// Stop capturing clicks. The pending slot is kept for the next arm.
    pub fn disarm(&mut self) {
        self.state.armed = false;
    }

    pub fn on_map_click(
        &mut self,
        lat: f64,
        lng: f64,
        draft: &mut RouteDraft,
        map: &mut dyn MapSink,
    ) -> Pick {
        if !self.state.armed {
            return Pick::Ignored;
        }
        if !lat.is_finite() || !lng.is_finite() {
            debug!(lat, lng, "ignoring map click without a usable position");
            return Pick::Ignored;
        }

        let point = LatLng::new(lat, lng).rounded();
        match self.state.awaiting {
            Awaiting::Start => {
                draft.set_start(point);
                map.set_route_endpoints(Some(point), None);
                self.state.awaiting = Awaiting::End;
                Pick::Start(point)
            }
            Awaiting::End => {
                draft.set_end(point);
                map.set_route_endpoints(draft.start(), Some(point));
                self.state.awaiting = Awaiting::Start;
                Pick::End(point)
            }
        }
    }
}

//! Outbound seam to the map collaborator.

use serde::Serialize;

use crate::route::LatLng;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerIcon {
    Start,
    End,
    Vehicle,
}

impl MarkerIcon {
    pub fn url(self) -> &'static str {
        match self {
            MarkerIcon::Start => "http://maps.google.com/mapfiles/ms/icons/green-dot.png",
            MarkerIcon::End => "/finish-flag.png",
            MarkerIcon::Vehicle => "/car-marker.png",
        }
    }

    /// Rendered icon size in pixels (square).
    pub fn size(self) -> Option<u32> {
        match self {
            MarkerIcon::Start => None,
            MarkerIcon::End => Some(30),
            MarkerIcon::Vehicle => Some(40),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Marker {
    pub position: LatLng,
    pub icon: MarkerIcon,
    pub icon_url: &'static str,
    /// `None` draws the icon at its native size.
    pub icon_size: Option<u32>,
    pub title: String,
}

impl Marker {
    fn new(position: LatLng, icon: MarkerIcon, title: String) -> Self {
        Self {
            position,
            icon,
            icon_url: icon.url(),
            icon_size: icon.size(),
            title,
        }
    }
}

/// Receives position and endpoint updates. The viewer never reads back from it.
pub trait MapSink {
    fn set_vehicle_position(&mut self, position: LatLng);

    fn set_route_endpoints(&mut self, start: Option<LatLng>, end: Option<LatLng>);
}

/// Last published map state, kept for the snapshot and the control server.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MapView {
    pub vehicle: Option<LatLng>,
    pub start: Option<LatLng>,
    pub end: Option<LatLng>,
}

impl MapView {
    pub fn markers(&self) -> Vec<Marker> {
        let mut markers = Vec::with_capacity(3);
        if let Some(start) = self.start {
            markers.push(Marker::new(start, MarkerIcon::Start, format!("Start: {start}")));
        }
        if let Some(end) = self.end {
            markers.push(Marker::new(end, MarkerIcon::End, format!("End: {end}")));
        }
        if let Some(vehicle) = self.vehicle {
            markers.push(Marker::new(
                vehicle,
                MarkerIcon::Vehicle,
                format!("Vehicle: {vehicle}"),
            ));
        }
        markers
    }
}

impl MapSink for MapView {
    fn set_vehicle_position(&mut self, position: LatLng) {
        self.vehicle = Some(position);
    }

    fn set_route_endpoints(&mut self, start: Option<LatLng>, end: Option<LatLng>) {
        self.start = start;
        self.end = end;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_markers_with_distinct_icons() {
        let mut view = MapView::default();
        assert!(view.markers().is_empty());

        view.set_route_endpoints(Some(LatLng::new(1.0, 2.0)), Some(LatLng::new(3.0, 4.0)));
        view.set_vehicle_position(LatLng::new(1.5, 2.5));

        let markers = view.markers();
        let icons: Vec<MarkerIcon> = markers.iter().map(|marker| marker.icon).collect();
        assert_eq!(icons, [MarkerIcon::Start, MarkerIcon::End, MarkerIcon::Vehicle]);
        assert_eq!(markers[0].title, "Start: 1.000000, 2.000000");
        assert_eq!(markers[1].icon_url, "/finish-flag.png");
        assert_eq!(markers[2].icon_url, "/car-marker.png");
        assert_eq!(markers[0].icon_size, None);
        assert_eq!(markers[2].icon_size, Some(40));
    }

    #[test]
    fn endpoints_can_be_cleared() {
        let mut view = MapView::default();
        view.set_route_endpoints(Some(LatLng::new(1.0, 2.0)), Some(LatLng::new(3.0, 4.0)));
        view.set_route_endpoints(Some(LatLng::new(5.0, 6.0)), None);
        assert_eq!(view.end, None);
        assert_eq!(view.markers().len(), 1);
    }
}

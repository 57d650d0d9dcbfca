//! Everything drawn on top of the tiles.
//!
//! Replacement rules:
//! * single-slot kinds (location, picked point, route start/end) keep only
//!   the latest marker;
//! * search results and POIs are replaced as a whole group;
//! * the route line is independent of its endpoint markers.

use super::marker::{Marker, MarkerKind};
use crate::core::geo::{LatLng, LatLngBounds};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteLine {
    pub points: Vec<LatLng>,
    pub summary: String,
}

#[derive(Debug, Clone, Default)]
pub struct Overlays {
    markers: Vec<Marker>,
    route: Option<RouteLine>,
    next_id: u64,
}

impl Overlays {
    pub fn new() -> Self {
        Self::default()
    }

    fn assign_id(&mut self, mut marker: Marker) -> Marker {
        self.next_id += 1;
        marker.id = self.next_id;
        marker
    }

    /// Place a single-slot marker, dropping the previous one of its kind.
    /// Group kinds are appended to their group.
    pub fn set_marker(&mut self, marker: Marker) -> u64 {
        if marker.kind.is_single() {
            self.remove_kind(marker.kind);
        }
        let marker = self.assign_id(marker);
        let id = marker.id;
        self.markers.push(marker);
        id
    }

    /// Replace every marker of `kind` with `markers`
    pub fn replace_group(&mut self, kind: MarkerKind, markers: Vec<Marker>) -> Vec<u64> {
        self.remove_kind(kind);
        markers
            .into_iter()
            .map(|mut marker| {
                marker.kind = kind;
                let marker = self.assign_id(marker);
                let id = marker.id;
                self.markers.push(marker);
                id
            })
            .collect()
    }

    pub fn remove_kind(&mut self, kind: MarkerKind) -> usize {
        let before = self.markers.len();
        self.markers.retain(|m| m.kind != kind);
        before - self.markers.len()
    }

    pub fn marker(&self, id: u64) -> Option<&Marker> {
        self.markers.iter().find(|m| m.id == id)
    }

    pub fn first_of(&self, kind: MarkerKind) -> Option<&Marker> {
        self.markers.iter().find(|m| m.kind == kind)
    }

    pub fn of_kind(&self, kind: MarkerKind) -> impl Iterator<Item = &Marker> {
        self.markers.iter().filter(move |m| m.kind == kind)
    }

    /// Markers in draw order
    pub fn markers(&self) -> Vec<&Marker> {
        let mut sorted: Vec<&Marker> = self.markers.iter().collect();
        sorted.sort_by_key(|m| (m.kind.z_index(), m.id));
        sorted
    }

    pub fn set_route(&mut self, route: RouteLine) {
        self.route = Some(route);
    }

    pub fn route(&self) -> Option<&RouteLine> {
        self.route.as_ref()
    }

    /// Remove the route line, leaving its endpoint markers
    pub fn take_route(&mut self) -> Option<RouteLine> {
        self.route.take()
    }

    /// Drop the route line and its endpoint markers
    pub fn clear_route(&mut self) {
        self.route = None;
        self.remove_kind(MarkerKind::RouteStart);
        self.remove_kind(MarkerKind::RouteEnd);
    }

    pub fn clear(&mut self) {
        self.markers.clear();
        self.route = None;
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty() && self.route.is_none()
    }

    /// Bounds of every marker and the route line
    pub fn bounds(&self) -> Option<LatLngBounds> {
        let points: Vec<LatLng> = self
            .markers
            .iter()
            .map(|m| m.position)
            .chain(self.route.iter().flat_map(|r| r.points.iter().copied()))
            .collect();
        LatLngBounds::from_points(&points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marker(kind: MarkerKind, lat: f64) -> Marker {
        Marker::new(kind, LatLng::new(lat, 0.0), format!("{:?}", kind))
    }

    #[test]
    fn test_single_slot_kinds_replace() {
        let mut overlays = Overlays::new();
        let first = overlays.set_marker(marker(MarkerKind::Picked, 1.0));
        let second = overlays.set_marker(marker(MarkerKind::Picked, 2.0));
        overlays.set_marker(marker(MarkerKind::Location, 3.0));

        assert_eq!(overlays.len(), 2);
        assert!(overlays.marker(first).is_none());
        assert_eq!(overlays.marker(second).unwrap().position.lat, 2.0);
    }

    #[test]
    fn test_groups_replace_as_a_whole() {
        let mut overlays = Overlays::new();
        overlays.replace_group(
            MarkerKind::Search,
            vec![marker(MarkerKind::Search, 1.0), marker(MarkerKind::Search, 2.0)],
        );
        overlays.replace_group(MarkerKind::Poi, vec![marker(MarkerKind::Poi, 5.0)]);
        overlays.replace_group(MarkerKind::Search, vec![marker(MarkerKind::Search, 3.0)]);

        let search: Vec<f64> = overlays
            .of_kind(MarkerKind::Search)
            .map(|m| m.position.lat)
            .collect();
        assert_eq!(search, vec![3.0]);
        assert_eq!(overlays.of_kind(MarkerKind::Poi).count(), 1);

        let draw_order: Vec<MarkerKind> = overlays.markers().iter().map(|m| m.kind).collect();
        assert_eq!(draw_order, vec![MarkerKind::Poi, MarkerKind::Search]);
    }

    #[test]
    fn test_route_and_bounds() {
        let mut overlays = Overlays::new();
        assert!(overlays.bounds().is_none());

        overlays.set_marker(marker(MarkerKind::RouteStart, 10.0));
        overlays.set_marker(marker(MarkerKind::RouteEnd, 20.0));
        overlays.set_marker(marker(MarkerKind::Picked, 0.0));
        overlays.set_route(RouteLine {
            points: vec![LatLng::new(10.0, 0.0), LatLng::new(30.0, 5.0)],
            summary: "1 km, 2 min".to_string(),
        });

        let bounds = overlays.bounds().unwrap();
        assert_eq!(bounds.south_west, LatLng::new(0.0, 0.0));
        assert_eq!(bounds.north_east, LatLng::new(30.0, 5.0));

        overlays.clear_route();
        assert!(overlays.route().is_none());
        assert_eq!(overlays.len(), 1);

        overlays.clear();
        assert!(overlays.is_empty());
    }
}

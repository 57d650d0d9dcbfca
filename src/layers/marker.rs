use crate::core::geo::LatLng;
use crate::ui::popup::PopupContent;
use serde::{Deserialize, Serialize};

/// What a marker stands for; decides its icon and replacement rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarkerKind {
    Search,
    Location,
    Picked,
    RouteStart,
    RouteEnd,
    Poi,
}

impl MarkerKind {
    /// Kinds that exist at most once on the map
    pub fn is_single(&self) -> bool {
        matches!(
            self,
            MarkerKind::Location | MarkerKind::Picked | MarkerKind::RouteStart | MarkerKind::RouteEnd
        )
    }

    /// Draw order, lowest first
    pub fn z_index(&self) -> u8 {
        match self {
            MarkerKind::Poi => 0,
            MarkerKind::Search => 1,
            MarkerKind::Picked => 2,
            MarkerKind::RouteStart | MarkerKind::RouteEnd => 3,
            MarkerKind::Location => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub id: u64,
    pub kind: MarkerKind,
    pub position: LatLng,
    pub title: String,
    pub popup: Option<PopupContent>,
}

impl Marker {
    /// The id is assigned when the marker is added to [`Overlays`](super::overlays::Overlays)
    pub fn new(kind: MarkerKind, position: LatLng, title: impl Into<String>) -> Self {
        Self {
            id: 0,
            kind,
            position,
            title: title.into(),
            popup: None,
        }
    }

    pub fn with_popup(mut self, popup: PopupContent) -> Self {
        self.popup = Some(popup);
        self
    }
}

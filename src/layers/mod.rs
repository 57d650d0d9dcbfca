//! Markers and the route line drawn over the tiles.

pub mod icon;
pub mod marker;
pub mod overlays;

pub use icon::MarkerIcon;
pub use marker::{Marker, MarkerKind};
pub use overlays::{Overlays, RouteLine};

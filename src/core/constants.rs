//! Core constants derived from Leaflet defaults and common web-map conventions.
//! Keeping them in a single place makes it easier to tweak engine-wide magic numbers.

/// Default square tile size in pixels.
pub const TILE_SIZE: u32 = 256;

/// Web Mercator sphere radius in metres.
pub const EARTH_RADIUS: f64 = 6378137.0;

/// Latitude limit of the Web Mercator projection.
pub const MAX_LATITUDE: f64 = 85.0511287798;

/// Zoom used when fitting the view to a single point.
pub const DEFAULT_POINT_ZOOM: f64 = 16.0;

/// Zoom used after a successful geolocation.
pub const LOCATE_ZOOM: f64 = 15.0;

/// Programmatic +/- zoom step when calling `zoom_in/zoom_out`.
pub const DEFAULT_ZOOM_DELTA: f64 = 1.0;

/// Padding in pixels kept around bounds when fitting the view.
pub const FIT_PADDING: f64 = 40.0;

/// Marker icon default size (regular PNG).
pub const MARKER_ICON_SIZE: (u32, u32) = (25, 41);

/// Anchor inside the icon (hot-spot) in pixel coords.
pub const MARKER_ICON_ANCHOR: (u32, u32) = (12, 41);

/// Largest radius accepted by the Overpass POI search, in metres.
pub const MAX_POI_RADIUS_M: f64 = 50_000.0;

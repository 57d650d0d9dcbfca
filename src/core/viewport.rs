use crate::core::constants::{DEFAULT_POINT_ZOOM, TILE_SIZE};
use crate::core::geo::{LatLng, LatLngBounds, Point, TileCoord};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Manages the current view of the map: center, zoom, and screen dimensions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// The center of the map view in geographical coordinates
    pub center: LatLng,
    /// The current zoom level
    pub zoom: f64,
    /// The size of the viewport in pixels
    pub size: Point,
    /// The minimum allowed zoom level
    pub min_zoom: f64,
    /// The maximum allowed zoom level
    pub max_zoom: f64,
}

impl Viewport {
    /// Creates a new viewport
    pub fn new(center: LatLng, zoom: f64, size: Point) -> Self {
        Self {
            center,
            zoom: zoom.clamp(0.0, 19.0),
            size,
            min_zoom: 0.0,
            max_zoom: 19.0,
        }
    }

    /// Sets the center of the viewport, clamping latitude to the projection
    pub fn set_center(&mut self, center: LatLng) {
        self.center = LatLng::new(LatLng::clamp_lat(center.lat), LatLng::wrap_lng(center.lng));
    }

    /// Sets the zoom level, clamping to valid range
    pub fn set_zoom(&mut self, zoom: f64) {
        self.zoom = zoom.clamp(self.min_zoom, self.max_zoom);
    }

    /// Sets center and zoom in one go
    pub fn set_view(&mut self, center: LatLng, zoom: f64) {
        self.set_center(center);
        self.set_zoom(zoom);
    }

    /// Sets the viewport size
    pub fn set_size(&mut self, size: Point) {
        self.size = size;
    }

    /// Sets the zoom limits
    pub fn set_zoom_limits(&mut self, min_zoom: f64, max_zoom: f64) {
        self.min_zoom = min_zoom;
        self.max_zoom = max_zoom.max(min_zoom);
        self.zoom = self.zoom.clamp(self.min_zoom, self.max_zoom);
    }

    /// Projects a LatLng to world pixel coordinates at the given zoom level
    /// (Web Mercator, EPSG:3857)
    pub fn project(&self, lat_lng: &LatLng, zoom: Option<f64>) -> Point {
        let scale = world_size(zoom.unwrap_or(self.zoom));
        let lat_rad = LatLng::clamp_lat(lat_lng.lat).to_radians();

        let x = (lat_lng.lng + 180.0) / 360.0 * scale;
        let y = (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0 * scale;
        Point::new(x, y)
    }

    /// Unprojects world pixel coordinates back to LatLng at the given zoom level
    pub fn unproject(&self, pixel: &Point, zoom: Option<f64>) -> LatLng {
        let scale = world_size(zoom.unwrap_or(self.zoom));

        let lng = pixel.x / scale * 360.0 - 180.0;
        let n = PI - 2.0 * PI * pixel.y / scale;
        let lat = n.sinh().atan().to_degrees();
        LatLng::new(lat, lng)
    }

    /// Converts a geographical coordinate to container pixel coordinates
    /// (top-left origin)
    pub fn lat_lng_to_pixel(&self, lat_lng: &LatLng) -> Point {
        let world = self.project(lat_lng, None);
        let center = self.project(&self.center, None);
        Point::new(
            world.x - center.x + self.size.x / 2.0,
            world.y - center.y + self.size.y / 2.0,
        )
    }

    /// Converts container pixel coordinates back to geographical coordinates
    pub fn pixel_to_lat_lng(&self, pixel: &Point) -> LatLng {
        let center = self.project(&self.center, None);
        let world = Point::new(
            pixel.x - self.size.x / 2.0 + center.x,
            pixel.y - self.size.y / 2.0 + center.y,
        );
        self.unproject(&world, None)
    }

    /// Pans the viewport by a screen-pixel delta (drag semantics: the map
    /// content follows the pointer)
    pub fn pan(&mut self, delta: Point) {
        let center = self.project(&self.center, None);
        let moved = center.subtract(&delta);
        let new_center = self.unproject(&moved, None);
        self.set_center(new_center);
    }

    /// Zooms the viewport, keeping the coordinate under `focus_point` fixed
    pub fn zoom_to(&mut self, zoom: f64, focus_point: Option<Point>) {
        let new_zoom = zoom.clamp(self.min_zoom, self.max_zoom);
        if (new_zoom - self.zoom).abs() < 0.001 {
            return;
        }

        match focus_point {
            Some(focus) => {
                let focus_lat_lng = self.pixel_to_lat_lng(&focus);
                self.zoom = new_zoom;

                let focus_world = self.project(&focus_lat_lng, None);
                let center_world = Point::new(
                    focus_world.x - (focus.x - self.size.x / 2.0),
                    focus_world.y - (focus.y - self.size.y / 2.0),
                );
                let center = self.unproject(&center_world, None);
                self.set_center(center);
            }
            None => self.zoom = new_zoom,
        }
    }

    /// Centers the view on `bounds` using the largest whole zoom at which they
    /// fit inside the viewport minus `padding` on every side
    pub fn fit_bounds(&mut self, bounds: &LatLngBounds, padding: f64) {
        let center = bounds.center();
        if bounds.is_point() {
            self.set_view(center, DEFAULT_POINT_ZOOM.min(self.max_zoom));
            return;
        }

        let available = Point::new(
            (self.size.x - 2.0 * padding).max(1.0),
            (self.size.y - 2.0 * padding).max(1.0),
        );
        let nw = LatLng::new(bounds.north_east.lat, bounds.south_west.lng);
        let se = LatLng::new(bounds.south_west.lat, bounds.north_east.lng);

        let mut zoom = self.max_zoom.floor();
        while zoom > self.min_zoom {
            let a = self.project(&nw, Some(zoom));
            let b = self.project(&se, Some(zoom));
            if (b.x - a.x).abs() <= available.x && (b.y - a.y).abs() <= available.y {
                break;
            }
            zoom -= 1.0;
        }

        self.set_view(center, zoom.max(self.min_zoom));
    }

    /// Whole zoom level tiles are requested at
    pub fn tile_zoom(&self) -> u8 {
        self.zoom.round().clamp(0.0, self.max_zoom.max(0.0)) as u8
    }

    /// Tiles covering the viewport at [`Self::tile_zoom`], nearest to the
    /// center first
    pub fn visible_tiles(&self) -> Vec<TileCoord> {
        let z = self.tile_zoom();
        let tile_size = TILE_SIZE as f64;
        let ratio = 2_f64.powf(self.zoom - z as f64);
        let center = self.project(&self.center, Some(z as f64));
        let half_w = self.size.x / 2.0 / ratio;
        let half_h = self.size.y / 2.0 / ratio;

        let max_index = 2_i64.pow(z as u32) - 1;
        let min_x = (((center.x - half_w) / tile_size).floor() as i64).clamp(0, max_index);
        let max_x = (((center.x + half_w) / tile_size).floor() as i64).clamp(0, max_index);
        let min_y = (((center.y - half_h) / tile_size).floor() as i64).clamp(0, max_index);
        let max_y = (((center.y + half_h) / tile_size).floor() as i64).clamp(0, max_index);

        let center_tile = Point::new(center.x / tile_size, center.y / tile_size);
        let mut tiles = Vec::with_capacity(((max_x - min_x + 1) * (max_y - min_y + 1)) as usize);
        for x in min_x..=max_x {
            for y in min_y..=max_y {
                tiles.push(TileCoord::new(x as u32, y as u32, z));
            }
        }

        tiles.sort_by(|a, b| {
            let da = Point::new(a.x as f64 + 0.5, a.y as f64 + 0.5).distance_to(&center_tile);
            let db = Point::new(b.x as f64 + 0.5, b.y as f64 + 0.5).distance_to(&center_tile);
            da.total_cmp(&db)
        });
        tiles
    }

    /// Screen rectangle (min, max) of a tile at the current fractional zoom
    pub fn tile_screen_bounds(&self, coord: &TileCoord) -> (Point, Point) {
        let ratio = 2_f64.powf(self.zoom - coord.z as f64);
        let tile_px = TILE_SIZE as f64 * ratio;
        let center = self.project(&self.center, None);

        let min = Point::new(
            coord.x as f64 * tile_px - center.x + self.size.x / 2.0,
            coord.y as f64 * tile_px - center.y + self.size.y / 2.0,
        );
        (min, Point::new(min.x + tile_px, min.y + tile_px))
    }

    /// Geographic bounds currently on screen
    pub fn bounds(&self) -> LatLngBounds {
        let nw = self.pixel_to_lat_lng(&Point::new(0.0, 0.0));
        let se = self.pixel_to_lat_lng(&self.size);
        LatLngBounds::new(LatLng::new(se.lat, nw.lng), LatLng::new(nw.lat, se.lng))
    }
}

fn world_size(zoom: f64) -> f64 {
    TILE_SIZE as f64 * 2_f64.powf(zoom)
}

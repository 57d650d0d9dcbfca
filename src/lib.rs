//! # mapscout
//!
//! An offline-capable map client library inspired by Leaflet.
//!
//! The crate renders slippy-map tiles, searches places through a geocoder,
//! requests driving directions, discovers nearby points of interest and keeps
//! everything it has fetched available offline. All outbound requests go
//! through [`offline::OfflineWorker`], a versioned, request-intercepting cache
//! with an install → activate → intercept lifecycle.

pub mod core;
pub mod layers;
pub mod offline;
pub mod prelude;
pub mod runtime;
pub mod services;
pub mod session;
pub mod tiles;
pub mod ui;
pub use crate::core::constants;

// Re-export public API
pub use core::{
    config::AppConfig,
    geo::{LatLng, LatLngBounds, Point, TileCoord},
    viewport::Viewport,
};

pub use offline::{
    network::{Fetcher, HttpFetcher},
    request::{Request, Response},
    worker::{OfflineWorker, WorkerRegistry, WorkerState},
};

pub use services::{
    geocoder::{Geocoder, Place},
    geolocation::{LocationProvider, Position},
    overpass::{Overpass, Poi, PoiCategory},
    routing::{Route, Router},
};

pub use layers::{marker::Marker, overlays::Overlays};

pub use session::{Alert, MapSession, SessionHandle};

pub use tiles::{cache::TileCache, loader::TileLoader, source::TileSource};

#[cfg(feature = "egui")]
pub use ui::widget::MapView;

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, MapError>;

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("Offline: {0} is not cached and the network is unreachable")]
    Offline(String),

    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    #[error("Offline cache install failed: {0}")]
    InstallFailed(String),

    #[error("Invalid worker state: expected {expected}, found {found}")]
    InvalidState { expected: String, found: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid coordinates: {0}")]
    InvalidCoordinates(String),

    #[error("No route found: {0}")]
    NoRoute(String),

    #[error("Geolocation failed: {0}")]
    Geolocation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Error type alias for convenience
pub type Error = MapError;

/// Initialise `env_logger` from `RUST_LOG`. Safe to call more than once.
#[cfg(feature = "debug")]
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("mapscout=info"),
    )
    .try_init();
}

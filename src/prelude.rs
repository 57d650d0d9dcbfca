//! Prelude module for common mapscout types and traits
//!
//! `use mapscout::prelude::*;` brings in the geographic primitives, the
//! offline layer, the service clients and the session controller.

pub use crate::core::{
    config::{AppConfig, OfflineConfig, PoiConfig, ServiceConfig, TileConfig},
    geo::{LatLng, LatLngBounds, Point, TileCoord},
    viewport::Viewport,
};

pub use crate::offline::{
    Cache, CacheStore, DiskStore, Fetcher, HttpFetcher, MemoryStore, OfflineFetcher,
    OfflineWorker, Request, Response, WorkerRegistry, WorkerState,
};

pub use crate::services::{
    geocoder::{Geocoder, Place},
    geolocation::{FixedLocation, IpLocation, LocationProvider, Position},
    overpass::{Overpass, Poi, PoiCategory},
    routing::{Route, RouteStep, Router},
};

pub use crate::layers::{
    icon::MarkerIcon,
    marker::{Marker, MarkerKind},
    overlays::{Overlays, RouteLine},
};

pub use crate::session::{Alert, MapSession, SessionHandle};
pub use crate::tiles::{TemplateSource, TileCache, TileLoader, TileSource};
pub use crate::ui::popup::{Popup, PopupContent};

pub use crate::{Error, MapError, Result};

pub use std::sync::{Arc, Mutex, RwLock};
pub use std::time::{Duration, Instant};

pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet};

pub use futures::future::BoxFuture;
pub use std::future::Future;
pub use std::pin::Pin;

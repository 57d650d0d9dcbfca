//! The map session: user intents in, map state out.
//!
//! Each operation runs in two halves. [`MapSession::prepare`] does the
//! synchronous part (placing a marker, validating input, taking a ticket)
//! and returns a [`PendingRequest`]; the service call runs somewhere else;
//! [`MapSession::apply`] folds the [`Completion`] back into the map. Only the
//! newest ticket of each [`RequestKind`] is honoured, so a slow answer to an
//! older search never overwrites a newer one.
//!
//! The async methods (`search`, `locate`, ...) chain both halves for callers
//! that can await. [`SessionHandle`] runs the service half on the background
//! runtime and hands completions back over a channel for a frame loop.

use crate::core::config::{AppConfig, PoiConfig};
use crate::core::constants::{FIT_PADDING, LOCATE_ZOOM};
use crate::core::geo::{LatLng, LatLngBounds, Point};
use crate::core::viewport::Viewport;
use crate::layers::marker::{Marker, MarkerKind};
use crate::layers::overlays::{Overlays, RouteLine};
use crate::offline::Fetcher;
use crate::prelude::{Arc, HashMap};
use crate::runtime;
use crate::services::geocoder::{Geocoder, Place};
use crate::services::geolocation::{LocationProvider, Position};
use crate::services::overpass::{Overpass, Poi, PoiCategory};
use crate::services::routing::{Route, Router};
use crate::ui::popup::{Popup, PopupContent};
use crate::{Error, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};

/// A message for the user; the only way failures surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub message: String,
}

impl Alert {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Search,
    Locate,
    Reverse,
    Directions,
    Nearby,
}

/// Something the user asked for that needs a service call
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Search(String),
    Locate,
    PickPoint(LatLng),
    Directions,
    FindNearby(PoiCategory),
}

/// The service half of a command, with everything captured up front
#[derive(Debug, Clone, PartialEq)]
pub enum Job {
    Search(String),
    Locate,
    Reverse(LatLng),
    Directions { from: LatLng, to: LatLng },
    Nearby { center: LatLng, category: PoiCategory },
}

impl Job {
    pub fn kind(&self) -> RequestKind {
        match self {
            Job::Search(_) => RequestKind::Search,
            Job::Locate => RequestKind::Locate,
            Job::Reverse(_) => RequestKind::Reverse,
            Job::Directions { .. } => RequestKind::Directions,
            Job::Nearby { .. } => RequestKind::Nearby,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingRequest {
    pub ticket: u64,
    pub job: Job,
}

#[derive(Debug)]
pub enum Outcome {
    Search {
        query: String,
        result: Result<Vec<Place>>,
    },
    Located(Result<Position>),
    Reverse {
        at: LatLng,
        result: Result<Option<Place>>,
    },
    Directions(Result<Route>),
    Nearby {
        center: LatLng,
        category: PoiCategory,
        result: Result<Vec<Poi>>,
    },
}

#[derive(Debug)]
pub struct Completion {
    pub ticket: u64,
    pub kind: RequestKind,
    pub outcome: Outcome,
}

/// The remote clients a session talks to
#[derive(Clone)]
pub struct Services {
    pub geocoder: Geocoder,
    pub router: Router,
    pub overpass: Overpass,
    pub locator: Arc<dyn LocationProvider>,
    poi: PoiConfig,
}

impl Services {
    pub fn new(
        config: &AppConfig,
        fetcher: Arc<dyn Fetcher>,
        locator: Arc<dyn LocationProvider>,
    ) -> Self {
        let services = &config.services;
        Self {
            geocoder: Geocoder::new(services.geocoder_url.clone(), fetcher.clone())
                .with_limit(config.search.limit),
            router: Router::new(services.routing_url.clone(), fetcher.clone()),
            overpass: Overpass::new(services.overpass_url.clone(), fetcher)
                .with_limit(config.poi.limit),
            locator,
            poi: config.poi.clone(),
        }
    }

    /// Run the service half of a request
    pub async fn run(&self, request: PendingRequest) -> Completion {
        let kind = request.job.kind();
        let outcome = match request.job {
            Job::Search(query) => {
                let result = self.geocoder.search(&query).await;
                Outcome::Search { query, result }
            }
            Job::Locate => Outcome::Located(self.locator.locate().await),
            Job::Reverse(at) => Outcome::Reverse {
                at,
                result: self.geocoder.reverse(at).await,
            },
            Job::Directions { from, to } => Outcome::Directions(self.router.route(from, to).await),
            Job::Nearby { center, category } => Outcome::Nearby {
                center,
                category,
                result: self.overpass.nearby(center, self.poi.radius_m, category).await,
            },
        };
        Completion {
            ticket: request.ticket,
            kind,
            outcome,
        }
    }
}

/// Map state plus the controller logic behind every user action
pub struct MapSession {
    viewport: Viewport,
    overlays: Overlays,
    popup: Option<Popup>,
    alert: Option<Alert>,
    route_start: Option<LatLng>,
    route_end: Option<LatLng>,
    services: Services,
    in_flight: HashMap<RequestKind, u64>,
    next_ticket: u64,
}

impl MapSession {
    pub fn new(config: &AppConfig, services: Services) -> Self {
        let mut viewport = Viewport::new(config.view.center, config.view.zoom, Point::new(800.0, 600.0));
        viewport.set_zoom_limits(config.tiles.min_zoom as f64, config.tiles.max_zoom as f64);
        Self {
            viewport,
            overlays: Overlays::new(),
            popup: None,
            alert: None,
            route_start: None,
            route_end: None,
            services,
            in_flight: HashMap::default(),
            next_ticket: 0,
        }
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn viewport_mut(&mut self) -> &mut Viewport {
        &mut self.viewport
    }

    pub fn overlays(&self) -> &Overlays {
        &self.overlays
    }

    pub fn popup(&self) -> Option<&Popup> {
        self.popup.as_ref().filter(|p| p.is_open())
    }

    pub fn alert(&self) -> Option<&Alert> {
        self.alert.as_ref()
    }

    pub fn dismiss_alert(&mut self) -> Option<Alert> {
        self.alert.take()
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn route_endpoints(&self) -> (Option<LatLng>, Option<LatLng>) {
        (self.route_start, self.route_end)
    }

    pub fn is_busy(&self, kind: RequestKind) -> bool {
        self.in_flight.contains_key(&kind)
    }

    fn raise(&mut self, message: impl Into<String>) {
        let alert = Alert::new(message);
        log::warn!("alert: {}", alert.message);
        self.alert = Some(alert);
    }

    fn open_popup(&mut self, anchor: LatLng, content: PopupContent) {
        let mut popup = Popup::new(anchor, content);
        popup.open();
        self.popup = Some(popup);
    }

    pub fn close_popup(&mut self) {
        if let Some(popup) = self.popup.as_mut() {
            popup.close();
        }
    }

    /// Open the popup of a marker, if it has one
    pub fn select_marker(&mut self, id: u64) -> bool {
        let Some((position, content)) = self
            .overlays
            .marker(id)
            .and_then(|m| Some((m.position, m.popup.clone()?)))
        else {
            return false;
        };
        self.open_popup(position, content);
        true
    }

    fn fit(&mut self, bounds: Option<LatLngBounds>) {
        if let Some(bounds) = bounds {
            self.viewport.fit_bounds(&bounds, FIT_PADDING);
        }
    }

    /// Take a fresh ticket for `job`; any older ticket of the same kind
    /// becomes stale
    fn issue(&mut self, job: Job) -> PendingRequest {
        self.next_ticket += 1;
        self.in_flight.insert(job.kind(), self.next_ticket);
        PendingRequest {
            ticket: self.next_ticket,
            job,
        }
    }

    /// Place the start marker. Any drawn route is dropped.
    pub fn set_route_start(&mut self, at: LatLng) {
        self.route_start = Some(at);
        self.set_endpoint(MarkerKind::RouteStart, at, "Start");
    }

    pub fn set_route_end(&mut self, at: LatLng) {
        self.route_end = Some(at);
        self.set_endpoint(MarkerKind::RouteEnd, at, "Destination");
    }

    fn set_endpoint(&mut self, kind: MarkerKind, at: LatLng, title: &str) {
        let content = PopupContent::new(title).line(at.to_display());
        self.overlays
            .set_marker(Marker::new(kind, at, title).with_popup(content));
        if self.overlays.take_route().is_some() {
            log::debug!("route endpoint moved, dropping the drawn route");
        }
    }

    /// Synchronous half of a command. `None` when nothing needs to be
    /// fetched, e.g. the input was rejected with an alert.
    pub fn prepare(&mut self, command: Command) -> Option<PendingRequest> {
        match command {
            Command::Search(query) => {
                let query = query.trim().to_string();
                if query.is_empty() {
                    self.raise("Enter a place to search for");
                    return None;
                }
                Some(self.issue(Job::Search(query)))
            }
            Command::Locate => Some(self.issue(Job::Locate)),
            Command::PickPoint(at) => {
                if !at.is_valid() {
                    self.raise(format!("{} is not a valid location", at.to_display()));
                    return None;
                }
                let content = PopupContent::picked(at, None);
                self.overlays.set_marker(
                    Marker::new(MarkerKind::Picked, at, "Selected point").with_popup(content.clone()),
                );
                self.open_popup(at, content);
                Some(self.issue(Job::Reverse(at)))
            }
            Command::Directions => match (self.route_start, self.route_end) {
                (Some(from), Some(to)) => Some(self.issue(Job::Directions { from, to })),
                (None, _) => {
                    self.raise("Choose a starting point first");
                    None
                }
                (_, None) => {
                    self.raise("Choose a destination first");
                    None
                }
            },
            Command::FindNearby(category) => Some(self.issue(Job::Nearby {
                center: self.viewport.center,
                category,
            })),
        }
    }

    /// Fold a finished request into the map. Returns false when the
    /// completion was stale and ignored.
    pub fn apply(&mut self, completion: Completion) -> bool {
        if self.in_flight.get(&completion.kind) != Some(&completion.ticket) {
            log::debug!(
                "discarding stale {:?} result (ticket {})",
                completion.kind,
                completion.ticket
            );
            return false;
        }
        self.in_flight.remove(&completion.kind);

        match completion.outcome {
            Outcome::Search { query, result } => self.apply_search(&query, result),
            Outcome::Located(result) => self.apply_location(result),
            Outcome::Reverse { at, result } => self.apply_reverse(at, result),
            Outcome::Directions(result) => self.apply_directions(result),
            Outcome::Nearby {
                center,
                category,
                result,
            } => self.apply_nearby(center, category, result),
        }
        true
    }

    fn apply_search(&mut self, query: &str, result: Result<Vec<Place>>) {
        let places = match result {
            Ok(places) => places,
            Err(e) => return self.raise(format!("Search failed: {}", e)),
        };
        if places.is_empty() {
            self.overlays.remove_kind(MarkerKind::Search);
            return self.raise(format!("No results for \"{}\"", query));
        }

        let markers = places
            .iter()
            .map(|place| {
                Marker::new(MarkerKind::Search, place.location, place.name.clone())
                    .with_popup(PopupContent::place(place))
            })
            .collect();
        self.overlays.replace_group(MarkerKind::Search, markers);

        let first = &places[0];
        self.open_popup(first.location, PopupContent::place(first));
        let bounds = if places.len() == 1 {
            first.bounds.or_else(|| LatLngBounds::from_points(&[first.location]))
        } else {
            let points: Vec<LatLng> = places.iter().map(|p| p.location).collect();
            LatLngBounds::from_points(&points)
        };
        self.fit(bounds);
    }

    fn apply_location(&mut self, result: Result<Position>) {
        let position = match result {
            Ok(position) => position,
            Err(e) => return self.raise(format!("Could not find your location: {}", e)),
        };
        let content = PopupContent::location(&position);
        self.overlays.set_marker(
            Marker::new(MarkerKind::Location, position.location, "You are here")
                .with_popup(content.clone()),
        );
        self.viewport.set_view(position.location, LOCATE_ZOOM);
        self.open_popup(position.location, content);
    }

    /// A failed lookup leaves the coordinates-only popup in place
    fn apply_reverse(&mut self, at: LatLng, result: Result<Option<Place>>) {
        let place = match result {
            Ok(Some(place)) => place,
            Ok(None) => return,
            Err(e) => {
                log::warn!("reverse geocoding {} failed: {}", at.to_display(), e);
                return;
            }
        };
        let content = PopupContent::picked(at, Some(&place));
        self.overlays.set_marker(
            Marker::new(MarkerKind::Picked, at, place.name.clone()).with_popup(content.clone()),
        );
        if self.popup.as_ref().map_or(false, |p| p.anchor == at && p.is_open()) {
            self.open_popup(at, content);
        }
    }

    fn apply_directions(&mut self, result: Result<Route>) {
        let route = match result {
            Ok(route) => route,
            Err(e @ Error::NoRoute(_)) => return self.raise(e.to_string()),
            Err(e) => return self.raise(format!("Directions failed: {}", e)),
        };
        let bounds = route.bounds();
        let anchor = route
            .geometry
            .last()
            .copied()
            .or(self.route_end)
            .unwrap_or(self.viewport.center);

        self.overlays.set_route(RouteLine {
            points: route.geometry.clone(),
            summary: route.summary(),
        });
        self.open_popup(anchor, PopupContent::route(&route));
        self.fit(bounds);
    }

    fn apply_nearby(&mut self, center: LatLng, category: PoiCategory, result: Result<Vec<Poi>>) {
        let pois = match result {
            Ok(pois) => pois,
            Err(e) => return self.raise(format!("Nearby search failed: {}", e)),
        };
        if pois.is_empty() {
            self.overlays.remove_kind(MarkerKind::Poi);
            return self.raise(format!("No {} found nearby", category.label().to_lowercase()));
        }

        let markers = pois
            .iter()
            .map(|poi| {
                Marker::new(MarkerKind::Poi, poi.location, poi.title()).with_popup(PopupContent::poi(poi))
            })
            .collect();
        self.overlays.replace_group(MarkerKind::Poi, markers);

        let points: Vec<LatLng> = std::iter::once(center)
            .chain(pois.iter().map(|p| p.location))
            .collect();
        self.fit(LatLngBounds::from_points(&points));
    }

    /// Drop every overlay, popup, alert and route endpoint. Requests still
    /// in flight are forgotten, so their results are discarded.
    pub fn clear(&mut self) {
        self.overlays.clear();
        self.popup = None;
        self.alert = None;
        self.route_start = None;
        self.route_end = None;
        self.in_flight.clear();
    }

    async fn execute(&mut self, command: Command) -> bool {
        let Some(request) = self.prepare(command) else {
            return false;
        };
        let completion = self.services.run(request).await;
        self.apply(completion)
    }

    pub async fn search(&mut self, query: &str) -> bool {
        self.execute(Command::Search(query.to_string())).await
    }

    pub async fn locate(&mut self) -> bool {
        self.execute(Command::Locate).await
    }

    pub async fn pick_point(&mut self, at: LatLng) -> bool {
        self.execute(Command::PickPoint(at)).await
    }

    pub async fn request_directions(&mut self) -> bool {
        self.execute(Command::Directions).await
    }

    pub async fn find_nearby(&mut self, category: PoiCategory) -> bool {
        self.execute(Command::FindNearby(category)).await
    }
}

/// Runs session requests on the background runtime for a frame loop
pub struct SessionHandle {
    session: MapSession,
    tx: Sender<Completion>,
    rx: Receiver<Completion>,
}

impl SessionHandle {
    pub fn new(session: MapSession) -> Self {
        let (tx, rx) = unbounded();
        Self { session, tx, rx }
    }

    pub fn session(&self) -> &MapSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut MapSession {
        &mut self.session
    }

    /// Start a command; its result arrives through [`Self::poll`]
    pub fn dispatch(&mut self, command: Command) {
        let Some(request) = self.session.prepare(command) else {
            return;
        };
        let services = self.session.services.clone();
        let tx = self.tx.clone();
        runtime::spawn(async move {
            let completion = services.run(request).await;
            let _ = tx.send(completion);
        });
    }

    /// Apply whatever finished since the last call. Returns how many
    /// completions changed the map.
    pub fn poll(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(completion) = self.rx.try_recv() {
            if self.session.apply(completion) {
                applied += 1;
            }
        }
        applied
    }

    /// True while any request is outstanding
    pub fn is_loading(&self) -> bool {
        !self.session.in_flight.is_empty()
    }
}

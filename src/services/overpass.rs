//! Points of interest around a location, from the Overpass API.

use super::fetch_json;
use crate::core::constants::MAX_POI_RADIUS_M;
use crate::core::geo::LatLng;
use crate::offline::{Fetcher, Request};
use crate::prelude::{Arc, HashMap};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What to look for; each maps to one OSM tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoiCategory {
    Restaurant,
    Cafe,
    Bar,
    Fuel,
    Parking,
    Hospital,
    Pharmacy,
    Atm,
    Toilets,
    Hotel,
    Museum,
    Attraction,
    Supermarket,
}

impl PoiCategory {
    pub const ALL: [PoiCategory; 13] = [
        PoiCategory::Restaurant,
        PoiCategory::Cafe,
        PoiCategory::Bar,
        PoiCategory::Fuel,
        PoiCategory::Parking,
        PoiCategory::Hospital,
        PoiCategory::Pharmacy,
        PoiCategory::Atm,
        PoiCategory::Toilets,
        PoiCategory::Hotel,
        PoiCategory::Museum,
        PoiCategory::Attraction,
        PoiCategory::Supermarket,
    ];

    /// `(key, value)` of the OSM tag
    pub fn tag(&self) -> (&'static str, &'static str) {
        match self {
            PoiCategory::Restaurant => ("amenity", "restaurant"),
            PoiCategory::Cafe => ("amenity", "cafe"),
            PoiCategory::Bar => ("amenity", "bar"),
            PoiCategory::Fuel => ("amenity", "fuel"),
            PoiCategory::Parking => ("amenity", "parking"),
            PoiCategory::Hospital => ("amenity", "hospital"),
            PoiCategory::Pharmacy => ("amenity", "pharmacy"),
            PoiCategory::Atm => ("amenity", "atm"),
            PoiCategory::Toilets => ("amenity", "toilets"),
            PoiCategory::Hotel => ("tourism", "hotel"),
            PoiCategory::Museum => ("tourism", "museum"),
            PoiCategory::Attraction => ("tourism", "attraction"),
            PoiCategory::Supermarket => ("shop", "supermarket"),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PoiCategory::Restaurant => "Restaurant",
            PoiCategory::Cafe => "Café",
            PoiCategory::Bar => "Bar",
            PoiCategory::Fuel => "Fuel station",
            PoiCategory::Parking => "Parking",
            PoiCategory::Hospital => "Hospital",
            PoiCategory::Pharmacy => "Pharmacy",
            PoiCategory::Atm => "ATM",
            PoiCategory::Toilets => "Toilets",
            PoiCategory::Hotel => "Hotel",
            PoiCategory::Museum => "Museum",
            PoiCategory::Attraction => "Attraction",
            PoiCategory::Supermarket => "Supermarket",
        }
    }
}

impl fmt::Display for PoiCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag().1)
    }
}

impl FromStr for PoiCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        PoiCategory::ALL
            .into_iter()
            .find(|c| c.tag().1 == wanted)
            .ok_or_else(|| Error::InvalidInput(format!("unknown POI category {:?}", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Node,
    Way,
    Relation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Poi {
    pub id: u64,
    pub kind: ElementKind,
    pub location: LatLng,
    pub name: Option<String>,
    pub category: PoiCategory,
    pub tags: HashMap<String, String>,
    pub distance_m: f64,
}

impl Poi {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// The name, or the category label for unnamed features
    pub fn title(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.category.label().to_string())
    }
}

#[derive(Debug, Deserialize)]
struct OverpassResponse {
    #[serde(default)]
    elements: Vec<RawElement>,
}

#[derive(Debug, Deserialize)]
struct RawElement {
    #[serde(rename = "type")]
    kind: ElementKind,
    id: u64,
    lat: Option<f64>,
    lon: Option<f64>,
    /// Ways and relations carry a center when queried with `out center`
    center: Option<RawCenter>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct RawCenter {
    lat: f64,
    lon: f64,
}

impl RawElement {
    fn location(&self) -> Option<LatLng> {
        match (self.lat, self.lon, &self.center) {
            (Some(lat), Some(lon), _) => Some(LatLng::new(lat, lon)),
            (_, _, Some(c)) => Some(LatLng::new(c.lat, c.lon)),
            _ => None,
        }
    }
}

/// Overpass QL for one category around a point
pub fn build_query(center: LatLng, radius_m: f64, category: PoiCategory, limit: usize) -> String {
    let (key, value) = category.tag();
    let around = format!("around:{},{:.6},{:.6}", radius_m.round(), center.lat, center.lng);
    format!(
        "[out:json][timeout:25];(node[\"{key}\"=\"{value}\"]({around});way[\"{key}\"=\"{value}\"]({around}););out center {limit};"
    )
}

/// Overpass API client
#[derive(Clone)]
pub struct Overpass {
    url: String,
    limit: usize,
    fetcher: Arc<dyn Fetcher>,
}

impl Overpass {
    pub fn new(url: impl Into<String>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            url: url.into(),
            limit: 50,
            fetcher,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    /// POIs of `category` within `radius_m` of `center`, nearest first
    pub async fn nearby(
        &self,
        center: LatLng,
        radius_m: f64,
        category: PoiCategory,
    ) -> Result<Vec<Poi>> {
        if !center.is_valid() {
            return Err(Error::InvalidCoordinates(format!("{:?}", center)));
        }
        if !(radius_m > 0.0 && radius_m <= MAX_POI_RADIUS_M) {
            return Err(Error::InvalidInput(format!(
                "radius must be in (0, {}] m, got {}",
                MAX_POI_RADIUS_M, radius_m
            )));
        }

        let query = build_query(center, radius_m, category, self.limit);
        log::debug!("overpass query: {}", query);
        let request = Request::post_form(self.url.as_str(), &[("data", query.as_str())]);
        let body: OverpassResponse = fetch_json(self.fetcher.as_ref(), request).await?;

        let mut pois: Vec<Poi> = body
            .elements
            .into_iter()
            .filter_map(|element| {
                let location = element.location()?;
                Some(Poi {
                    id: element.id,
                    kind: element.kind,
                    name: element.tags.get("name").cloned(),
                    distance_m: center.distance_to(&location),
                    location,
                    category,
                    tags: element.tags,
                })
            })
            .collect();
        pois.sort_by(|a, b| a.distance_m.total_cmp(&b.distance_m));
        pois.truncate(self.limit);

        log::info!("overpass: {} {} near {:?}", pois.len(), category, center);
        Ok(pois)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offline::HttpFetcher;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_query_shape() {
        let query = build_query(LatLng::new(51.5, -0.09), 1000.0, PoiCategory::Cafe, 20);
        assert_eq!(
            query,
            "[out:json][timeout:25];(node[\"amenity\"=\"cafe\"](around:1000,51.500000,-0.090000);way[\"amenity\"=\"cafe\"](around:1000,51.500000,-0.090000););out center 20;"
        );
        assert!(build_query(LatLng::new(0.0, 0.0), 10.0, PoiCategory::Hotel, 1)
            .contains("[\"tourism\"=\"hotel\"]"));
    }

    #[test]
    fn test_category_names() {
        assert_eq!("Pharmacy".parse::<PoiCategory>().unwrap(), PoiCategory::Pharmacy);
        assert_eq!("supermarket".parse::<PoiCategory>().unwrap().tag().0, "shop");
        assert!("volcano".parse::<PoiCategory>().is_err());
    }

    #[tokio::test]
    async fn test_nearby_sorts_and_drops_elements_without_coordinates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/interpreter"))
            .and(body_string_contains("data="))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "elements": [
                    {"type": "node", "id": 1, "lat": 51.51, "lon": -0.09, "tags": {"name": "Far Cafe"}},
                    {"type": "way", "id": 2, "center": {"lat": 51.5005, "lon": -0.09}, "tags": {"amenity": "cafe"}},
                    {"type": "relation", "id": 3, "tags": {"name": "Nowhere"}}
                ]
            })))
            .mount(&server)
            .await;

        let overpass = Overpass::new(
            format!("{}/api/interpreter", server.uri()),
            Arc::new(HttpFetcher::default()),
        );
        let pois = overpass
            .nearby(LatLng::new(51.5, -0.09), 2000.0, PoiCategory::Cafe)
            .await
            .unwrap();

        assert_eq!(pois.len(), 2);
        assert_eq!(pois[0].id, 2);
        assert_eq!(pois[0].kind, ElementKind::Way);
        assert_eq!(pois[0].title(), "Café");
        assert_eq!(pois[1].name.as_deref(), Some("Far Cafe"));
        assert!(pois[0].distance_m < pois[1].distance_m);
    }

    #[tokio::test]
    async fn test_radius_bounds() {
        let overpass = Overpass::new("http://127.0.0.1:9", Arc::new(HttpFetcher::default()));
        let center = LatLng::new(51.5, -0.09);
        for radius in [0.0, -5.0, MAX_POI_RADIUS_M + 1.0, f64::NAN] {
            assert!(matches!(
                overpass.nearby(center, radius, PoiCategory::Atm).await,
                Err(Error::InvalidInput(_))
            ));
        }
    }
}

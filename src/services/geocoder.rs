//! Nominatim place search and reverse geocoding.

use super::{coord, endpoint, fetch_json};
use crate::core::geo::{LatLng, LatLngBounds};
use crate::offline::{Fetcher, Request};
use crate::prelude::Arc;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// A geocoded place
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub name: String,
    pub display_name: String,
    pub location: LatLng,
    pub bounds: Option<LatLngBounds>,
    /// `category/type` as reported by Nominatim, e.g. `tourism/attraction`
    pub category: Option<String>,
}

/// Nominatim `jsonv2` record. Coordinates and the bounding box come as
/// strings.
#[derive(Debug, Deserialize)]
struct RawPlace {
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    /// `[south, north, west, east]`
    #[serde(default)]
    boundingbox: Option<Vec<String>>,
}

impl RawPlace {
    fn into_place(self) -> Option<Place> {
        let lat = self.lat.trim().parse::<f64>().ok()?;
        let lng = self.lon.trim().parse::<f64>().ok()?;
        let location = LatLng::new(lat, lng);
        if !location.is_valid() {
            return None;
        }

        let bounds = self.boundingbox.as_deref().and_then(parse_bbox);
        let name = self
            .name
            .filter(|n| !n.trim().is_empty())
            .or_else(|| {
                self.display_name
                    .split(',')
                    .next()
                    .map(|s| s.trim().to_string())
            })
            .unwrap_or_default();
        let category = match (self.category, self.kind) {
            (Some(c), Some(k)) => Some(format!("{}/{}", c, k)),
            (c, k) => c.or(k),
        };

        Some(Place {
            name,
            display_name: self.display_name,
            location,
            bounds,
            category,
        })
    }
}

fn parse_bbox(raw: &[String]) -> Option<LatLngBounds> {
    let values: Vec<f64> = raw.iter().filter_map(|v| v.trim().parse().ok()).collect();
    match values.as_slice() {
        [south, north, west, east] => Some(LatLngBounds::from_coords(*south, *west, *north, *east)),
        _ => None,
    }
}

/// Client for a Nominatim-compatible geocoder
#[derive(Clone)]
pub struct Geocoder {
    base_url: String,
    limit: usize,
    fetcher: Arc<dyn Fetcher>,
}

impl Geocoder {
    pub fn new(base_url: impl Into<String>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            base_url: base_url.into(),
            limit: 5,
            fetcher,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    /// Forward search. Entries whose coordinates don't parse are skipped.
    pub async fn search(&self, query: &str) -> Result<Vec<Place>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::InvalidInput("search query is empty".to_string()));
        }

        let url = endpoint(
            &self.base_url,
            "search",
            &[
                ("q", query.to_string()),
                ("format", "jsonv2".to_string()),
                ("limit", self.limit.to_string()),
                ("addressdetails", "0".to_string()),
            ],
        )?;
        let raw: Vec<RawPlace> = fetch_json(self.fetcher.as_ref(), Request::get(url)).await?;
        let total = raw.len();
        let places: Vec<Place> = raw.into_iter().filter_map(RawPlace::into_place).collect();
        if places.len() < total {
            log::debug!("dropped {} results without usable coordinates", total - places.len());
        }
        log::info!("geocoder: {} result(s) for {:?}", places.len(), query);
        Ok(places)
    }

    /// Reverse lookup. `None` when nothing is there (Nominatim answers with
    /// an `error` field instead of a 404).
    pub async fn reverse(&self, at: LatLng) -> Result<Option<Place>> {
        if !at.is_valid() {
            return Err(Error::InvalidCoordinates(format!("{:?}", at)));
        }

        let url = endpoint(
            &self.base_url,
            "reverse",
            &[
                ("lat", coord(at.lat)),
                ("lon", coord(at.lng)),
                ("format", "jsonv2".to_string()),
            ],
        )?;
        let body: serde_json::Value = fetch_json(self.fetcher.as_ref(), Request::get(url)).await?;
        if let Some(message) = body.get("error") {
            log::debug!("reverse geocode at {:?}: {}", at, message);
            return Ok(None);
        }
        let raw: RawPlace = serde_json::from_value(body)?;
        Ok(raw.into_place())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offline::HttpFetcher;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn geocoder(server: &MockServer) -> Geocoder {
        Geocoder::new(server.uri(), Arc::new(HttpFetcher::default())).with_limit(3)
    }

    #[tokio::test]
    async fn test_search_parses_string_coordinates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "big ben"))
            .and(query_param("format", "jsonv2"))
            .and(query_param("limit", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {
                    "lat": "51.5007292",
                    "lon": "-0.1246254",
                    "display_name": "Big Ben, Westminster, London",
                    "name": "Big Ben",
                    "category": "tourism",
                    "type": "attraction",
                    "boundingbox": ["51.50", "51.51", "-0.13", "-0.12"]
                },
                { "lat": "garbage", "lon": "0", "display_name": "Broken" },
                { "lat": "51.0", "lon": "0.5", "display_name": "Elsewhere, Kent" }
            ])))
            .mount(&server)
            .await;

        let places = geocoder(&server).search("  big ben ").await.unwrap();
        assert_eq!(places.len(), 2);

        let big_ben = &places[0];
        assert_eq!(big_ben.name, "Big Ben");
        assert!((big_ben.location.lat - 51.5007292).abs() < 1e-9);
        assert_eq!(big_ben.category.as_deref(), Some("tourism/attraction"));
        let bounds = big_ben.bounds.unwrap();
        assert!(bounds.contains(&big_ben.location));

        assert_eq!(places[1].name, "Elsewhere");
        assert!(places[1].bounds.is_none());
    }

    #[tokio::test]
    async fn test_empty_query_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .expect(0)
            .mount(&server)
            .await;

        let result = geocoder(&server).search("   ").await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_reverse() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/reverse"))
            .and(query_param("lat", "51.500000"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "lat": "51.5", "lon": "-0.12", "display_name": "Parliament Square, London"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/reverse"))
            .and(query_param("lat", "0.000000"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"error": "Unable to geocode"})),
            )
            .mount(&server)
            .await;

        let geocoder = geocoder(&server);
        let place = geocoder.reverse(LatLng::new(51.5, -0.12)).await.unwrap().unwrap();
        assert_eq!(place.name, "Parliament Square");

        assert!(geocoder.reverse(LatLng::new(0.0, 0.0)).await.unwrap().is_none());
        assert!(matches!(
            geocoder.reverse(LatLng::new(120.0, 0.0)).await,
            Err(Error::InvalidCoordinates(_))
        ));
    }

    #[tokio::test]
    async fn test_server_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let result = geocoder(&server).search("x").await;
        assert!(matches!(result, Err(Error::Http { status: 503, .. })));
    }
}

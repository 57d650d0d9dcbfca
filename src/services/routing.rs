//! Driving directions from an OSRM server.

use super::{coord, endpoint};
use crate::core::geo::{LatLng, LatLngBounds};
use crate::offline::{Fetcher, Request};
use crate::prelude::Arc;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteStep {
    pub instruction: String,
    pub name: String,
    pub distance_m: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub geometry: Vec<LatLng>,
    pub distance_m: f64,
    pub duration_s: f64,
    pub steps: Vec<RouteStep>,
}

impl Route {
    pub fn bounds(&self) -> Option<LatLngBounds> {
        LatLngBounds::from_points(&self.geometry)
    }

    /// e.g. `12.3 km, 15 min`
    pub fn summary(&self) -> String {
        format!(
            "{}, {}",
            format_distance(self.distance_m),
            format_duration(self.duration_s)
        )
    }
}

/// Metres below one kilometre, otherwise kilometres with one decimal
pub fn format_distance(metres: f64) -> String {
    if metres < 1000.0 {
        format!("{} m", metres.round() as i64)
    } else {
        format!("{:.1} km", metres / 1000.0)
    }
}

pub fn format_duration(seconds: f64) -> String {
    let minutes = (seconds / 60.0).round() as i64;
    if minutes < 60 {
        format!("{} min", minutes.max(1))
    } else {
        format!("{} h {} min", minutes / 60, minutes % 60)
    }
}

#[derive(Debug, Deserialize)]
struct OsrmResponse {
    code: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    distance: f64,
    duration: f64,
    geometry: OsrmGeometry,
    #[serde(default)]
    legs: Vec<OsrmLeg>,
}

/// GeoJSON LineString, `[lng, lat]` pairs
#[derive(Debug, Deserialize)]
struct OsrmGeometry {
    coordinates: Vec<[f64; 2]>,
}

#[derive(Debug, Deserialize)]
struct OsrmLeg {
    #[serde(default)]
    steps: Vec<OsrmStep>,
}

#[derive(Debug, Deserialize)]
struct OsrmStep {
    distance: f64,
    #[serde(default)]
    name: String,
    maneuver: OsrmManeuver,
}

#[derive(Debug, Deserialize)]
struct OsrmManeuver {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    modifier: Option<String>,
}

fn instruction(maneuver: &OsrmManeuver, name: &str) -> String {
    let modifier = maneuver.modifier.as_deref().unwrap_or("straight");
    let action = match maneuver.kind.as_str() {
        "depart" => "Depart".to_string(),
        "arrive" => return "Arrive at destination".to_string(),
        "roundabout" | "rotary" => "Enter the roundabout".to_string(),
        "exit roundabout" | "exit rotary" => "Exit the roundabout".to_string(),
        "merge" => format!("Merge {}", modifier),
        "on ramp" => format!("Take the ramp {}", modifier),
        "off ramp" => format!("Take the exit {}", modifier),
        "fork" => format!("Keep {} at the fork", modifier),
        "end of road" => format!("Turn {} at the end of the road", modifier),
        "continue" | "new name" => "Continue".to_string(),
        _ if modifier == "straight" => "Continue straight".to_string(),
        _ if modifier == "uturn" => "Make a U-turn".to_string(),
        _ => format!("Turn {}", modifier),
    };
    if name.is_empty() {
        action
    } else {
        format!("{} onto {}", action, name)
    }
}

impl OsrmRoute {
    fn into_route(self) -> Route {
        let steps = self
            .legs
            .into_iter()
            .flat_map(|leg| leg.steps)
            .map(|step| RouteStep {
                instruction: instruction(&step.maneuver, &step.name),
                name: step.name,
                distance_m: step.distance,
            })
            .collect();
        Route {
            geometry: self
                .geometry
                .coordinates
                .into_iter()
                .map(|[lng, lat]| LatLng::new(lat, lng))
                .collect(),
            distance_m: self.distance,
            duration_s: self.duration,
            steps,
        }
    }
}

/// OSRM `route` service client, driving profile
#[derive(Clone)]
pub struct Router {
    base_url: String,
    fetcher: Arc<dyn Fetcher>,
}

impl Router {
    pub fn new(base_url: impl Into<String>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            base_url: base_url.into(),
            fetcher,
        }
    }

    pub async fn route(&self, from: LatLng, to: LatLng) -> Result<Route> {
        for point in [from, to] {
            if !point.is_valid() {
                return Err(Error::InvalidCoordinates(format!("{:?}", point)));
            }
        }
        if from == to {
            return Err(Error::InvalidInput(
                "route start and end are the same point".to_string(),
            ));
        }

        let path = format!(
            "route/v1/driving/{},{};{},{}",
            coord(from.lng),
            coord(from.lat),
            coord(to.lng),
            coord(to.lat)
        );
        let url = endpoint(
            &self.base_url,
            &path,
            &[
                ("overview", "full".to_string()),
                ("geometries", "geojson".to_string()),
                ("steps", "true".to_string()),
            ],
        )?;

        let response = self.fetcher.fetch(Request::get(url)).await?;
        // OSRM reports "no route" as a 400 with a JSON body
        let body: OsrmResponse = match response.json() {
            Ok(body) => body,
            Err(_) => response.error_for_status()?.json()?,
        };
        if body.code != "Ok" {
            return Err(Error::NoRoute(body.message.unwrap_or(body.code)));
        }
        let route = body
            .routes
            .into_iter()
            .next()
            .ok_or_else(|| Error::NoRoute("no routes returned".to_string()))?
            .into_route();

        log::info!("route {:?} -> {:?}: {}", from, to, route.summary());
        Ok(route)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offline::HttpFetcher;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn osrm_body() -> serde_json::Value {
        serde_json::json!({
            "code": "Ok",
            "routes": [{
                "distance": 12345.0,
                "duration": 900.0,
                "geometry": {
                    "type": "LineString",
                    "coordinates": [[-0.1, 51.5], [-0.05, 51.52], [0.0, 51.55]]
                },
                "legs": [{
                    "steps": [
                        {"distance": 100.0, "name": "Strand", "maneuver": {"type": "depart", "modifier": "right"}},
                        {"distance": 12000.0, "name": "A13", "maneuver": {"type": "turn", "modifier": "left"}},
                        {"distance": 0.0, "name": "", "maneuver": {"type": "arrive"}}
                    ]
                }]
            }]
        })
    }

    #[tokio::test]
    async fn test_route_decodes_geometry_and_steps() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(
                "/route/v1/driving/-0.100000,51.500000;0.000000,51.550000",
            ))
            .and(query_param("geometries", "geojson"))
            .and(query_param("overview", "full"))
            .respond_with(ResponseTemplate::new(200).set_body_json(osrm_body()))
            .mount(&server)
            .await;

        let router = Router::new(server.uri(), Arc::new(HttpFetcher::default()));
        let route = router
            .route(LatLng::new(51.5, -0.1), LatLng::new(51.55, 0.0))
            .await
            .unwrap();

        assert_eq!(route.geometry.len(), 3);
        assert_eq!(route.geometry[0], LatLng::new(51.5, -0.1));
        assert_eq!(route.summary(), "12.3 km, 15 min");
        assert_eq!(route.steps[0].instruction, "Depart onto Strand");
        assert_eq!(route.steps[1].instruction, "Turn left onto A13");
        assert_eq!(route.steps[2].instruction, "Arrive at destination");

        let bounds = route.bounds().unwrap();
        assert_eq!(bounds.south_west, LatLng::new(51.5, -0.1));
        assert_eq!(bounds.north_east, LatLng::new(51.55, 0.0));
    }

    #[tokio::test]
    async fn test_no_route() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "code": "NoRoute",
                "message": "Impossible route between points"
            })))
            .mount(&server)
            .await;

        let router = Router::new(server.uri(), Arc::new(HttpFetcher::default()));
        let result = router
            .route(LatLng::new(51.5, -0.1), LatLng::new(40.7, -74.0))
            .await;
        assert!(matches!(result, Err(Error::NoRoute(m)) if m.contains("Impossible")));
    }

    #[tokio::test]
    async fn test_same_point_is_rejected_without_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(osrm_body()))
            .expect(0)
            .mount(&server)
            .await;

        let router = Router::new(server.uri(), Arc::new(HttpFetcher::default()));
        let here = LatLng::new(51.5, -0.1);
        assert!(matches!(
            router.route(here, here).await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_formatting() {
        assert_eq!(format_distance(850.4), "850 m");
        assert_eq!(format_distance(1500.0), "1.5 km");
        assert_eq!(format_duration(20.0), "1 min");
        assert_eq!(format_duration(3900.0), "1 h 5 min");
    }
}

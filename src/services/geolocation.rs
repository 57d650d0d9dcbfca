//! Where the user is.

use super::fetch_json;
use crate::core::geo::LatLng;
use crate::offline::{Fetcher, Request};
use crate::prelude::Arc;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub location: LatLng,
    pub accuracy_m: Option<f64>,
    /// Human-readable origin of the fix, e.g. `ip: London`
    pub source: String,
}

#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn locate(&self) -> Result<Position>;
}

/// Always reports the same coordinate
#[derive(Debug, Clone)]
pub struct FixedLocation {
    position: Position,
}

impl FixedLocation {
    pub fn new(location: LatLng) -> Self {
        Self {
            position: Position {
                location,
                accuracy_m: Some(0.0),
                source: "fixed".to_string(),
            },
        }
    }
}

#[async_trait]
impl LocationProvider for FixedLocation {
    async fn locate(&self) -> Result<Position> {
        if !self.position.location.is_valid() {
            return Err(Error::Geolocation(format!(
                "configured location {:?} is out of range",
                self.position.location
            )));
        }
        Ok(self.position.clone())
    }
}

#[derive(Debug, Deserialize)]
struct IpApiResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    #[serde(default)]
    city: Option<String>,
}

/// City-level lookup from the public IP address (ip-api.com format)
#[derive(Clone)]
pub struct IpLocation {
    url: String,
    fetcher: Arc<dyn Fetcher>,
}

impl IpLocation {
    /// IP lookups are city-level at best
    const ACCURACY_M: f64 = 5_000.0;

    pub fn new(url: impl Into<String>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            url: url.into(),
            fetcher,
        }
    }
}

#[async_trait]
impl LocationProvider for IpLocation {
    async fn locate(&self) -> Result<Position> {
        // The answer depends on where we are now, so never serve it from cache
        let request = Request::get(self.url.as_str()).no_store();
        let body: IpApiResponse = fetch_json(self.fetcher.as_ref(), request)
            .await
            .map_err(|e| Error::Geolocation(e.to_string()))?;

        if body.status != "success" {
            return Err(Error::Geolocation(
                body.message.unwrap_or_else(|| format!("lookup status {}", body.status)),
            ));
        }
        let (Some(lat), Some(lon)) = (body.lat, body.lon) else {
            return Err(Error::Geolocation("response has no coordinates".to_string()));
        };
        let location = LatLng::new(lat, lon);
        if !location.is_valid() {
            return Err(Error::Geolocation(format!("{:?} is out of range", location)));
        }

        log::info!("located via ip at {:?}", location);
        Ok(Position {
            location,
            accuracy_m: Some(Self::ACCURACY_M),
            source: match body.city {
                Some(city) => format!("ip: {}", city),
                None => "ip".to_string(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offline::HttpFetcher;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fixed_location() {
        let position = FixedLocation::new(LatLng::new(48.85, 2.35)).locate().await.unwrap();
        assert_eq!(position.location, LatLng::new(48.85, 2.35));
        assert!(FixedLocation::new(LatLng::new(95.0, 0.0)).locate().await.is_err());
    }

    #[tokio::test]
    async fn test_ip_location() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "success", "lat": 51.5, "lon": -0.12, "city": "London"
            })))
            .mount(&server)
            .await;

        let provider = IpLocation::new(format!("{}/json", server.uri()), Arc::new(HttpFetcher::default()));
        let position = provider.locate().await.unwrap();
        assert_eq!(position.location, LatLng::new(51.5, -0.12));
        assert_eq!(position.source, "ip: London");
    }

    #[tokio::test]
    async fn test_ip_location_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "fail", "message": "private range"
            })))
            .mount(&server)
            .await;

        let provider = IpLocation::new(server.uri(), Arc::new(HttpFetcher::default()));
        assert!(matches!(
            provider.locate().await,
            Err(Error::Geolocation(m)) if m == "private range"
        ));
    }
}

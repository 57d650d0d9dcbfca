//! Clients for the remote services the map composes: place search,
//! driving directions, nearby points of interest and geolocation.
//!
//! Each client talks through an `Arc<dyn Fetcher>`, normally the
//! [`WorkerRegistry`](crate::offline::WorkerRegistry), so GET lookups are
//! answered from the offline cache when the network is gone.

pub mod geocoder;
pub mod geolocation;
pub mod overpass;
pub mod routing;

use crate::offline::{Fetcher, Request};
use crate::{Error, Result};
use serde::de::DeserializeOwned;

/// Build `base` + `path` with percent-encoded query parameters
pub(crate) fn endpoint(base: &str, path: &str, params: &[(&str, String)]) -> Result<String> {
    let raw = format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'));
    let raw = raw.trim_end_matches('/');
    let parsed = if params.is_empty() {
        reqwest::Url::parse(raw)
    } else {
        reqwest::Url::parse_with_params(raw, params)
    };
    let url = parsed
        .map_err(|e| Error::Config(format!("bad service url {}: {}", base, e)))?;
    Ok(url.to_string())
}

/// Fetch and decode a JSON body, failing on non-2xx statuses
pub(crate) async fn fetch_json<T: DeserializeOwned>(
    fetcher: &dyn Fetcher,
    request: Request,
) -> Result<T> {
    let response = fetcher.fetch(request).await?.error_for_status()?;
    response.json()
}

/// Fixed-precision coordinate formatting used in request URLs so that the
/// same point always produces the same cache key
pub(crate) fn coord(value: f64) -> String {
    format!("{:.6}", value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_encodes_query() {
        let url = endpoint(
            "https://nominatim.openstreetmap.org/",
            "search",
            &[("q", "Big Ben, London".to_string()), ("limit", "5".to_string())],
        )
        .unwrap();
        assert_eq!(
            url,
            "https://nominatim.openstreetmap.org/search?q=Big+Ben%2C+London&limit=5"
        );
        assert!(endpoint("not a url", "x", &[]).is_err());
    }

    #[test]
    fn test_coord_is_stable() {
        assert_eq!(coord(51.5), "51.500000");
        assert_eq!(coord(-0.0912345678), "-0.091235");
    }
}

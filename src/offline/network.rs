//! Network access behind the [`Fetcher`] seam.
//!
//! Everything that talks HTTP in this crate takes an `Arc<dyn Fetcher>`, so
//! the offline worker can sit in front of the real network without the
//! service clients knowing about it.

use super::request::{Method, Request, RequestBody, RequestMode, Response, ResponseKind};
use crate::core::config::ServiceConfig;
use crate::{Error, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use std::time::Duration;

/// Shared async HTTP client with a descriptive User-Agent so that public
/// services (OpenStreetMap tiles, Nominatim) don't reject the request.
pub(crate) static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .user_agent(concat!("mapscout/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(30))
        .tcp_keepalive(Duration::from_secs(30))
        .pool_idle_timeout(Duration::from_secs(90))
        .pool_max_idle_per_host(16)
        .build()
        .expect("failed to build reqwest async client")
});

/// Anything that can turn a [`Request`] into a [`Response`]
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: Request) -> Result<Response>;
}

/// Real network access through reqwest
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    /// Origin treated as same-origin, e.g. `https://maps.example.org`
    origin: Option<String>,
}

impl HttpFetcher {
    pub fn new(config: &ServiceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .pool_max_idle_per_host(16)
            .build()?;
        Ok(Self {
            client,
            origin: None,
        })
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into().trim_end_matches('/').to_string());
        self
    }

    fn is_same_origin(&self, url: &str) -> bool {
        let Some(origin) = self.origin.as_deref() else {
            return false;
        };
        match reqwest::Url::parse(url) {
            Ok(parsed) => parsed.origin().ascii_serialization() == origin,
            Err(_) => false,
        }
    }

    fn response_kind(&self, request: &Request) -> ResponseKind {
        if self.is_same_origin(&request.url) {
            return ResponseKind::Basic;
        }
        match request.mode {
            RequestMode::NoCors => ResponseKind::Opaque,
            RequestMode::Cors | RequestMode::SameOrigin => ResponseKind::Cors,
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self {
            client: HTTP_CLIENT.clone(),
            origin: None,
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: Request) -> Result<Response> {
        if request.mode == RequestMode::SameOrigin && !self.is_same_origin(&request.url) {
            return Err(Error::InvalidInput(format!(
                "same-origin request to foreign url {}",
                request.url
            )));
        }

        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
            Method::Head => self.client.head(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Form(pairs) => builder.form(pairs),
            RequestBody::Bytes(bytes) => builder.body(bytes.clone()),
        };

        let started = std::time::Instant::now();
        let resp = builder.send().await?;
        let status = resp.status();
        let headers = resp
            .headers()
            .iter()
            .filter_map(|(k, v)| Some((k.as_str().to_string(), v.to_str().ok()?.to_string())))
            .collect();
        let final_url = resp.url().to_string();
        let body = resp.bytes().await?.to_vec();

        log::debug!(
            "{} {} -> {} ({} bytes, {:?})",
            request.method.as_str(),
            request.url,
            status,
            body.len(),
            started.elapsed()
        );

        let kind = self.response_kind(&request);
        if kind == ResponseKind::Opaque {
            return Ok(Response::opaque(final_url, body));
        }

        Ok(Response {
            url: final_url,
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
            kind,
        })
    }
}

/// A network that is never there; used to simulate disconnection
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineFetcher;

#[async_trait]
impl Fetcher for OfflineFetcher {
    async fn fetch(&self, request: Request) -> Result<Response> {
        Err(Error::Offline(request.url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_http_fetcher_get() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tile.png"))
            .and(header("x-test", "1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .set_body_bytes(vec![1u8, 2, 3]),
            )
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::default();
        let request =
            Request::get(format!("{}/tile.png", server.uri())).with_header("x-test", "1");
        let response = fetcher.fetch(request).await.unwrap();

        assert!(response.is_ok());
        assert_eq!(response.kind, ResponseKind::Cors);
        assert_eq!(response.body, vec![1, 2, 3]);
        assert_eq!(response.header("content-type"), Some("image/png"));
    }

    #[tokio::test]
    async fn test_http_fetcher_form_post() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/interpreter"))
            .and(body_string_contains("data=node"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::default();
        let request = Request::post_form(
            format!("{}/api/interpreter", server.uri()),
            &[("data", "node")],
        );
        assert!(fetcher.fetch(request).await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_no_cors_foreign_origin_is_opaque() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("secret"))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::default().with_origin("https://maps.example.org");
        let request = Request::get(format!("{}/x", server.uri())).with_mode(RequestMode::NoCors);
        let response = fetcher.fetch(request).await.unwrap();
        assert!(response.is_opaque());
        assert_eq!(response.status, 0);
        assert!(response.headers.is_empty());

        let same_origin = HttpFetcher::default().with_origin(server.uri());
        let request = Request::get(format!("{}/x", server.uri())).with_mode(RequestMode::NoCors);
        let response = same_origin.fetch(request).await.unwrap();
        assert_eq!(response.kind, ResponseKind::Basic);
        assert_eq!(response.text(), "secret");
    }

    #[tokio::test]
    async fn test_offline_fetcher_fails() {
        let result = OfflineFetcher.fetch(Request::get("https://x/y")).await;
        assert!(matches!(result, Err(Error::Offline(url)) if url == "https://x/y"));
    }
}

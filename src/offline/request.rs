//! Request and response values passed through the offline layer.
//!
//! These are deliberately plain data: the same [`Response`] is handed to the
//! caller, stored in a cache generation and read back from disk, so it owns
//! its body and serializes with serde.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    Get,
    Post,
    Head,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Head => "HEAD",
        }
    }
}

/// How the request treats cross-origin responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestMode {
    SameOrigin,
    Cors,
    /// Cross-origin responses come back opaque
    NoCors,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Form(Vec<(String, String)>),
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
    pub mode: RequestMode,
    /// When false the offline layer neither reads nor writes the cache
    pub store: bool,
}

impl Request {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: RequestBody::Empty,
            mode: RequestMode::Cors,
            store: true,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    /// `application/x-www-form-urlencoded` POST
    pub fn post_form(url: impl Into<String>, pairs: &[(&str, &str)]) -> Self {
        let mut request = Self::new(Method::Post, url);
        request.body = RequestBody::Form(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        request
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    /// Always go to the network and never populate the cache
    pub fn no_store(mut self) -> Self {
        self.store = false;
        self
    }

    /// Key the request is stored under: method plus the URL without fragment
    pub fn cache_key(&self) -> String {
        let url = match reqwest::Url::parse(&self.url) {
            Ok(mut parsed) => {
                parsed.set_fragment(None);
                parsed.to_string()
            }
            Err(_) => self
                .url
                .split('#')
                .next()
                .unwrap_or_default()
                .to_string(),
        };
        format!("{} {}", self.method.as_str(), url)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseKind {
    Basic,
    Cors,
    /// Cross-origin no-cors response: status 0, no visible headers
    Opaque,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub url: String,
    pub status: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub kind: ResponseKind,
}

impl Response {
    pub fn new(url: impl Into<String>, status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            url: url.into(),
            status,
            status_text: String::new(),
            headers: Vec::new(),
            body: body.into(),
            kind: ResponseKind::Basic,
        }
    }

    /// Opaque response: the body is kept for storage but status and
    /// headers are hidden
    pub fn opaque(url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            url: url.into(),
            status: 0,
            status_text: String::new(),
            headers: Vec::new(),
            body: body.into(),
            kind: ResponseKind::Opaque,
        }
    }

    pub fn with_kind(mut self, kind: ResponseKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// 2xx and readable
    pub fn is_ok(&self) -> bool {
        matches!(self.kind, ResponseKind::Basic | ResponseKind::Cors)
            && (200..=299).contains(&self.status)
    }

    pub fn is_opaque(&self) -> bool {
        self.kind == ResponseKind::Opaque
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        if self.is_opaque() {
            return Err(Error::ParseError(format!(
                "opaque response from {} cannot be read",
                self.url
            )));
        }
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Turn a non-2xx response into an [`Error::Http`]
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_ok() {
            Ok(self)
        } else {
            Err(Error::Http {
                status: self.status,
                url: self.url,
            })
        }
    }
}

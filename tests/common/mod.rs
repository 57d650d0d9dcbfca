#![allow(dead_code)]

use async_trait::async_trait;
use mapscout::offline::{Fetcher, Request, Response};
use mapscout::{Error, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Fetcher answering from a fixed table, with a switch to cut the network
#[derive(Default)]
pub struct ScriptedFetcher {
    routes: Mutex<HashMap<String, Response>>,
    calls: Mutex<Vec<String>>,
    offline: AtomicBool,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, response: Response) {
        self.routes.lock().unwrap().insert(url.to_string(), response);
    }

    pub fn ok(&self, url: &str, body: &str) {
        self.respond(url, Response::new(url, 200, body));
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.calls().iter().filter(|u| u.as_str() == url).count()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: Request) -> Result<Response> {
        self.calls.lock().unwrap().push(request.url.clone());
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Offline(request.url));
        }
        let routes = self.routes.lock().unwrap();
        Ok(routes
            .get(&request.url)
            .cloned()
            .unwrap_or_else(|| Response::new(request.url.as_str(), 404, "not found")))
    }
}

pub fn offline_config(version: &str, precache: &[&str]) -> mapscout::core::config::OfflineConfig {
    mapscout::core::config::OfflineConfig {
        version: version.to_string(),
        precache: precache.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    }
}

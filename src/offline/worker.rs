//! The offline worker: a versioned, request-intercepting cache.
//!
//! Lifecycle:
//!
//! ```text
//! Parsed -> Installing -> Installed -> Activating -> Activated
//!               |                                       |
//!               +---------------> Redundant <-----------+ (superseded)
//! ```
//!
//! * `install` precaches the app assets into this version's cache, all or
//!   nothing.
//! * `activate` deletes every older generation that shares the prefix.
//! * Once activated, `handle_fetch` serves GET requests cache-first and
//!   stores whatever the network returns successfully.
//!
//! [`WorkerRegistry`] keeps track of which generation controls requests and
//! promotes a waiting one when asked to.

use super::network::Fetcher;
use super::request::{Method, Request, Response};
use super::storage::{Cache, CacheStats, CacheStore, DiskStore, MemoryStore};
use crate::core::config::OfflineConfig;
use crate::prelude::{Arc, Mutex, RwLock};
use crate::{Error, Result};
use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    Redundant,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Parsed => "parsed",
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Activated => "activated",
            WorkerState::Redundant => "redundant",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    stores: AtomicU64,
    network_errors: AtomicU64,
}

/// One cache generation and the interception logic in front of it
pub struct OfflineWorker {
    config: OfflineConfig,
    cache_name: String,
    store: Arc<dyn CacheStore>,
    network: Arc<dyn Fetcher>,
    state: Mutex<WorkerState>,
    counters: Counters,
}

impl OfflineWorker {
    pub fn new(
        config: OfflineConfig,
        store: Arc<dyn CacheStore>,
        network: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            cache_name: config.cache_name(),
            config,
            store,
            network,
            state: Mutex::new(WorkerState::Parsed),
            counters: Counters::default(),
        }
    }

    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    pub fn state(&self) -> WorkerState {
        *self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn set_state(&self, next: WorkerState) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        log::debug!("offline worker {}: {} -> {}", self.cache_name, *state, next);
        *state = next;
    }

    /// Move from `expected` to `next`, failing if the worker is elsewhere
    fn transition(&self, expected: WorkerState, next: WorkerState) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if *state != expected {
            return Err(Error::InvalidState {
                expected: expected.to_string(),
                found: state.to_string(),
            });
        }
        log::debug!("offline worker {}: {} -> {}", self.cache_name, *state, next);
        *state = next;
        Ok(())
    }

    /// Open this generation's cache and precache the app assets
    pub async fn install(&self) -> Result<()> {
        self.transition(WorkerState::Parsed, WorkerState::Installing)?;

        let result = async {
            let cache = Cache::open(self.store.clone(), self.cache_name.clone())?;
            // Assets left by an earlier run of this generation stay valid
            let mut missing = Vec::new();
            for url in &self.config.precache {
                let request = Request::get(url.as_str());
                if cache.match_request(&request)?.is_none() {
                    missing.push(request);
                }
            }
            cache.add_all(&missing, self.network.as_ref()).await?;
            Ok::<(usize, usize), Error>((self.config.precache.len(), missing.len()))
        }
        .await;

        match result {
            Ok((count, fetched)) => {
                log::info!(
                    "installed offline cache {} ({} assets, {} fetched)",
                    self.cache_name,
                    count,
                    fetched
                );
                self.set_state(WorkerState::Installed);
                Ok(())
            }
            Err(e) => {
                log::error!("offline cache {} failed to install: {}", self.cache_name, e);
                self.set_state(WorkerState::Redundant);
                Err(match e {
                    Error::InstallFailed(_) => e,
                    other => Error::InstallFailed(other.to_string()),
                })
            }
        }
    }

    /// Delete stale generations and start controlling requests.
    /// Returns the names of the deleted caches.
    pub fn activate(&self) -> Result<Vec<String>> {
        self.transition(WorkerState::Installed, WorkerState::Activating)?;

        match self.delete_stale_caches() {
            Ok(deleted) => {
                self.set_state(WorkerState::Activated);
                log::info!(
                    "offline cache {} activated, removed {:?}",
                    self.cache_name,
                    deleted
                );
                Ok(deleted)
            }
            Err(e) => {
                self.set_state(WorkerState::Installed);
                Err(e)
            }
        }
    }

    fn delete_stale_caches(&self) -> Result<Vec<String>> {
        let own_prefix = format!("{}-", self.config.cache_prefix);
        let mut deleted = Vec::new();
        for name in self.store.names()? {
            if name != self.cache_name && name.starts_with(&own_prefix) && self.store.delete(&name)? {
                deleted.push(name);
            }
        }
        Ok(deleted)
    }

    pub(crate) fn mark_redundant(&self) {
        self.set_state(WorkerState::Redundant);
    }

    /// Intercept a request
    pub async fn handle_fetch(&self, request: Request) -> Result<Response> {
        if self.state() != WorkerState::Activated
            || request.method != Method::Get
            || !request.store
        {
            return self.network.fetch(request).await;
        }

        let key = request.cache_key();
        match self.store.get(&self.cache_name, &key) {
            Ok(Some(hit)) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                log::trace!("cache hit {}", key);
                return Ok(hit);
            }
            Ok(None) => {}
            Err(e) => log::warn!("cache read failed for {}: {}", key, e),
        }
        self.counters.misses.fetch_add(1, Ordering::Relaxed);

        let url = request.url.clone();
        let response = match self.network.fetch(request).await {
            Ok(response) => response,
            Err(e) => {
                self.counters.network_errors.fetch_add(1, Ordering::Relaxed);
                log::warn!("network unavailable for {}: {}", url, e);
                return Err(Error::Offline(url));
            }
        };

        if self.should_store(&response) {
            match self.store.put(&self.cache_name, &key, &response) {
                Ok(()) => {
                    self.counters.stores.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => log::warn!("failed to cache {}: {}", key, e),
            }
        }
        Ok(response)
    }

    fn should_store(&self, response: &Response) -> bool {
        response.is_ok() || (response.is_opaque() && self.config.cache_opaque)
    }

    /// Handle on this generation's cache
    pub fn cache(&self) -> Result<Cache> {
        Cache::open(self.store.clone(), self.cache_name.clone())
    }

    /// Drop everything this generation has stored, keeping the cache itself
    pub fn clear(&self) -> Result<usize> {
        let cache = self.cache()?;
        let keys = cache.keys()?;
        for key in &keys {
            self.store.remove(&self.cache_name, key)?;
        }
        log::info!("cleared {} entries from {}", keys.len(), self.cache_name);
        Ok(keys.len())
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            stores: self.counters.stores.load(Ordering::Relaxed),
            network_errors: self.counters.network_errors.load(Ordering::Relaxed),
            entries: self.store.len(&self.cache_name).unwrap_or(0),
        }
    }
}

impl fmt::Debug for OfflineWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OfflineWorker")
            .field("cache_name", &self.cache_name)
            .field("state", &self.state())
            .finish()
    }
}

#[async_trait]
impl Fetcher for OfflineWorker {
    async fn fetch(&self, request: Request) -> Result<Response> {
        self.handle_fetch(request).await
    }
}

struct RegistryInner {
    store: Arc<dyn CacheStore>,
    network: Arc<dyn Fetcher>,
    active: RwLock<Option<Arc<OfflineWorker>>>,
    waiting: RwLock<Option<Arc<OfflineWorker>>>,
}

/// Tracks the controlling worker and the one waiting to replace it.
///
/// The registry is itself a [`Fetcher`]: requests go through the active
/// worker, or straight to the network while nothing is active.
#[derive(Clone)]
pub struct WorkerRegistry {
    inner: Arc<RegistryInner>,
}

impl WorkerRegistry {
    pub fn new(store: Arc<dyn CacheStore>, network: Arc<dyn Fetcher>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                store,
                network,
                active: RwLock::new(None),
                waiting: RwLock::new(None),
            }),
        }
    }

    /// Pick storage from the configuration and register its generation
    /// when offline support is enabled. A generation that fails to install
    /// leaves the registry uncontrolled rather than failing start-up.
    pub async fn bootstrap(config: &OfflineConfig, network: Arc<dyn Fetcher>) -> Result<Self> {
        let store: Arc<dyn CacheStore> = match &config.cache_dir {
            Some(dir) => Arc::new(DiskStore::new(dir)?),
            None => Arc::new(MemoryStore::new()),
        };
        let registry = Self::new(store, network);
        if !config.enabled {
            log::info!("offline cache disabled, requests go straight to the network");
            return Ok(registry);
        }
        match registry.register(config.clone()).await {
            Ok(_) => {}
            Err(e @ Error::InstallFailed(_)) => {
                log::warn!("{}; requests go straight to the network", e);
            }
            Err(e) => return Err(e),
        }
        Ok(registry)
    }

    pub fn store(&self) -> Arc<dyn CacheStore> {
        self.inner.store.clone()
    }

    pub fn controller(&self) -> Option<Arc<OfflineWorker>> {
        read(&self.inner.active).clone()
    }

    pub fn waiting(&self) -> Option<Arc<OfflineWorker>> {
        read(&self.inner.waiting).clone()
    }

    /// Install a generation. It takes control right away when nothing is
    /// active; otherwise it waits for [`Self::skip_waiting`] or
    /// [`Self::release_active`]. Registering the active generation again
    /// is a no-op.
    pub async fn register(&self, config: OfflineConfig) -> Result<Arc<OfflineWorker>> {
        if let Some(active) = self.controller() {
            if active.cache_name() == config.cache_name() {
                log::debug!("{} already controls requests", active.cache_name());
                return Ok(active);
            }
        }

        let worker = Arc::new(OfflineWorker::new(
            config,
            self.inner.store.clone(),
            self.inner.network.clone(),
        ));
        worker.install().await?;

        if self.controller().is_none() {
            worker.activate()?;
            *write(&self.inner.active) = Some(worker.clone());
        } else {
            log::info!("{} installed and waiting", worker.cache_name());
            if let Some(previous) = write(&self.inner.waiting).replace(worker.clone()) {
                previous.mark_redundant();
            }
        }
        Ok(worker)
    }

    /// Promote the waiting generation immediately. Returns the caches that
    /// activation deleted, or `None` when nothing was waiting.
    pub fn skip_waiting(&self) -> Result<Option<Vec<String>>> {
        let Some(next) = write(&self.inner.waiting).take() else {
            return Ok(None);
        };
        let deleted = match next.activate() {
            Ok(deleted) => deleted,
            Err(e) => {
                *write(&self.inner.waiting) = Some(next);
                return Err(e);
            }
        };
        log::info!("{} now controls requests", next.cache_name());
        if let Some(old) = write(&self.inner.active).replace(next) {
            old.mark_redundant();
        }
        Ok(Some(deleted))
    }

    /// The active generation lost its last client: promote the waiting
    /// one, or leave requests uncontrolled if there is none
    pub fn release_active(&self) -> Result<Option<Vec<String>>> {
        if self.waiting().is_some() {
            return self.skip_waiting();
        }
        if let Some(old) = write(&self.inner.active).take() {
            old.mark_redundant();
        }
        Ok(None)
    }
}

#[async_trait]
impl Fetcher for WorkerRegistry {
    async fn fetch(&self, request: Request) -> Result<Response> {
        match self.controller() {
            Some(worker) => worker.handle_fetch(request).await,
            None => self.inner.network.fetch(request).await,
        }
    }
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|p| p.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|p| p.into_inner())
}

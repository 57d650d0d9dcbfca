use super::cache::TileCache;
use super::source::TileSource;
use crate::core::config::TileConfig;
use crate::core::geo::TileCoord;
use crate::core::viewport::Viewport;
use crate::offline::{Fetcher, Request};
use crate::prelude::{Arc, Duration, HashSet, Mutex};
use crate::{runtime, Error, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use tokio::sync::Semaphore;

const RETRY_DELAY: Duration = Duration::from_millis(100);

/// Outcome of one tile download
#[derive(Debug)]
pub struct TileResult {
    pub coord: TileCoord,
    pub data: Result<Arc<Vec<u8>>>,
}

/// Fetches tiles on background tasks through a [`Fetcher`] and hands the
/// bytes back over a channel that the UI drains once per frame.
pub struct TileLoader {
    source: Arc<dyn TileSource>,
    fetcher: Arc<dyn Fetcher>,
    cache: TileCache,
    in_flight: Arc<Mutex<HashSet<TileCoord>>>,
    permits: Arc<Semaphore>,
    max_retries: u32,
    zoom_range: (u8, u8),
    tx: Sender<TileResult>,
    rx: Receiver<TileResult>,
}

impl TileLoader {
    pub fn new(source: Arc<dyn TileSource>, fetcher: Arc<dyn Fetcher>, config: &TileConfig) -> Self {
        let (tx, rx) = unbounded();
        Self {
            source,
            fetcher,
            cache: TileCache::new(config.memory_cache_size),
            in_flight: Arc::new(Mutex::new(HashSet::default())),
            permits: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            max_retries: config.max_retries,
            zoom_range: (config.min_zoom, config.max_zoom),
            tx,
            rx,
        }
    }

    pub fn cache(&self) -> &TileCache {
        &self.cache
    }

    pub fn source(&self) -> &dyn TileSource {
        self.source.as_ref()
    }

    pub fn pending(&self) -> usize {
        self.in_flight.lock().map(|set| set.len()).unwrap_or(0)
    }

    /// Start loading `coord` unless it is cached, already loading, or
    /// outside the source's zoom range. Returns whether a download started.
    pub fn request(&self, coord: TileCoord) -> bool {
        let (min_zoom, max_zoom) = self.zoom_range;
        if !coord.is_valid() || coord.z < min_zoom || coord.z > max_zoom {
            return false;
        }
        if self.cache.contains(&coord) {
            return false;
        }
        match self.in_flight.lock() {
            Ok(mut set) => {
                if !set.insert(coord) {
                    return false;
                }
            }
            Err(_) => return false,
        }

        let url = self.source.url(coord);
        let fetcher = self.fetcher.clone();
        let permits = self.permits.clone();
        let tx = self.tx.clone();
        let max_retries = self.max_retries;

        runtime::spawn(async move {
            let data = match permits.acquire_owned().await {
                Ok(_permit) => download(fetcher.as_ref(), &url, coord, max_retries).await,
                Err(_) => Err(Error::InvalidState {
                    expected: "open".into(),
                    found: "closed tile loader".into(),
                }),
            };
            let _ = tx.send(TileResult { coord, data });
        });
        true
    }

    /// Request every visible tile, nearest the center first
    pub fn request_visible(&self, viewport: &Viewport) -> usize {
        viewport
            .visible_tiles()
            .into_iter()
            .filter(|coord| self.request(*coord))
            .count()
    }

    /// Move finished downloads into the cache. Returns the coords that
    /// became available.
    pub fn poll(&self) -> Vec<TileCoord> {
        let mut loaded = Vec::new();
        for result in self.rx.try_iter() {
            if let Ok(mut set) = self.in_flight.lock() {
                set.remove(&result.coord);
            }
            match result.data {
                Ok(data) => {
                    self.cache.put(result.coord, data);
                    loaded.push(result.coord);
                }
                Err(e) => log::warn!("giving up on tile {:?}: {}", result.coord, e),
            }
        }
        loaded
    }
}

async fn download(
    fetcher: &dyn Fetcher,
    url: &str,
    coord: TileCoord,
    max_retries: u32,
) -> Result<Arc<Vec<u8>>> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        log::trace!("fetch tile {:?} attempt {}", coord, attempt);
        let result = fetcher
            .fetch(Request::get(url))
            .await
            .and_then(|response| response.error_for_status());

        match result {
            Ok(response) => {
                log::debug!("tile {:?} ready ({} bytes)", coord, response.body.len());
                return Ok(Arc::new(response.body));
            }
            // Nothing cached and no network: retrying won't help
            Err(e @ Error::Offline(_)) => return Err(e),
            Err(e) if attempt > max_retries => return Err(e),
            Err(e) => {
                log::debug!("tile {:?} attempt {} failed: {}", coord, attempt, e);
                tokio::time::sleep(RETRY_DELAY * attempt).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geo::{LatLng, Point};
    use crate::offline::Response;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;

    /// Fails the first `failures` requests, then answers with the URL
    struct FlakyFetcher {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Fetcher for FlakyFetcher {
        async fn fetch(&self, request: Request) -> Result<Response> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Ok(Response::new(request.url.as_str(), 500, ""));
            }
            Ok(Response::new(request.url.as_str(), 200, request.url.clone()))
        }
    }

    fn make_loader(failures: u32, max_retries: u32) -> (TileLoader, Arc<FlakyFetcher>) {
        let fetcher = Arc::new(FlakyFetcher {
            failures,
            calls: AtomicU32::new(0),
        });
        let config = TileConfig {
            max_retries,
            ..TileConfig::default()
        };
        let source = Arc::new(crate::tiles::TemplateSource::openstreetmap());
        (TileLoader::new(source, fetcher.clone(), &config), fetcher)
    }

    async fn drain(loader: &TileLoader) -> Vec<TileCoord> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut loaded = Vec::new();
        while loader.pending() > 0 && Instant::now() < deadline {
            loaded.extend(loader.poll());
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        loaded.extend(loader.poll());
        loaded
    }

    #[tokio::test]
    async fn test_loads_into_cache_and_dedupes() {
        let (loader, fetcher) = make_loader(0, 0);
        let coord = TileCoord::new(1, 1, 2);

        assert!(loader.request(coord));
        assert!(!loader.request(coord));
        assert_eq!(drain(&loader).await, vec![coord]);

        let data = loader.cache().get(&coord).unwrap();
        assert_eq!(
            String::from_utf8_lossy(&data),
            "https://c.tile.openstreetmap.org/2/1/1.png"
        );
        assert!(!loader.request(coord));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_then_gives_up() {
        let (loader, _) = make_loader(2, 2);
        assert!(loader.request(TileCoord::new(0, 0, 1)));
        assert_eq!(drain(&loader).await.len(), 1);

        let (loader, fetcher) = make_loader(5, 1);
        assert!(loader.request(TileCoord::new(0, 0, 1)));
        assert!(drain(&loader).await.is_empty());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
        assert!(loader.cache().is_empty());
    }

    #[tokio::test]
    async fn test_request_visible_skips_invalid_and_cached() {
        let (loader, _) = make_loader(0, 0);
        assert!(!loader.request(TileCoord::new(4, 0, 2)));
        assert!(!loader.request(TileCoord::new(0, 0, 20)));

        let viewport = Viewport::new(LatLng::new(51.505, -0.09), 13.0, Point::new(512.0, 512.0));
        let started = loader.request_visible(&viewport);
        assert_eq!(started, viewport.visible_tiles().len());
        drain(&loader).await;
        assert_eq!(loader.request_visible(&viewport), 0);
    }
}

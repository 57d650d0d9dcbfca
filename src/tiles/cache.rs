use crate::core::geo::TileCoord;
use crate::prelude::{Arc, Mutex};
use lru::LruCache;
use std::num::NonZeroUsize;

const DEFAULT_CAPACITY: usize = 512;

/// Decoded-ready tile bytes kept in memory, least recently used first out.
///
/// This is the hot layer the widget reads every frame; the offline cache
/// behind the fetcher is the durable one.
#[derive(Debug, Clone)]
pub struct TileCache {
    cache: Arc<Mutex<LruCache<TileCoord, Arc<Vec<u8>>>>>,
}

impl TileCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity)
            .or(NonZeroUsize::new(DEFAULT_CAPACITY))
            .unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    pub fn get(&self, coord: &TileCoord) -> Option<Arc<Vec<u8>>> {
        self.cache.lock().ok()?.get(coord).cloned()
    }

    pub fn put(&self, coord: TileCoord, data: Arc<Vec<u8>>) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(coord, data);
        }
    }

    /// Membership check that doesn't touch recency
    pub fn contains(&self, coord: &TileCoord) -> bool {
        self.cache
            .lock()
            .map(|cache| cache.contains(coord))
            .unwrap_or(false)
    }

    /// Nearest cached ancestor, for drawing a scaled placeholder while the
    /// tile itself loads
    pub fn fallback(&self, coord: &TileCoord) -> Option<(TileCoord, Arc<Vec<u8>>)> {
        let mut current = coord.parent();
        while let Some(parent) = current {
            if let Some(data) = self.cache.lock().ok()?.peek(&parent).cloned() {
                return Some((parent, data));
            }
            current = parent.parent();
        }
        None
    }

    pub fn len(&self) -> usize {
        self.cache.lock().map(|cache| cache.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.cache.lock().map(|cache| cache.cap().get()).unwrap_or(0)
    }
}

impl Default for TileCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lru_eviction_respects_recent_reads() {
        let cache = TileCache::new(2);
        let a = TileCoord::new(0, 0, 1);
        let b = TileCoord::new(1, 0, 1);
        let c = TileCoord::new(1, 1, 1);

        cache.put(a, Arc::new(vec![1]));
        cache.put(b, Arc::new(vec![2]));
        assert!(cache.get(&a).is_some());
        cache.put(c, Arc::new(vec![3]));

        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&a));
        assert!(!cache.contains(&b));
        assert!(cache.contains(&c));
    }

    #[test]
    fn test_fallback_finds_ancestor() {
        let cache = TileCache::new(8);
        let tile = TileCoord::new(4093, 2724, 13);
        assert!(cache.fallback(&tile).is_none());

        let grandparent = tile.parent().and_then(|p| p.parent()).unwrap();
        cache.put(grandparent, Arc::new(vec![9]));
        let (found, data) = cache.fallback(&tile).unwrap();
        assert_eq!(found, grandparent);
        assert_eq!(*data, vec![9]);
    }

    #[test]
    fn test_zero_capacity_uses_default() {
        assert_eq!(TileCache::new(0).capacity(), DEFAULT_CAPACITY);
        assert!(TileCache::default().is_empty());
    }
}

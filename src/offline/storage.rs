//! Named cache generations.
//!
//! A [`CacheStore`] holds any number of named caches, each mapping a request
//! key to a stored [`Response`]. The offline worker owns exactly one name per
//! version (`"{prefix}-{version}"`) and garbage-collects the others on
//! activation.

use super::network::Fetcher;
use super::request::{Request, Response};
use crate::prelude::{HashMap, Mutex};
use crate::{Error, Result};
use bincode::Options;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Storage for named caches of responses
pub trait CacheStore: Send + Sync {
    /// Create the cache if it does not exist yet
    fn open(&self, name: &str) -> Result<()>;

    fn has(&self, name: &str) -> bool;

    /// Delete a whole cache; `false` if it did not exist
    fn delete(&self, name: &str) -> Result<bool>;

    /// Names of every cache, sorted
    fn names(&self) -> Result<Vec<String>>;

    fn get(&self, name: &str, key: &str) -> Result<Option<Response>>;

    fn put(&self, name: &str, key: &str, response: &Response) -> Result<()>;

    fn remove(&self, name: &str, key: &str) -> Result<bool>;

    /// Keys stored in a cache, sorted
    fn keys(&self, name: &str) -> Result<Vec<String>>;

    /// Number of entries in a cache
    fn len(&self, name: &str) -> Result<usize> {
        Ok(self.keys(name)?.len())
    }
}

/// In-process storage; everything is gone when the process exits
#[derive(Debug, Default)]
pub struct MemoryStore {
    caches: Mutex<HashMap<String, HashMap<String, Response>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, HashMap<String, Response>>> {
        self.caches.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CacheStore for MemoryStore {
    fn open(&self, name: &str) -> Result<()> {
        self.lock().entry(name.to_string()).or_default();
        Ok(())
    }

    fn has(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    fn delete(&self, name: &str) -> Result<bool> {
        Ok(self.lock().remove(name).is_some())
    }

    fn names(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn get(&self, name: &str, key: &str) -> Result<Option<Response>> {
        Ok(self.lock().get(name).and_then(|cache| cache.get(key)).cloned())
    }

    fn put(&self, name: &str, key: &str, response: &Response) -> Result<()> {
        self.lock()
            .entry(name.to_string())
            .or_default()
            .insert(key.to_string(), response.clone());
        Ok(())
    }

    fn remove(&self, name: &str, key: &str) -> Result<bool> {
        Ok(self
            .lock()
            .get_mut(name)
            .map(|cache| cache.remove(key).is_some())
            .unwrap_or(false))
    }

    fn keys(&self, name: &str) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .lock()
            .get(name)
            .map(|cache| cache.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        Ok(keys)
    }

    fn len(&self, name: &str) -> Result<usize> {
        Ok(self.lock().get(name).map_or(0, |cache| cache.len()))
    }
}

const NAME_FILE: &str = ".cache-name";
const ENTRY_EXT: &str = "bin";
const MAX_KEY_LEN: u64 = 64 * 1024;

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// On-disk entry. The key is serialized first so it can be read back
/// without decoding the response body.
#[derive(Serialize, Deserialize)]
struct StoredEntry {
    key: String,
    response: Response,
}

/// Persistent storage: one directory per cache, one bincode file per entry
#[derive(Debug, Clone)]
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn cache_dir(&self, name: &str) -> PathBuf {
        self.root.join(dir_name(name))
    }

    fn entry_path(&self, name: &str, key: &str) -> PathBuf {
        self.cache_dir(name)
            .join(format!("{:016x}.{}", fxhash::hash64(key), ENTRY_EXT))
    }

    fn read_entry(path: &Path) -> Result<StoredEntry> {
        let bytes = fs::read(path)?;
        Ok(bincode::deserialize(&bytes)?)
    }

    /// Decode only the key at the front of an entry file
    fn read_key(path: &Path) -> Result<String> {
        let reader = BufReader::new(File::open(path)?);
        let key: String = bincode::options()
            .with_fixint_encoding()
            .allow_trailing_bytes()
            .with_limit(MAX_KEY_LEN)
            .deserialize_from(reader)?;
        Ok(key)
    }

    fn entry_files(&self, name: &str) -> Result<Vec<PathBuf>> {
        let dir = self.cache_dir(name);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some(ENTRY_EXT) {
                files.push(path);
            }
        }
        Ok(files)
    }

    fn discard(path: &Path) {
        if let Err(e) = fs::remove_file(path) {
            log::warn!("failed to remove corrupt cache entry {}: {}", path.display(), e);
        }
    }
}

impl CacheStore for DiskStore {
    fn open(&self, name: &str) -> Result<()> {
        let dir = self.cache_dir(name);
        fs::create_dir_all(&dir)?;
        fs::write(dir.join(NAME_FILE), name)?;
        Ok(())
    }

    fn has(&self, name: &str) -> bool {
        self.cache_dir(name).is_dir()
    }

    fn delete(&self, name: &str) -> Result<bool> {
        let dir = self.cache_dir(name);
        if !dir.is_dir() {
            return Ok(false);
        }
        fs::remove_dir_all(dir)?;
        Ok(true)
    }

    fn names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = fs::read_to_string(entry.path().join(NAME_FILE))
                .unwrap_or_else(|_| entry.file_name().to_string_lossy().into_owned());
            names.push(name);
        }
        names.sort();
        Ok(names)
    }

    fn get(&self, name: &str, key: &str) -> Result<Option<Response>> {
        let path = self.entry_path(name, key);
        if !path.is_file() {
            return Ok(None);
        }
        match Self::read_entry(&path) {
            Ok(entry) if entry.key == key => Ok(Some(entry.response)),
            // Hash collision with another key
            Ok(_) => Ok(None),
            Err(e) => {
                log::warn!("unreadable cache entry {}: {}", path.display(), e);
                Self::discard(&path);
                Ok(None)
            }
        }
    }

    fn put(&self, name: &str, key: &str, response: &Response) -> Result<()> {
        if !self.has(name) {
            self.open(name)?;
        }
        let entry = StoredEntry {
            key: key.to_string(),
            response: response.clone(),
        };
        let path = self.entry_path(name, key);
        let tmp = path.with_extension(format!(
            "{}-{}.tmp",
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        fs::write(&tmp, bincode::serialize(&entry)?)?;
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    fn remove(&self, name: &str, key: &str) -> Result<bool> {
        let path = self.entry_path(name, key);
        if !path.is_file() {
            return Ok(false);
        }
        fs::remove_file(path)?;
        Ok(true)
    }

    fn keys(&self, name: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for path in self.entry_files(name)? {
            match Self::read_key(&path) {
                Ok(key) => keys.push(key),
                Err(e) => {
                    log::warn!("unreadable cache entry {}: {}", path.display(), e);
                    Self::discard(&path);
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn len(&self, name: &str) -> Result<usize> {
        Ok(self.entry_files(name)?.len())
    }
}

/// Directory for a cache name: the name restricted to `[A-Za-z0-9._-]`,
/// plus a hash of the full name so distinct names never share a directory
fn dir_name(name: &str) -> String {
    let safe: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}-{:08x}", safe, fxhash::hash32(name))
}

/// Handle on one named cache
#[derive(Clone)]
pub struct Cache {
    name: String,
    store: Arc<dyn CacheStore>,
}

impl Cache {
    pub fn open(store: Arc<dyn CacheStore>, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        store.open(&name)?;
        Ok(Self { name, store })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn match_request(&self, request: &Request) -> Result<Option<Response>> {
        self.store.get(&self.name, &request.cache_key())
    }

    pub fn put(&self, request: &Request, response: &Response) -> Result<()> {
        self.store.put(&self.name, &request.cache_key(), response)
    }

    pub fn delete(&self, request: &Request) -> Result<bool> {
        self.store.remove(&self.name, &request.cache_key())
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        self.store.keys(&self.name)
    }

    pub fn len(&self) -> Result<usize> {
        self.store.len(&self.name)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Fetch every request and store the responses, but only if all of them
    /// succeed. Nothing is written when any request fails.
    pub async fn add_all(&self, requests: &[Request], fetcher: &dyn Fetcher) -> Result<()> {
        let responses = join_all(requests.iter().cloned().map(|r| fetcher.fetch(r))).await;

        let mut fetched = Vec::with_capacity(requests.len());
        for (request, response) in requests.iter().zip(responses) {
            let response =
                response.map_err(|e| Error::InstallFailed(format!("{}: {}", request.url, e)))?;
            if !response.is_ok() {
                return Err(Error::InstallFailed(format!(
                    "{} returned status {}",
                    request.url, response.status
                )));
            }
            fetched.push((request, response));
        }

        for (request, response) in &fetched {
            self.put(request, response)?;
        }
        Ok(())
    }
}

/// Counters reported by the offline worker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
    pub network_errors: u64,
    pub entries: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(store: &dyn CacheStore) {
        assert!(!store.has("app-v1"));
        store.open("app-v1").unwrap();
        store.open("app-v2").unwrap();
        assert!(store.has("app-v1"));
        assert_eq!(store.names().unwrap(), vec!["app-v1", "app-v2"]);

        let response = Response::new("https://x/a", 200, "a");
        store.put("app-v1", "GET https://x/a", &response).unwrap();
        assert_eq!(store.get("app-v1", "GET https://x/a").unwrap(), Some(response));
        assert_eq!(store.get("app-v2", "GET https://x/a").unwrap(), None);
        assert_eq!(store.keys("app-v1").unwrap(), vec!["GET https://x/a"]);

        assert!(store.remove("app-v1", "GET https://x/a").unwrap());
        assert!(!store.remove("app-v1", "GET https://x/a").unwrap());

        assert!(store.delete("app-v2").unwrap());
        assert!(!store.delete("app-v2").unwrap());
        assert_eq!(store.names().unwrap(), vec!["app-v1"]);
    }

    #[test]
    fn test_memory_store() {
        exercise(&MemoryStore::new());
    }

    #[test]
    fn test_disk_store() {
        let dir = tempfile::tempdir().unwrap();
        exercise(&DiskStore::new(dir.path()).unwrap());
    }

    #[test]
    fn test_disk_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let response = Response::new("https://x/t.png", 200, vec![9u8; 32]);
        {
            let store = DiskStore::new(dir.path()).unwrap();
            store.put("tiles v1", "GET https://x/t.png", &response).unwrap();
        }

        let reopened = DiskStore::new(dir.path()).unwrap();
        // Original name survives sanitization of the directory
        assert_eq!(reopened.names().unwrap(), vec!["tiles v1"]);
        assert_eq!(
            reopened.get("tiles v1", "GET https://x/t.png").unwrap(),
            Some(response)
        );
    }

    #[test]
    fn test_disk_store_keeps_similar_names_apart() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(dir.path()).unwrap();
        store.put("a b", "k", &Response::new("u", 200, "space")).unwrap();
        store.put("a_b", "k", &Response::new("u", 200, "underscore")).unwrap();
        assert_eq!(store.names().unwrap(), vec!["a b", "a_b"]);

        assert!(store.delete("a b").unwrap());
        assert_eq!(store.names().unwrap(), vec!["a_b"]);
        assert_eq!(store.get("a_b", "k").unwrap().unwrap().text(), "underscore");
    }

    #[test]
    fn test_disk_store_counts_and_lists_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(dir.path()).unwrap();
        let tile = Response::new("https://x/t.png", 200, vec![7u8; 4096]);
        for i in 0..3 {
            store.put("tiles", &format!("GET https://x/{}.png", i), &tile).unwrap();
        }
        store.put("tiles", "GET https://x/0.png", &tile).unwrap();

        assert_eq!(store.len("tiles").unwrap(), 3);
        assert_eq!(
            store.keys("tiles").unwrap(),
            vec!["GET https://x/0.png", "GET https://x/1.png", "GET https://x/2.png"]
        );
        let leftovers = fs::read_dir(store.cache_dir("tiles"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map_or(false, |x| x == "tmp"))
            .count();
        assert_eq!(leftovers, 0);
        assert_eq!(store.len("missing").unwrap(), 0);
    }

    #[test]
    fn test_disk_store_drops_corrupt_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(dir.path()).unwrap();
        store.put("c", "k", &Response::new("u", 200, "x")).unwrap();

        let path = store.entry_path("c", "k");
        fs::write(&path, b"not bincode").unwrap();

        assert_eq!(store.get("c", "k").unwrap(), None);
        assert!(!path.exists());
        assert!(store.keys("c").unwrap().is_empty());
    }
}

//! Offline support: every outbound request of the crate passes through here.

pub mod network;
pub mod request;
pub mod storage;
pub mod worker;

pub use network::{Fetcher, HttpFetcher, OfflineFetcher};
pub use request::{Method, Request, RequestMode, Response, ResponseKind};
pub use storage::{Cache, CacheStats, CacheStore, DiskStore, MemoryStore};
pub use worker::{OfflineWorker, WorkerRegistry, WorkerState};

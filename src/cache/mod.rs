//! Generic caching layer for data persistence and offline support.
//!
//! This module provides a service-agnostic caching mechanism that:
//! - Persists JSON values in a namespaced key-value store
//! - Stamps every write and checks it against a caller-supplied TTL
//! - Provides basic offline mode (serve stale cache when the network is unavailable)

mod manager;
mod storage;
mod traits;

pub use manager::{CacheEntry, CacheManager};
pub use storage::{KeyValueStore, MemoryStore, NoopStore, SqliteStore};
pub use traits::{CacheResult, CacheSource, Cacheable, Clock, ManualClock, QueryKey, SystemClock};

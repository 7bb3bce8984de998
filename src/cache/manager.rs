//! Freshness-window cache on top of a key-value store.

use chrono::{DateTime, Duration, Utc};
use color_eyre::Result;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::storage::KeyValueStore;
use super::traits::{Clock, SystemClock};

/// Envelope persisted for every cached value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
  pub key: String,
  pub value: T,
  pub written_at: DateTime<Utc>,
}

/// Timestamp-only view of an entry, readable without knowing the value type.
#[derive(Deserialize)]
struct EntryStamp {
  written_at: DateTime<Utc>,
}

/// Cache manager that decides whether stored data is fresh enough to serve.
///
/// It never talks to the network on its own; callers compose
/// [`read`](CacheManager::read) and [`write`](CacheManager::write) with
/// whatever fetches the data.
pub struct CacheManager<S: KeyValueStore> {
  store: Arc<S>,
  clock: Arc<dyn Clock>,
}

impl<S: KeyValueStore> CacheManager<S> {
  /// Create a cache manager over the given store using the wall clock.
  pub fn new(store: S) -> Self {
    Self {
      store: Arc::new(store),
      clock: Arc::new(SystemClock),
    }
  }

  /// Replace the clock used for timestamps and freshness checks.
  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  pub fn store(&self) -> &S {
    &self.store
  }

  /// Check if data written at `written_at` is older than `ttl`.
  fn is_stale(&self, written_at: DateTime<Utc>, ttl: Duration) -> bool {
    self.clock.now() - written_at > ttl
  }

  /// True when `entry` is still inside its freshness window.
  pub fn is_fresh<T>(&self, entry: &CacheEntry<T>, ttl: Duration) -> bool {
    !self.is_stale(entry.written_at, ttl)
  }

  /// Return the cached value if it was written no more than `ttl` ago.
  pub fn read<T: DeserializeOwned>(&self, key: &str, ttl: Duration) -> Option<T> {
    let entry = self.read_entry::<T>(key)?;
    if self.is_stale(entry.written_at, ttl) {
      debug!(key, written_at = %entry.written_at, "Cache entry is stale");
      return None;
    }
    Some(entry.value)
  }

  /// Return the stored entry regardless of age.
  ///
  /// Storage failures and undecodable entries both read as a miss.
  pub fn read_entry<T: DeserializeOwned>(&self, key: &str) -> Option<CacheEntry<T>> {
    match self.store.get::<CacheEntry<T>>(key) {
      Ok(entry) => entry,
      Err(e) => {
        warn!(key, error = %e, "Cache read failed, treating as miss");
        None
      }
    }
  }

  /// Store `value` stamped with the current time.
  ///
  /// The stamp is strictly later than any previous stamp for the same key.
  pub fn write<T: Serialize>(&self, key: &str, value: &T) -> Result<DateTime<Utc>> {
    let mut written_at = self.clock.now();
    if let Some(previous) = self.stamp_of(key) {
      if written_at <= previous {
        written_at = previous + Duration::milliseconds(1);
      }
    }

    let entry = CacheEntry {
      key: key.to_string(),
      value,
      written_at,
    };
    self.store.set(key, &entry)?;
    debug!(key, %written_at, "Cache entry written");

    Ok(written_at)
  }

  /// Drop the entry for `key`.
  pub fn invalidate(&self, key: &str) -> Result<()> {
    self.store.remove(key)
  }

  /// Delete every entry older than `ttl`, plus any that can't be decoded.
  pub fn purge_expired(&self, ttl: Duration) -> Result<usize> {
    let mut purged = 0;
    for key in self.store.keys()? {
      let expired = match self.stamp_of(&key) {
        Some(written_at) => self.is_stale(written_at, ttl),
        None => true,
      };
      if expired {
        self.store.remove(&key)?;
        purged += 1;
      }
    }
    info!(purged, "Purged expired cache entries");
    Ok(purged)
  }

  fn stamp_of(&self, key: &str) -> Option<DateTime<Utc>> {
    self
      .store
      .get::<EntryStamp>(key)
      .ok()
      .flatten()
      .map(|stamp| stamp.written_at)
  }
}

impl<S: KeyValueStore> Clone for CacheManager<S> {
  fn clone(&self) -> Self {
    Self {
      store: Arc::clone(&self.store),
      clock: Arc::clone(&self.clock),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::storage::{MemoryStore, SqliteStore};
  use crate::cache::traits::ManualClock;

  fn manager() -> (CacheManager<MemoryStore>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::at_epoch());
    let manager = CacheManager::new(MemoryStore::new()).with_clock(clock.clone());
    (manager, clock)
  }

  fn teams() -> Vec<String> {
    vec!["core".to_string(), "infra".to_string()]
  }

  #[test]
  fn test_read_respects_ttl_window() {
    let (cache, clock) = manager();
    cache.write("teams", &teams()).unwrap();

    clock.set(DateTime::<Utc>::default() + Duration::milliseconds(30_000));
    assert_eq!(
      cache.read::<Vec<String>>("teams", Duration::milliseconds(60_000)),
      Some(teams())
    );

    clock.set(DateTime::<Utc>::default() + Duration::milliseconds(90_000));
    assert_eq!(
      cache.read::<Vec<String>>("teams", Duration::milliseconds(60_000)),
      None
    );
  }

  #[test]
  fn test_read_at_exact_ttl_is_fresh() {
    let (cache, clock) = manager();
    cache.write("k", &1).unwrap();
    clock.advance(Duration::seconds(60));

    assert_eq!(cache.read::<i32>("k", Duration::seconds(60)), Some(1));
  }

  #[test]
  fn test_read_without_write_is_none() {
    let (cache, _) = manager();
    assert_eq!(cache.read::<i32>("missing", Duration::hours(1)), None);
  }

  #[test]
  fn test_read_is_idempotent() {
    let (cache, clock) = manager();
    cache.write("k", &teams()).unwrap();
    clock.advance(Duration::seconds(5));

    let first = cache.read::<Vec<String>>("k", Duration::minutes(1));
    let second = cache.read::<Vec<String>>("k", Duration::minutes(1));
    assert_eq!(first, second);
  }

  #[test]
  fn test_write_stamps_increase_monotonically() {
    let (cache, _) = manager();

    // Clock never moves, stamps still have to advance
    let first = cache.write("k", &1).unwrap();
    let second = cache.write("k", &2).unwrap();
    assert!(second > first);

    let entry = cache.read_entry::<i32>("k").unwrap();
    assert_eq!(entry.value, 2);
    assert_eq!(entry.written_at, second);
    assert_eq!(entry.key, "k");
  }

  #[test]
  fn test_corrupt_entry_is_a_miss() {
    let (cache, _) = manager();
    cache.store().set_raw("k", "garbage".to_string()).unwrap();

    assert_eq!(cache.read::<i32>("k", Duration::hours(1)), None);
    // Writing over a corrupt entry works
    cache.write("k", &3).unwrap();
    assert_eq!(cache.read::<i32>("k", Duration::hours(1)), Some(3));
  }

  #[test]
  fn test_invalidate_removes_entry() {
    let (cache, _) = manager();
    cache.write("k", &1).unwrap();
    cache.invalidate("k").unwrap();
    assert!(cache.read_entry::<i32>("k").is_none());
  }

  #[test]
  fn test_purge_expired_keeps_fresh_entries() {
    let (cache, clock) = manager();
    cache.write("old", &1).unwrap();
    clock.advance(Duration::minutes(10));
    cache.write("new", &2).unwrap();
    cache.store().set_raw("broken", "{".to_string()).unwrap();

    let purged = cache.purge_expired(Duration::minutes(5)).unwrap();

    assert_eq!(purged, 2);
    assert_eq!(cache.store().keys().unwrap(), vec!["new".to_string()]);
  }

  #[test]
  fn test_manager_over_sqlite_store() {
    let cache = CacheManager::new(SqliteStore::in_memory("test").unwrap());
    cache.write("k", &teams()).unwrap();
    assert_eq!(
      cache.read::<Vec<String>>("k", Duration::minutes(1)),
      Some(teams())
    );
  }
}

//! Core traits and types for the caching system.

use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

/// Records that carry their own identity within one accumulated result set.
pub trait Cacheable {
  /// Unique identifier for this record (e.g., team id, ticket number)
  fn cache_key(&self) -> String;
}

/// Trait for query descriptors that map to a stable storage key.
pub trait QueryKey {
  /// Stable, fixed-length key used for storage lookups
  fn cache_hash(&self) -> String;

  /// Human-readable description for logs
  fn description(&self) -> String;
}

/// Source of the current time.
///
/// Abstracted so freshness checks can be tested without sleeping.
pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
  now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
  pub fn new(start: DateTime<Utc>) -> Self {
    Self {
      now: Mutex::new(start),
    }
  }

  /// Start at the Unix epoch, convenient for "t=0" style tests.
  pub fn at_epoch() -> Self {
    Self::new(DateTime::<Utc>::default())
  }

  pub fn set(&self, at: DateTime<Utc>) {
    if let Ok(mut now) = self.now.lock() {
      *now = at;
    }
  }

  pub fn advance(&self, by: Duration) {
    if let Ok(mut now) = self.now.lock() {
      *now += by;
    }
  }
}

impl Clock for ManualClock {
  fn now(&self) -> DateTime<Utc> {
    self
      .now
      .lock()
      .map(|now| *now)
      .unwrap_or(DateTime::<Utc>::default())
  }
}

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
  /// Why the network fetch failed, when serving offline
  pub error: Option<String>,
}

impl<T> CacheResult<T> {
  /// Create a new cache result from fresh network data.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
      error: None,
    }
  }

  /// Create a new cache result from fresh cached data.
  pub fn from_cache(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::CacheFresh,
      cached_at: Some(cached_at),
      error: None,
    }
  }

  /// Create a new cache result for offline mode.
  pub fn offline(data: T, cached_at: DateTime<Utc>, error: impl Into<String>) -> Self {
    Self {
      data,
      source: CacheSource::Offline,
      cached_at: Some(cached_at),
      error: Some(error.into()),
    }
  }
}

/// Indicates where cached data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Data from cache, still considered fresh
  CacheFresh,
  /// Network unavailable, serving stale cached data
  Offline,
}

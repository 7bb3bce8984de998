//! Cache-first loading of paged data sets.
//!
//! Ties the pieces together: a fresh cache entry is served as-is, otherwise
//! the pages are fetched, projected, deduplicated and written back.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::future::Future;
use tracing::{info, warn};

use crate::cache::{CacheManager, CacheResult, KeyValueStore, QueryKey};
use crate::config::SourceConfig;
use crate::fetch::{
  CancelToken, FailurePolicy, FetchError, PageLimits, PageRequest, PageResult, PaginatedFetcher,
};
use crate::project::{project_all, DedupPolicy, ProjectedRecord, Projector};

/// Cache key for a configured source.
///
/// Besides name and URL the key covers the request and projection settings,
/// so editing either in the config starts from an empty cache.
#[derive(Debug, Clone)]
pub struct SourceKey {
  pub name: String,
  pub url: String,
  pub shape: String,
}

impl SourceKey {
  pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      url: url.into(),
      shape: String::new(),
    }
  }

  /// Key for a configured source, fingerprinting everything that changes the cached records.
  pub fn for_source(name: &str, config: &SourceConfig) -> Self {
    let shape = serde_json::to_string(&(
      &config.query,
      &config.pagination,
      &config.projection,
      config.dedup,
    ))
    .unwrap_or_default();

    Self {
      shape,
      ..Self::new(name, config.url.as_str())
    }
  }
}

impl QueryKey for SourceKey {
  fn cache_hash(&self) -> String {
    let input = format!("source:{}:{}:{}", self.name, self.url.trim(), self.shape);

    // SHA256 hash for stable, fixed-length keys
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
  }

  fn description(&self) -> String {
    format!("{} ({})", self.name, self.url)
  }
}

/// The data set stored in the cache for one source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSet {
  pub records: Vec<ProjectedRecord>,
  /// A safety bound stopped pagination before the last page
  #[serde(default)]
  pub truncated: bool,
  /// Cancelled or failed mid-way; never written to the cache
  #[serde(default, skip_serializing)]
  pub partial: bool,
  /// Raw records the projector rejected
  #[serde(default)]
  pub dropped: usize,
}

/// How to page through one source.
#[derive(Debug, Clone)]
pub struct FetchPlan {
  pub first: PageRequest,
  pub limits: PageLimits,
  pub dedup: DedupPolicy,
  pub policy: FailurePolicy,
}

impl FetchPlan {
  pub fn new(first: PageRequest) -> Self {
    Self {
      first,
      limits: PageLimits::default(),
      dedup: DedupPolicy::default(),
      policy: FailurePolicy::default(),
    }
  }
}

/// Per-call switches.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
  /// Skip the freshness check and always hit the network
  pub refresh: bool,
  pub cancel: Option<CancelToken>,
}

/// Loader that serves cached record sets and refetches them when stale.
pub struct Loader<S: KeyValueStore> {
  cache: CacheManager<S>,
}

impl<S: KeyValueStore> Loader<S> {
  pub fn new(cache: CacheManager<S>) -> Self {
    Self { cache }
  }

  pub fn cache(&self) -> &CacheManager<S> {
    &self.cache
  }

  /// Load the record set for `key`.
  ///
  /// Only page-request failures surface as errors, and only when nothing is
  /// cached for the key. A failed or cancelled fetch never touches the cache;
  /// when a cached copy exists it is served as offline data instead of a
  /// failed run or an empty cancelled one.
  pub async fn load<K, R, P, F, Fut>(
    &self,
    key: &K,
    ttl: Duration,
    plan: &FetchPlan,
    projector: &P,
    page_fn: F,
    options: LoadOptions,
  ) -> Result<CacheResult<RecordSet>, FetchError>
  where
    K: QueryKey,
    P: Projector<R> + ?Sized,
    F: FnMut(PageRequest) -> Fut,
    Fut: Future<Output = Result<PageResult<R>, FetchError>>,
  {
    let hash = key.cache_hash();
    let cached = self.cache.read_entry::<RecordSet>(&hash);

    if let Some(entry) = &cached {
      if !options.refresh && self.cache.is_fresh(entry, ttl) {
        info!(source = %key.description(), "Serving fresh cache");
        return Ok(CacheResult::from_cache(entry.value.clone(), entry.written_at));
      }
    }

    let mut fetcher = PaginatedFetcher::new()
      .with_limits(plan.limits)
      .with_policy(plan.policy);
    if let Some(cancel) = options.cancel {
      fetcher = fetcher.with_cancel(cancel);
    }

    let outcome = match fetcher.fetch_all(plan.first.clone(), page_fn).await {
      Ok(outcome) => outcome,
      Err(e) => {
        return match cached {
          Some(entry) => {
            warn!(source = %key.description(), error = %e, "Fetch failed, serving stale cache");
            Ok(CacheResult::offline(entry.value, entry.written_at, e.to_string()))
          }
          None => Err(e),
        };
      }
    };

    let projection = project_all(&outcome.items, projector, plan.dedup);
    let partial = outcome.cancelled || outcome.error.is_some();
    let set = RecordSet {
      records: projection.records,
      truncated: outcome.truncated,
      partial,
      dropped: projection.dropped,
    };

    if partial {
      // Failed or empty runs fall back to the cached copy when there is one
      if let Some(entry) = cached {
        if outcome.error.is_some() || set.records.is_empty() {
          let reason = match &outcome.error {
            Some(e) => e.to_string(),
            None => "cancelled".to_string(),
          };
          warn!(source = %key.description(), error = %reason, "Fetch incomplete, serving stale cache");
          return Ok(CacheResult::offline(entry.value, entry.written_at, reason));
        }
      }
      info!(
        source = %key.description(),
        records = set.records.len(),
        "Partial result, cache left untouched"
      );
      let mut result = CacheResult::from_network(set);
      result.error = outcome.error.map(|e| e.to_string());
      return Ok(result);
    }

    if let Err(e) = self.cache.write(&hash, &set) {
      warn!(source = %key.description(), error = %e, "Failed to write cache entry");
    } else {
      info!(source = %key.description(), records = set.records.len(), "Cached fresh result");
    }

    Ok(CacheResult::from_network(set))
  }

  /// Forget the cached record set for `key`.
  pub fn invalidate<K: QueryKey>(&self, key: &K) -> color_eyre::Result<()> {
    self.cache.invalidate(&key.cache_hash())
  }

  /// Cached record set for `key`, fresh or not.
  pub fn peek<K: QueryKey>(&self, key: &K) -> Option<crate::cache::CacheEntry<RecordSet>> {
    self.cache.read_entry(&key.cache_hash())
  }
}

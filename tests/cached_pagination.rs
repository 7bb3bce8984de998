//! End-to-end tests for cache-first paged loading.
//!
//! Pages are scripted JSON bodies decoded with the same parser the HTTP
//! source uses, so no network is involved.

use std::sync::Arc;

use chrono::Duration;
use serde_json::{json, Value};
use tempfile::TempDir;

use pagestash::cache::{CacheManager, CacheSource, ManualClock, SqliteStore};
use pagestash::config::Config;
use pagestash::fetch::{FetchError, PageRequest, PageResult};
use pagestash::loader::{FetchPlan, LoadOptions, Loader, SourceKey};
use pagestash::source::parse_page;

const CONFIG: &str = r#"
sources:
  teams:
    url: https://api.example.com/v1/teams
    ttl_secs: 60
    pagination:
      style: cursor
      limit: 2
      items: data
      next_cursor: meta.next
    projection:
      id: id
      title: name
      subtitle: lead.name
"#;

fn bodies() -> Vec<Value> {
  vec![
    json!({
      "data": [
        { "id": 1, "name": "core", "lead": { "name": "ana" } },
        { "id": 2, "name": "" }
      ],
      "meta": { "next": "p2" }
    }),
    json!({
      "data": [
        { "id": 3, "name": "infra" },
        { "id": 1, "name": "core-renamed" }
      ],
      "meta": { "next": null }
    }),
  ]
}

fn open_loader(dir: &TempDir, clock: Arc<ManualClock>) -> Loader<SqliteStore> {
  let store = SqliteStore::open_at(&dir.path().join("cache.db"), "test").unwrap();
  Loader::new(CacheManager::new(store).with_clock(clock))
}

fn titles(records: &[pagestash::project::ProjectedRecord]) -> Vec<&str> {
  records.iter().map(|r| r.title.as_str()).collect()
}

#[tokio::test]
async fn test_fetch_cache_and_expire() {
  let config = Config::from_yaml(CONFIG).unwrap();
  let teams = config.source("teams").unwrap();
  let projector = teams.projection.projector();
  let plan = FetchPlan::new(teams.pagination.first_request());
  let key = SourceKey::for_source("teams", teams);

  let dir = TempDir::new().unwrap();
  let clock = Arc::new(ManualClock::at_epoch());
  let loader = open_loader(&dir, clock.clone());

  let mut pages = bodies().into_iter();
  let mut requests = Vec::new();
  let result = loader
    .load(
      &key,
      teams.ttl(),
      &plan,
      &projector,
      |request: PageRequest| {
        requests.push(request.clone());
        let page = match pages.next() {
          Some(body) => parse_page(&teams.pagination, &request, body),
          None => Err(FetchError::Page("no more pages".into())),
        };
        async move { page }
      },
      LoadOptions::default(),
    )
    .await
    .unwrap();

  assert_eq!(result.source, CacheSource::Network);
  assert_eq!(titles(&result.data.records), vec!["core-renamed", "infra"]);
  assert_eq!(result.data.dropped, 1);
  assert_eq!(requests.len(), 2);
  assert_eq!(requests[1].current_cursor(), Some("p2"));

  // Within the TTL the cache answers, even across a reopen of the database
  clock.advance(Duration::seconds(30));
  let reopened = open_loader(&dir, clock.clone());
  let cached = reopened
    .load(
      &key,
      teams.ttl(),
      &plan,
      &projector,
      |_| async { Err::<PageResult<Value>, _>(FetchError::Page("offline".into())) },
      LoadOptions::default(),
    )
    .await
    .unwrap();
  assert_eq!(cached.source, CacheSource::CacheFresh);
  assert_eq!(cached.data, result.data);

  // Past the TTL a failing network falls back to the stale copy
  clock.advance(Duration::seconds(60));
  let stale = reopened
    .load(
      &key,
      teams.ttl(),
      &plan,
      &projector,
      |_| async {
        Err::<PageResult<Value>, _>(FetchError::Http {
          status: 503,
          body: "maintenance".into(),
        })
      },
      LoadOptions::default(),
    )
    .await
    .unwrap();
  assert_eq!(stale.source, CacheSource::Offline);
  assert_eq!(titles(&stale.data.records), vec!["core-renamed", "infra"]);
  assert!(stale.error.unwrap().contains("503"));
}

#[tokio::test]
async fn test_decode_failure_is_surfaced_without_cache() {
  let config = Config::from_yaml(CONFIG).unwrap();
  let teams = config.source("teams").unwrap();
  let projector = teams.projection.projector();
  let plan = FetchPlan::new(teams.pagination.first_request());
  let key = SourceKey::for_source("teams", teams);

  let dir = TempDir::new().unwrap();
  let loader = open_loader(&dir, Arc::new(ManualClock::at_epoch()));

  let result = loader
    .load(
      &key,
      teams.ttl(),
      &plan,
      &projector,
      |request: PageRequest| {
        let page = parse_page(&teams.pagination, &request, json!({ "error": "nope" }));
        async move { page }
      },
      LoadOptions::default(),
    )
    .await;

  assert!(matches!(result, Err(FetchError::Decode(_))));
  assert!(loader.peek(&key).is_none());
}

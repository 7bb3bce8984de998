//! Projection of raw API records into the minimal display shape.

mod json;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use crate::cache::Cacheable;

pub use json::{FieldPath, JsonProjector};

/// The fields a list row needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectedRecord {
  pub id: String,
  pub title: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub subtitle: Option<String>,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub metadata: BTreeMap<String, String>,
}

impl ProjectedRecord {
  pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      title: title.into(),
      subtitle: None,
      metadata: BTreeMap::new(),
    }
  }

  pub fn with_subtitle(mut self, subtitle: impl Into<String>) -> Self {
    self.subtitle = Some(subtitle.into());
    self
  }

  pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.metadata.insert(key.into(), value.into());
    self
  }
}

impl Cacheable for ProjectedRecord {
  fn cache_key(&self) -> String {
    self.id.clone()
  }
}

/// Maps one raw record to a [`ProjectedRecord`].
///
/// Returning `None` drops the record. Implementations must not panic on
/// malformed input.
pub trait Projector<R> {
  fn project(&self, raw: &R) -> Option<ProjectedRecord>;
}

impl<R, F> Projector<R> for F
where
  F: Fn(&R) -> Option<ProjectedRecord>,
{
  fn project(&self, raw: &R) -> Option<ProjectedRecord> {
    self(raw)
  }
}

/// How repeated ids in one result set are handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DedupPolicy {
  /// Later occurrence replaces the earlier one, keeping the first position
  #[default]
  KeepLast,
  /// First occurrence wins, later ones are ignored
  KeepFirst,
  /// No deduplication
  KeepAll,
}

/// Output of [`project_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Projection {
  pub records: Vec<ProjectedRecord>,
  /// Raw records the projector rejected
  pub dropped: usize,
  /// Records collapsed into an earlier occurrence with the same id
  pub duplicates: usize,
}

/// Project every raw record, dropping rejects and collapsing duplicate ids.
pub fn project_all<R, P>(raw: &[R], projector: &P, dedup: DedupPolicy) -> Projection
where
  P: Projector<R> + ?Sized,
{
  let mut projection = Projection::default();
  let mut positions: HashMap<String, usize> = HashMap::new();

  for record in raw {
    let Some(projected) = projector.project(record) else {
      projection.dropped += 1;
      continue;
    };

    if dedup == DedupPolicy::KeepAll {
      projection.records.push(projected);
      continue;
    }

    let key = projected.cache_key();
    match positions.get(&key) {
      Some(&index) => {
        projection.duplicates += 1;
        if dedup == DedupPolicy::KeepLast {
          projection.records[index] = projected;
        }
      }
      None => {
        positions.insert(key, projection.records.len());
        projection.records.push(projected);
      }
    }
  }

  if projection.dropped > 0 || projection.duplicates > 0 {
    debug!(
      kept = projection.records.len(),
      dropped = projection.dropped,
      duplicates = projection.duplicates,
      "Projected records"
    );
  }

  projection
}

#[cfg(test)]
mod tests {
  use super::*;

  #[derive(Debug)]
  struct Raw {
    id: Option<u32>,
    name: &'static str,
  }

  fn raw(id: Option<u32>, name: &'static str) -> Raw {
    Raw { id, name }
  }

  fn by_id(raw: &Raw) -> Option<ProjectedRecord> {
    let id = raw.id?;
    if raw.name.is_empty() {
      return None;
    }
    Some(ProjectedRecord::new(id.to_string(), raw.name))
  }

  fn titles(projection: &Projection) -> Vec<&str> {
    projection.records.iter().map(|r| r.title.as_str()).collect()
  }

  #[test]
  fn test_drops_records_missing_required_fields() {
    let records = vec![raw(Some(1), "one"), raw(None, "orphan"), raw(Some(2), "")];

    let projection = project_all(&records, &by_id, DedupPolicy::KeepLast);

    assert_eq!(titles(&projection), vec!["one"]);
    assert_eq!(projection.dropped, 2);
  }

  #[test]
  fn test_keep_last_replaces_in_first_position() {
    let records = vec![
      raw(Some(1), "old"),
      raw(Some(2), "two"),
      raw(Some(1), "new"),
    ];

    let projection = project_all(&records, &by_id, DedupPolicy::KeepLast);

    assert_eq!(titles(&projection), vec!["new", "two"]);
    assert_eq!(projection.duplicates, 1);
  }

  #[test]
  fn test_keep_first_ignores_later_duplicates() {
    let records = vec![raw(Some(1), "old"), raw(Some(1), "new")];

    let projection = project_all(&records, &by_id, DedupPolicy::KeepFirst);

    assert_eq!(titles(&projection), vec!["old"]);
  }

  #[test]
  fn test_keep_all_preserves_duplicates() {
    let records = vec![raw(Some(1), "old"), raw(Some(1), "new")];

    let projection = project_all(&records, &by_id, DedupPolicy::KeepAll);

    assert_eq!(titles(&projection), vec!["old", "new"]);
    assert_eq!(projection.duplicates, 0);
  }

  #[test]
  fn test_record_builder() {
    let record = ProjectedRecord::new("1", "title")
      .with_subtitle("sub")
      .with_meta("owner", "me");
    assert_eq!(record.cache_key(), "1");
    assert_eq!(record.subtitle.as_deref(), Some("sub"));
    assert_eq!(record.metadata.get("owner").map(String::as_str), Some("me"));
  }
}

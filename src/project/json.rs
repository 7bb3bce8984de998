//! Config-driven projector over untyped JSON records.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

use super::{ProjectedRecord, Projector};

/// Location of a field inside a JSON document.
///
/// Accepts JSON Pointer syntax (`/owner/login`) or dotted syntax (`owner.login`).
/// Numeric segments index into arrays.
#[derive(Debug, Clone)]
pub struct FieldPath {
  raw: String,
  pointer: String,
}

// Paths are equal when they address the same location, whatever the spelling
impl PartialEq for FieldPath {
  fn eq(&self, other: &Self) -> bool {
    self.pointer == other.pointer
  }
}

impl Eq for FieldPath {}

impl FieldPath {
  pub fn parse(path: &str) -> Self {
    let trimmed = path.trim();
    let pointer = if trimmed.is_empty() || trimmed.starts_with('/') {
      trimmed.to_string()
    } else {
      trimmed
        .split('.')
        .map(|segment| format!("/{}", segment.replace('~', "~0").replace('/', "~1")))
        .collect()
    };

    Self {
      raw: trimmed.to_string(),
      pointer,
    }
  }

  /// Path that refers to the whole document.
  pub fn root() -> Self {
    Self::parse("")
  }

  pub fn is_root(&self) -> bool {
    self.pointer.is_empty()
  }

  pub fn lookup<'a>(&self, value: &'a Value) -> Option<&'a Value> {
    value.pointer(&self.pointer)
  }

  /// Move the value at this path out of the document, leaving `null` behind.
  pub fn take(&self, value: &mut Value) -> Option<Value> {
    value.pointer_mut(&self.pointer).map(Value::take)
  }

  /// Scalar at this path rendered as text. Empty strings and nulls count as missing.
  pub fn text(&self, value: &Value) -> Option<String> {
    self.lookup(value).and_then(scalar_text)
  }
}

impl fmt::Display for FieldPath {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.raw)
  }
}

impl Serialize for FieldPath {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&self.raw)
  }
}

impl<'de> Deserialize<'de> for FieldPath {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let raw = String::deserialize(deserializer)?;
    Ok(Self::parse(&raw))
  }
}

fn scalar_text(value: &Value) -> Option<String> {
  match value {
    Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    Value::Bool(b) => Some(b.to_string()),
    Value::Array(items) => {
      let parts: Vec<String> = items.iter().filter_map(scalar_text).collect();
      if parts.is_empty() {
        None
      } else {
        Some(parts.join(", "))
      }
    }
    _ => None,
  }
}

/// Projector that reads id, title, subtitle and metadata from configured paths.
#[derive(Debug, Clone)]
pub struct JsonProjector {
  id: FieldPath,
  title: FieldPath,
  subtitle: Option<FieldPath>,
  metadata: Vec<(String, FieldPath)>,
}

impl JsonProjector {
  pub fn new(id: &str, title: &str) -> Self {
    Self {
      id: FieldPath::parse(id),
      title: FieldPath::parse(title),
      subtitle: None,
      metadata: Vec::new(),
    }
  }

  pub fn with_subtitle(mut self, path: &str) -> Self {
    self.subtitle = Some(FieldPath::parse(path));
    self
  }

  pub fn with_meta(mut self, label: &str, path: &str) -> Self {
    self.metadata.push((label.to_string(), FieldPath::parse(path)));
    self
  }
}

impl Projector<Value> for JsonProjector {
  fn project(&self, raw: &Value) -> Option<ProjectedRecord> {
    let id = self.id.text(raw)?;
    let title = self.title.text(raw)?;

    let mut record = ProjectedRecord::new(id, title);
    record.subtitle = self.subtitle.as_ref().and_then(|path| path.text(raw));
    for (label, path) in &self.metadata {
      if let Some(value) = path.text(raw) {
        record.metadata.insert(label.clone(), value);
      }
    }

    Some(record)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn projector() -> JsonProjector {
    JsonProjector::new("id", "name")
      .with_subtitle("/owner/login")
      .with_meta("tags", "tags")
      .with_meta("stars", "stats.stars")
  }

  #[test]
  fn test_dotted_and_pointer_paths_agree() {
    let doc = json!({ "owner": { "login": "octo" } });
    assert_eq!(FieldPath::parse("owner.login").text(&doc), Some("octo".into()));
    assert_eq!(FieldPath::parse("/owner/login").text(&doc), Some("octo".into()));
  }

  #[test]
  fn test_numeric_segments_index_arrays() {
    let doc = json!({ "items": [{ "id": 1 }, { "id": 2 }] });
    assert_eq!(FieldPath::parse("items.1.id").text(&doc), Some("2".into()));
  }

  #[test]
  fn test_projects_full_record() {
    let doc = json!({
      "id": 42,
      "name": "pagestash",
      "owner": { "login": "octo" },
      "tags": ["rust", "cache"],
      "stats": { "stars": 10 }
    });

    let record = projector().project(&doc).unwrap();

    assert_eq!(record.id, "42");
    assert_eq!(record.title, "pagestash");
    assert_eq!(record.subtitle.as_deref(), Some("octo"));
    assert_eq!(record.metadata["tags"], "rust, cache");
    assert_eq!(record.metadata["stars"], "10");
  }

  #[test]
  fn test_missing_required_field_is_dropped() {
    assert!(projector().project(&json!({ "name": "no id" })).is_none());
    assert!(projector().project(&json!({ "id": 1, "name": "" })).is_none());
    assert!(projector().project(&json!({ "id": 1, "name": null })).is_none());
    assert!(projector().project(&json!("not an object")).is_none());
  }

  #[test]
  fn test_optional_fields_may_be_absent() {
    let record = projector()
      .project(&json!({ "id": "a", "name": "bare" }))
      .unwrap();
    assert!(record.subtitle.is_none());
    assert!(record.metadata.is_empty());
  }

  #[test]
  fn test_field_path_deserializes_from_string() {
    let path: FieldPath = serde_json::from_value(json!("data.items")).unwrap();
    assert_eq!(path, FieldPath::parse("/data/items"));
    assert_eq!(path.to_string(), "data.items");
  }
}

//! Key-value storage trait and its SQLite, in-memory and no-op backends.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// Trait for durable string-keyed storage scoped to one namespace.
///
/// Values are JSON text. A `set` is visible to every later `get` in the same process.
pub trait KeyValueStore: Send + Sync {
  /// Raw stored text for a key.
  fn get_raw(&self, key: &str) -> Result<Option<String>>;

  /// Persist raw text under a key, replacing any existing value.
  fn set_raw(&self, key: &str, value: String) -> Result<()>;

  /// Delete a key. Removing a missing key is not an error.
  fn remove(&self, key: &str) -> Result<()>;

  /// All keys in this namespace.
  fn keys(&self) -> Result<Vec<String>>;

  /// Delete every key in this namespace.
  fn clear(&self) -> Result<()>;

  /// Decode the value stored under `key`.
  ///
  /// Undecodable data is reported as absent so a corrupt cache simply resets.
  fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>>
  where
    Self: Sized,
  {
    let Some(raw) = self.get_raw(key)? else {
      return Ok(None);
    };

    match serde_json::from_str(&raw) {
      Ok(value) => Ok(Some(value)),
      Err(e) => {
        warn!(key, error = %e, "Discarding corrupt cache value");
        Ok(None)
      }
    }
  }

  /// Encode `value` as JSON and store it under `key`.
  fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()>
  where
    Self: Sized,
  {
    let raw = serde_json::to_string(value).map_err(|e| eyre!("Failed to serialize value: {}", e))?;
    self.set_raw(key, raw)
  }
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStore;

impl KeyValueStore for NoopStore {
  fn get_raw(&self, _key: &str) -> Result<Option<String>> {
    Ok(None) // Always miss
  }

  fn set_raw(&self, _key: &str, _value: String) -> Result<()> {
    Ok(()) // Discard
  }

  fn remove(&self, _key: &str) -> Result<()> {
    Ok(())
  }

  fn keys(&self) -> Result<Vec<String>> {
    Ok(Vec::new())
  }

  fn clear(&self) -> Result<()> {
    Ok(())
  }
}

/// Process-local store, handy for tests and one-shot runs.
#[derive(Default)]
pub struct MemoryStore {
  entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
    self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

impl KeyValueStore for MemoryStore {
  fn get_raw(&self, key: &str) -> Result<Option<String>> {
    Ok(self.lock()?.get(key).cloned())
  }

  fn set_raw(&self, key: &str, value: String) -> Result<()> {
    self.lock()?.insert(key.to_string(), value);
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    self.lock()?.remove(key);
    Ok(())
  }

  fn keys(&self) -> Result<Vec<String>> {
    let mut keys: Vec<String> = self.lock()?.keys().cloned().collect();
    keys.sort();
    Ok(keys)
  }

  fn clear(&self) -> Result<()> {
    self.lock()?.clear();
    Ok(())
  }
}

/// SQLite-based storage implementation.
pub struct SqliteStore {
  conn: Mutex<Connection>,
  namespace: String,
}

/// Schema for the key-value table.
const KV_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv_store (
    namespace TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (namespace, key)
);
"#;

impl SqliteStore {
  /// Open the store at the default location.
  pub fn open(namespace: &str) -> Result<Self> {
    let path = Self::default_path()?;
    Self::open_at(&path, namespace)
  }

  /// Open (or create) the store at an explicit path.
  pub fn open_at(path: &Path, namespace: &str) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn, namespace)
  }

  /// Open a store that lives only as long as this value.
  pub fn in_memory(namespace: &str) -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory database: {}", e))?;
    Self::with_connection(conn, namespace)
  }

  fn with_connection(conn: Connection, namespace: &str) -> Result<Self> {
    let store = Self {
      conn: Mutex::new(conn),
      namespace: namespace.to_string(),
    };
    store.run_migrations()?;
    Ok(store)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("pagestash").join("cache.db"))
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  /// Run database migrations for the cache table.
  fn run_migrations(&self) -> Result<()> {
    self
      .lock()?
      .execute_batch(KV_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

impl KeyValueStore for SqliteStore {
  fn get_raw(&self, key: &str) -> Result<Option<String>> {
    let conn = self.lock()?;

    conn
      .query_row(
        "SELECT value FROM kv_store WHERE namespace = ? AND key = ?",
        params![self.namespace, key],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read key {}: {}", key, e))
  }

  fn set_raw(&self, key: &str, value: String) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute(
        "INSERT OR REPLACE INTO kv_store (namespace, key, value, updated_at)
         VALUES (?, ?, ?, datetime('now'))",
        params![self.namespace, key, value],
      )
      .map_err(|e| eyre!("Failed to store key {}: {}", key, e))?;

    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute(
        "DELETE FROM kv_store WHERE namespace = ? AND key = ?",
        params![self.namespace, key],
      )
      .map_err(|e| eyre!("Failed to remove key {}: {}", key, e))?;

    Ok(())
  }

  fn keys(&self) -> Result<Vec<String>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare("SELECT key FROM kv_store WHERE namespace = ? ORDER BY key")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let keys = stmt
      .query_map(params![self.namespace], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list keys: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read key row: {}", e))?;

    Ok(keys)
  }

  fn clear(&self) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute(
        "DELETE FROM kv_store WHERE namespace = ?",
        params![self.namespace],
      )
      .map_err(|e| eyre!("Failed to clear namespace {}: {}", self.namespace, e))?;

    Ok(())
  }
}

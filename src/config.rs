use chrono::Duration;
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::fetch::{FailurePolicy, PageLimits, PageRequest};
use crate::project::{DedupPolicy, FieldPath, JsonProjector};

/// A config file that parsed but doesn't describe a usable setup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
  #[error("sources.{name}.{field} is required")]
  Missing { name: String, field: &'static str },

  #[error("sources.{name}.{field} is invalid: {reason}")]
  Invalid {
    name: String,
    field: &'static str,
    reason: String,
  },

  #[error("unknown source '{0}'")]
  UnknownSource(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub log: LogConfig,
  #[serde(default)]
  pub sources: BTreeMap<String, SourceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Database file (defaults to $XDG_DATA_HOME/pagestash/cache.db)
  pub path: Option<PathBuf>,
  #[serde(default = "default_namespace")]
  pub namespace: String,
  #[serde(default = "default_true")]
  pub enabled: bool,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      path: None,
      namespace: default_namespace(),
      enabled: true,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
  /// Default filter when RUST_LOG is not set
  #[serde(default = "default_log_level")]
  pub level: String,
  /// Write to a daily log file instead of stderr
  #[serde(default)]
  pub file: bool,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: default_log_level(),
      file: false,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
  pub url: String,
  #[serde(default = "default_ttl_secs")]
  pub ttl_secs: u64,
  #[serde(default)]
  pub auth: Option<AuthConfig>,
  #[serde(default)]
  pub pagination: PaginationConfig,
  pub projection: ProjectionConfig,
  #[serde(default)]
  pub dedup: DedupPolicy,
  /// Extra fixed query parameters sent with every page request
  #[serde(default)]
  pub query: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthKind {
  /// `Authorization: Bearer <token>`
  #[default]
  Bearer,
  /// Token sent verbatim in a named header
  ApiKey,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
  #[serde(default)]
  pub kind: AuthKind,
  /// Environment variable holding the secret
  pub token_env: String,
  /// Header name for `api_key` auth
  #[serde(default = "default_api_key_header")]
  pub header: String,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PageStyle {
  #[default]
  Offset,
  Cursor,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PaginationConfig {
  pub style: PageStyle,
  pub limit: u64,
  pub offset_param: String,
  pub limit_param: String,
  pub cursor_param: String,
  /// Path to the record array; empty means the body itself is the array
  pub items: FieldPath,
  pub has_more: Option<FieldPath>,
  pub next_cursor: Option<FieldPath>,
  pub total: Option<FieldPath>,
  pub is_last: Option<FieldPath>,
  pub max_pages: usize,
  pub max_items: usize,
}

impl Default for PaginationConfig {
  fn default() -> Self {
    let limits = PageLimits::default();
    Self {
      style: PageStyle::Offset,
      limit: 50,
      offset_param: "offset".to_string(),
      limit_param: "limit".to_string(),
      cursor_param: "cursor".to_string(),
      items: FieldPath::root(),
      has_more: None,
      next_cursor: None,
      total: None,
      is_last: None,
      max_pages: limits.max_pages,
      max_items: limits.max_items,
    }
  }
}

impl PaginationConfig {
  pub fn first_request(&self) -> PageRequest {
    match self.style {
      PageStyle::Offset => PageRequest::offset(self.limit),
      PageStyle::Cursor => PageRequest::cursor(self.limit),
    }
  }

  pub fn limits(&self) -> PageLimits {
    PageLimits {
      max_pages: self.max_pages,
      max_items: self.max_items,
    }
  }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProjectionConfig {
  pub id: String,
  pub title: String,
  pub subtitle: Option<String>,
  #[serde(default)]
  pub metadata: BTreeMap<String, String>,
}

impl ProjectionConfig {
  pub fn projector(&self) -> JsonProjector {
    let mut projector = JsonProjector::new(&self.id, &self.title);
    if let Some(subtitle) = &self.subtitle {
      projector = projector.with_subtitle(subtitle);
    }
    for (label, path) in &self.metadata {
      projector = projector.with_meta(label, path);
    }
    projector
  }
}

/// Ten years; anything longer is treated as "never expires".
const MAX_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

fn default_namespace() -> String {
  "default".to_string()
}

fn default_true() -> bool {
  true
}

fn default_log_level() -> String {
  "info".to_string()
}

fn default_ttl_secs() -> u64 {
  3600
}

fn default_api_key_header() -> String {
  "X-API-Key".to_string()
}

impl SourceConfig {
  pub fn ttl(&self) -> Duration {
    Duration::seconds(self.ttl_secs.min(MAX_TTL_SECS) as i64)
  }

  pub fn failure_policy(&self, partial: bool) -> FailurePolicy {
    if partial {
      FailurePolicy::ReturnPartial
    } else {
      FailurePolicy::Discard
    }
  }

  /// Check the fields every fetch depends on.
  pub fn validate(&self, name: &str) -> std::result::Result<(), ConfigError> {
    let missing = |field| ConfigError::Missing {
      name: name.to_string(),
      field,
    };
    let invalid = |field, reason: String| ConfigError::Invalid {
      name: name.to_string(),
      field,
      reason,
    };

    if self.url.trim().is_empty() {
      return Err(missing("url"));
    }
    url::Url::parse(&self.url).map_err(|e| invalid("url", e.to_string()))?;

    if self.projection.id.trim().is_empty() {
      return Err(missing("projection.id"));
    }
    if self.projection.title.trim().is_empty() {
      return Err(missing("projection.title"));
    }

    let pagination = &self.pagination;
    if pagination.limit == 0 {
      return Err(invalid("pagination.limit", "must be greater than 0".into()));
    }
    if pagination.max_pages == 0 {
      return Err(invalid("pagination.max_pages", "must be greater than 0".into()));
    }
    if pagination.style == PageStyle::Cursor && pagination.next_cursor.is_none() {
      return Err(missing("pagination.next_cursor"));
    }

    if let Some(auth) = &self.auth {
      if auth.token_env.trim().is_empty() {
        return Err(missing("auth.token_env"));
      }
    }

    Ok(())
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./pagestash.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/pagestash/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/pagestash/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("pagestash.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("pagestash").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to load config file {}: {}", path.display(), e))
  }

  /// Parse and validate a YAML document.
  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config =
      serde_yaml::from_str(contents).map_err(|e| eyre!("Failed to parse config: {}", e))?;
    config.validate()?;
    Ok(config)
  }

  pub fn validate(&self) -> std::result::Result<(), ConfigError> {
    for (name, source) in &self.sources {
      source.validate(name)?;
    }
    Ok(())
  }

  pub fn source(&self, name: &str) -> std::result::Result<&SourceConfig, ConfigError> {
    self
      .sources
      .get(name)
      .ok_or_else(|| ConfigError::UnknownSource(name.to_string()))
  }
}

/// Read a secret from the environment variable named in the config.
pub fn read_secret(var: &str) -> Result<String> {
  std::env::var(var).map_err(|_| eyre!("API token not found. Set the {} environment variable.", var))
}

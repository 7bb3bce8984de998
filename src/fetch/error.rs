use thiserror::Error;

/// Errors that abort a pagination run.
///
/// Every variant is a transient failure of a single page request; nothing
/// here is raised for malformed records, corrupt cache data, or safety bounds.
#[derive(Debug, Error)]
pub enum FetchError {
  /// Server answered with a non-success status
  #[error("HTTP {status}: {body}")]
  Http { status: u16, body: String },

  /// HTTP request failed before a response arrived
  #[error("HTTP request failed: {0}")]
  Request(#[from] reqwest::Error),

  /// Response body was not the expected shape
  #[error("Failed to decode page: {0}")]
  Decode(String),

  /// The page request itself was unusable
  #[error("Invalid page request: {0}")]
  InvalidRequest(String),

  /// Failure reported by a custom page function
  #[error("Page request failed: {0}")]
  Page(String),
}

impl From<serde_json::Error> for FetchError {
  fn from(e: serde_json::Error) -> Self {
    Self::Decode(e.to_string())
  }
}

//! HTTP page source for JSON REST APIs.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::config::{AuthKind, PaginationConfig, SourceConfig};
use crate::fetch::{FetchError, PageRequest, PageResult};

/// Credential attached to every request.
#[derive(Clone)]
pub enum Credential {
  Bearer(String),
  Header { name: String, value: String },
}

impl std::fmt::Debug for Credential {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Bearer(_) => f.write_str("Bearer(***)"),
      Self::Header { name, .. } => write!(f, "Header({name}: ***)"),
    }
  }
}

/// One configured REST endpoint, paged according to its [`PaginationConfig`].
///
/// Built per command invocation and passed to whoever needs it.
#[derive(Debug, Clone)]
pub struct RestSource {
  client: Client,
  base_url: Url,
  query: Vec<(String, String)>,
  pagination: PaginationConfig,
  credential: Option<Credential>,
}

impl RestSource {
  pub fn new(config: &SourceConfig, credential: Option<Credential>) -> Result<Self, FetchError> {
    let base_url = Url::parse(&config.url)
      .map_err(|e| FetchError::InvalidRequest(format!("bad url {}: {}", config.url, e)))?;

    Ok(Self {
      client: Client::new(),
      base_url,
      query: config
        .query
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect(),
      pagination: config.pagination.clone(),
      credential,
    })
  }

  /// Build the source, resolving the secret named in the config from the environment.
  pub fn from_config(config: &SourceConfig) -> color_eyre::Result<Self> {
    let credential = match &config.auth {
      Some(auth) => {
        let secret = crate::config::read_secret(&auth.token_env)?;
        Some(match auth.kind {
          AuthKind::Bearer => Credential::Bearer(secret),
          AuthKind::ApiKey => Credential::Header {
            name: auth.header.clone(),
            value: secret,
          },
        })
      }
      None => None,
    };

    Ok(Self::new(config, credential)?)
  }

  /// URL for one page request.
  ///
  /// A cursor that is itself an absolute URL (a `next_page` link) is used as-is,
  /// but only on the configured origin since credentials go with it.
  pub fn page_url(&self, request: &PageRequest) -> Result<Url, FetchError> {
    if let Some(cursor) = request.current_cursor() {
      if let Ok(link) = Url::parse(cursor) {
        if link.has_host() {
          if link.origin() != self.base_url.origin() {
            return Err(FetchError::InvalidRequest(format!(
              "next page link {} leaves {}",
              link,
              self.base_url.origin().ascii_serialization()
            )));
          }
          return Ok(link);
        }
      }
    }

    let mut url = self.base_url.clone();
    {
      let mut pairs = url.query_pairs_mut();
      for (key, value) in &self.query {
        pairs.append_pair(key, value);
      }
      let p = &self.pagination;
      match request {
        PageRequest::Offset { offset, limit } => {
          pairs.append_pair(&p.offset_param, &offset.to_string());
          pairs.append_pair(&p.limit_param, &limit.to_string());
        }
        PageRequest::Cursor { limit, cursor } => {
          pairs.append_pair(&p.limit_param, &limit.to_string());
          if let Some(cursor) = cursor {
            pairs.append_pair(&p.cursor_param, cursor);
          }
        }
      }
    }
    Ok(url)
  }

  fn headers(&self) -> Result<HeaderMap, FetchError> {
    let mut headers = HeaderMap::new();
    let invalid = |e: String| FetchError::InvalidRequest(format!("bad auth header: {}", e));

    match &self.credential {
      Some(Credential::Bearer(token)) => {
        let mut value =
          HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|e| invalid(e.to_string()))?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
      }
      Some(Credential::Header { name, value }) => {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(e.to_string()))?;
        let mut value = HeaderValue::from_str(value).map_err(|e| invalid(e.to_string()))?;
        value.set_sensitive(true);
        headers.insert(name, value);
      }
      None => {}
    }

    Ok(headers)
  }

  /// Request one page and decode it.
  pub async fn fetch_page(&self, request: PageRequest) -> Result<PageResult<Value>, FetchError> {
    let url = self.page_url(&request)?;
    debug!(%url, "GET page");

    let response = self
      .client
      .get(url)
      .headers(self.headers()?)
      .send()
      .await?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(FetchError::Http {
        status: status.as_u16(),
        body,
      });
    }

    let body: Value = response.json().await?;
    parse_page(&self.pagination, &request, body)
  }
}

/// Decode a JSON response body into a page.
///
/// `has_more` is taken from, in order: an explicit flag, an `is_last` flag,
/// `offset + count < total`, the presence of a next cursor, and finally a
/// full page (`count == limit`).
pub fn parse_page(
  pagination: &PaginationConfig,
  request: &PageRequest,
  mut body: Value,
) -> Result<PageResult<Value>, FetchError> {
  let next_cursor = pagination
    .next_cursor
    .as_ref()
    .and_then(|path| path.lookup(&body))
    .and_then(cursor_text);

  let has_more_flag = pagination
    .has_more
    .as_ref()
    .and_then(|path| path.lookup(&body))
    .and_then(Value::as_bool);
  let is_last = pagination
    .is_last
    .as_ref()
    .and_then(|path| path.lookup(&body))
    .and_then(Value::as_bool);
  let total = pagination
    .total
    .as_ref()
    .and_then(|path| path.lookup(&body))
    .and_then(Value::as_u64);

  let items = pagination.items.take(&mut body).ok_or_else(|| {
    FetchError::Decode(format!("no items at '{}'", pagination.items))
  })?;

  let items = match items {
    Value::Array(items) => items,
    other => {
      return Err(FetchError::Decode(format!(
        "expected an array at '{}', got {}",
        pagination.items,
        type_name(&other)
      )))
    }
  };

  let count = items.len() as u64;
  let has_more = if let Some(flag) = has_more_flag {
    flag
  } else if let Some(last) = is_last {
    !last
  } else if let (Some(total), PageRequest::Offset { offset, .. }) = (total, request) {
    offset + count < total
  } else if pagination.next_cursor.is_some() {
    next_cursor.is_some()
  } else {
    count > 0 && count == request.limit()
  };

  Ok(PageResult {
    items,
    has_more,
    next_cursor,
  })
}

fn cursor_text(value: &Value) -> Option<String> {
  match value {
    Value::String(s) if !s.is_empty() => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    _ => None,
  }
}

fn type_name(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "a boolean",
    Value::Number(_) => "a number",
    Value::String(_) => "a string",
    Value::Array(_) => "an array",
    Value::Object(_) => "an object",
  }
}

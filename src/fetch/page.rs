//! Page addressing and page payload types.

use serde::{Deserialize, Serialize};

/// A single page request.
///
/// Each integration pages either by offset or by cursor, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "style", rename_all = "lowercase")]
pub enum PageRequest {
  /// Numeric offset paging (`startAt`/`maxResults`, `offset`/`limit`, ...)
  Offset { offset: u64, limit: u64 },
  /// Opaque token paging; `None` asks for the first page
  Cursor { limit: u64, cursor: Option<String> },
}

impl PageRequest {
  /// First page of an offset-paged API.
  pub fn offset(limit: u64) -> Self {
    Self::Offset { offset: 0, limit }
  }

  /// First page of a cursor-paged API.
  pub fn cursor(limit: u64) -> Self {
    Self::Cursor {
      limit,
      cursor: None,
    }
  }

  pub fn limit(&self) -> u64 {
    match self {
      Self::Offset { limit, .. } | Self::Cursor { limit, .. } => *limit,
    }
  }

  /// Same addressing scheme and limit, rewound to the first page.
  pub fn first(&self) -> Self {
    match self {
      Self::Offset { limit, .. } => Self::offset(*limit),
      Self::Cursor { limit, .. } => Self::cursor(*limit),
    }
  }

  /// Request for the page after this one.
  ///
  /// Returns `None` in cursor mode when the server gave no token to follow.
  pub fn next(&self, next_cursor: Option<&str>) -> Option<Self> {
    match self {
      Self::Offset { offset, limit } => Some(Self::Offset {
        offset: offset + limit,
        limit: *limit,
      }),
      Self::Cursor { limit, .. } => next_cursor.map(|cursor| Self::Cursor {
        limit: *limit,
        cursor: Some(cursor.to_string()),
      }),
    }
  }

  pub fn current_cursor(&self) -> Option<&str> {
    match self {
      Self::Cursor { cursor, .. } => cursor.as_deref(),
      Self::Offset { .. } => None,
    }
  }
}

/// One page of raw records as returned by the upstream API.
#[derive(Debug, Clone, PartialEq)]
pub struct PageResult<R> {
  /// Records in server order
  pub items: Vec<R>,
  /// Whether another page should be requested
  pub has_more: bool,
  /// Token for the next page in cursor mode
  pub next_cursor: Option<String>,
}

impl<R> PageResult<R> {
  /// Final page.
  pub fn last(items: Vec<R>) -> Self {
    Self {
      items,
      has_more: false,
      next_cursor: None,
    }
  }

  /// Non-final page of an offset-paged API.
  pub fn more(items: Vec<R>) -> Self {
    Self {
      items,
      has_more: true,
      next_cursor: None,
    }
  }

  /// Non-final page of a cursor-paged API.
  pub fn with_cursor(items: Vec<R>, cursor: impl Into<String>) -> Self {
    Self {
      items,
      has_more: true,
      next_cursor: Some(cursor.into()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_offset_next_advances_by_limit() {
    let req = PageRequest::Offset {
      offset: 50,
      limit: 25,
    };
    assert_eq!(
      req.next(None),
      Some(PageRequest::Offset {
        offset: 75,
        limit: 25
      })
    );
  }

  #[test]
  fn test_cursor_next_adopts_token() {
    let req = PageRequest::cursor(10);
    assert_eq!(
      req.next(Some("x")),
      Some(PageRequest::Cursor {
        limit: 10,
        cursor: Some("x".to_string())
      })
    );
    assert_eq!(req.next(None), None);
  }

  #[test]
  fn test_first_rewinds() {
    let req = PageRequest::Cursor {
      limit: 10,
      cursor: Some("abc".to_string()),
    };
    assert_eq!(req.first(), PageRequest::cursor(10));
    assert_eq!(req.current_cursor(), Some("abc"));
  }
}

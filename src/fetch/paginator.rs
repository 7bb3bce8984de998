//! Sequential pagination driver.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::error::FetchError;
use super::page::{PageRequest, PageResult};

/// Upper bounds that stop a runaway pagination loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
  pub max_pages: usize,
  pub max_items: usize,
}

impl Default for PageLimits {
  fn default() -> Self {
    Self {
      max_pages: 100,
      max_items: 10_000,
    }
  }
}

/// What to do with already accumulated pages when a later page fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
  /// Drop everything and return the error
  #[default]
  Discard,
  /// Return the pages fetched before the failure, with the error attached
  ReturnPartial,
}

/// Lifecycle of one `fetch_all` run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
  Idle,
  Fetching,
  Accumulating,
  /// The last page reported no more data
  Done,
  /// Stopped early: page error, safety bound, or cancellation
  Aborted,
}

/// Cooperative cancellation flag, checked between pages.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn cancel(&self) {
    self.0.store(true, Ordering::SeqCst);
  }

  pub fn is_cancelled(&self) -> bool {
    self.0.load(Ordering::SeqCst)
  }
}

/// Accumulated records plus how the run ended.
#[derive(Debug)]
pub struct FetchOutcome<R> {
  /// Records from every accepted page, in page order
  pub items: Vec<R>,
  /// Number of pages successfully fetched
  pub pages: usize,
  /// A safety bound or a cursor protocol problem cut the run short
  pub truncated: bool,
  /// The cancel token fired
  pub cancelled: bool,
  pub state: FetchState,
  /// Page error kept under [`FailurePolicy::ReturnPartial`]
  pub error: Option<FetchError>,
}

impl<R> FetchOutcome<R> {
  /// True when every page was fetched.
  pub fn is_complete(&self) -> bool {
    self.state == FetchState::Done
  }
}

type PageHook<R> = Box<dyn FnMut(usize, &[R]) + Send>;

/// Drives a page function until the API reports no more data.
///
/// Pages are requested one at a time, so page N's items always precede
/// page N+1's in the result.
pub struct PaginatedFetcher<R> {
  limits: PageLimits,
  policy: FailurePolicy,
  cancel: CancelToken,
  on_page: Option<PageHook<R>>,
}

impl<R> Default for PaginatedFetcher<R> {
  fn default() -> Self {
    Self::new()
  }
}

impl<R> PaginatedFetcher<R> {
  pub fn new() -> Self {
    Self {
      limits: PageLimits::default(),
      policy: FailurePolicy::default(),
      cancel: CancelToken::new(),
      on_page: None,
    }
  }

  pub fn with_limits(mut self, limits: PageLimits) -> Self {
    self.limits = limits;
    self
  }

  pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
    self.policy = policy;
    self
  }

  pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
    self.cancel = cancel;
    self
  }

  /// Called with the 1-based page number and that page's items as each page arrives.
  pub fn on_page(mut self, hook: impl FnMut(usize, &[R]) + Send + 'static) -> Self {
    self.on_page = Some(Box::new(hook));
    self
  }

  /// Fetch every page starting from the first page of `template`.
  pub async fn fetch_all<F, Fut>(
    &mut self,
    template: PageRequest,
    mut page_fn: F,
  ) -> Result<FetchOutcome<R>, FetchError>
  where
    F: FnMut(PageRequest) -> Fut,
    Fut: Future<Output = Result<PageResult<R>, FetchError>>,
  {
    if template.limit() == 0 {
      return Err(FetchError::InvalidRequest("page limit must be > 0".into()));
    }

    let mut request = template.first();
    let mut outcome = FetchOutcome {
      items: Vec::new(),
      pages: 0,
      truncated: false,
      cancelled: false,
      state: FetchState::Idle,
      error: None,
    };

    loop {
      if self.cancel.is_cancelled() {
        info!(pages = outcome.pages, "Pagination cancelled");
        outcome.cancelled = true;
        outcome.state = FetchState::Aborted;
        break;
      }

      if outcome.pages >= self.limits.max_pages {
        warn!(max_pages = self.limits.max_pages, "Page limit reached, truncating");
        outcome.truncated = true;
        outcome.state = FetchState::Aborted;
        break;
      }

      outcome.state = FetchState::Fetching;
      debug!(page = outcome.pages + 1, ?request, "Fetching page");

      let page = match page_fn(request.clone()).await {
        Ok(page) => page,
        Err(e) => {
          warn!(page = outcome.pages + 1, error = %e, "Page request failed");
          outcome.state = FetchState::Aborted;
          match self.policy {
            FailurePolicy::Discard => return Err(e),
            FailurePolicy::ReturnPartial => {
              outcome.error = Some(e);
              break;
            }
          }
        }
      };

      outcome.state = FetchState::Accumulating;
      outcome.pages += 1;
      if let Some(hook) = self.on_page.as_mut() {
        hook(outcome.pages, &page.items);
      }
      debug!(
        page = outcome.pages,
        items = page.items.len(),
        has_more = page.has_more,
        "Page received"
      );
      outcome.items.extend(page.items);

      if outcome.items.len() > self.limits.max_items
        || (outcome.items.len() == self.limits.max_items && page.has_more)
      {
        warn!(max_items = self.limits.max_items, "Item limit reached, truncating");
        outcome.items.truncate(self.limits.max_items);
        outcome.truncated = true;
        outcome.state = FetchState::Aborted;
        break;
      }

      if !page.has_more {
        outcome.state = FetchState::Done;
        break;
      }

      let next_cursor = page.next_cursor.as_deref();
      match request.next(next_cursor) {
        Some(next) if next_cursor.is_some() && next_cursor == request.current_cursor() => {
          warn!(cursor = ?next.current_cursor(), "Server repeated the same cursor, stopping");
          outcome.truncated = true;
          outcome.state = FetchState::Aborted;
          break;
        }
        Some(next) => request = next,
        None => {
          warn!("Server reported more pages without a cursor, stopping");
          outcome.truncated = true;
          outcome.state = FetchState::Aborted;
          break;
        }
      }
    }

    info!(
      pages = outcome.pages,
      items = outcome.items.len(),
      state = ?outcome.state,
      "Pagination finished"
    );
    Ok(outcome)
  }
}

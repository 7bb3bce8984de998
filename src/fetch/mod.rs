//! Paged fetching against offset- or cursor-addressed APIs.

mod error;
mod page;
mod paginator;

pub use error::FetchError;
pub use page::{PageRequest, PageResult};
pub use paginator::{
  CancelToken, FailurePolicy, FetchOutcome, FetchState, PageLimits, PaginatedFetcher,
};

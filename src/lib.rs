//! Paginated REST fetching with a local TTL cache.
//!
//! The library is split along the data path:
//! - [`cache`]: namespaced key-value storage and the freshness-window cache manager
//! - [`fetch`]: the sequential pagination driver
//! - [`project`]: raw record to display record projection with deduplication
//! - [`loader`]: cache-first composition of the three
//! - [`source`]: reqwest-backed page source for JSON REST APIs

pub mod cache;
pub mod config;
pub mod fetch;
pub mod loader;
pub mod logging;
pub mod project;
pub mod source;

//! Resilient TTL request cache for a childcare-management REST API.
//!
//! List and detail reads go through [`cache::CacheLayer`], which serves fresh
//! entries without a network call, caches timeouts and rejected requests as
//! empty results, and drops a resource's entries after any write to it.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;

pub use error::{ApiError, ErrorKind};

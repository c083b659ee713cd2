//! REST API client module for the childcare-management backend.
//!
//! `RestClient` talks HTTP; `CachedClient` wraps any `Backend` with the
//! request cache. Per-resource differences in parameter names and response
//! envelopes live in `ResourceMapping`.

pub mod cached_client;
pub mod client;
pub mod mapping;

pub use cached_client::{CachedClient, DynStorage};
pub use client::{validate_resource, Backend, RestClient};
pub use mapping::{FilterStyle, Paging, ResourceMapping, SortStyle};

//! Generic caching layer for backend reads.
//!
//! This module provides a resource-agnostic caching mechanism that:
//! - Keys list queries and entity lookups by a canonical, readable string
//! - Serves fresh entries for a fixed TTL without touching the network
//! - Caches timeouts, 401 and 400 responses as empty results to stop retry storms
//! - Drops every entry of a resource after a write to it
//! - Purges aged entries from a background sweeper

mod classify;
mod clock;
mod key;
mod layer;
mod stats;
mod storage;
mod sweeper;
mod traits;

pub use classify::{classify, Disposition};
pub use clock::{Clock, ManualClock, SystemClock};
pub use key::{
  build_key, entity_key, CacheKey, Filter, FilterOp, QueryDescriptor, SortOrder,
  DEFAULT_PAGE_SIZE, KEY_SEPARATOR,
};
pub use layer::{
  CacheLayer, CacheSettings, DEFAULT_MAX_PAGE_SIZE, DEFAULT_SWEEP_INTERVAL_MS, DEFAULT_TTL_MS,
};
pub use stats::{CacheStats, CacheStatsSnapshot};
pub use storage::{CacheStorage, MemoryStorage, NoopStorage};
pub use sweeper::Sweeper;
pub use traits::{CacheEntry, CacheResult, CacheSource, Outcome, Page};

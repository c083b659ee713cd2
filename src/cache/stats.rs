//! Counters for cache activity.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct CacheStats {
  pub hits: AtomicU64,
  pub misses: AtomicU64,
  /// Remote failures turned into cached empty results
  pub absorbed: AtomicU64,
  /// Remote failures returned to the caller
  pub propagated: AtomicU64,
  /// Entries dropped by invalidation
  pub invalidated: AtomicU64,
  /// Entries dropped by the sweeper
  pub swept: AtomicU64,
}

impl CacheStats {
  pub fn new() -> Self {
    Self::default()
  }

  pub(crate) fn add(counter: &AtomicU64, n: u64) {
    counter.fetch_add(n, Ordering::Relaxed);
  }

  pub fn snapshot(&self) -> CacheStatsSnapshot {
    CacheStatsSnapshot {
      hits: self.hits.load(Ordering::Relaxed),
      misses: self.misses.load(Ordering::Relaxed),
      absorbed: self.absorbed.load(Ordering::Relaxed),
      propagated: self.propagated.load(Ordering::Relaxed),
      invalidated: self.invalidated.load(Ordering::Relaxed),
      swept: self.swept.load(Ordering::Relaxed),
    }
  }
}

/// Snapshot of the counters at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStatsSnapshot {
  pub hits: u64,
  pub misses: u64,
  pub absorbed: u64,
  pub propagated: u64,
  pub invalidated: u64,
  pub swept: u64,
}

//! Core types for the caching system.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::key::CacheKey;

/// What a completed remote read left in the cache.
///
/// An absorbed failure is cached exactly like a success so that repeated
/// queries inside the TTL window do not hammer a failing backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome<T> {
  Success { data: T, total: u64 },
  AbsorbedFailure,
}

impl<T> Outcome<T> {
  pub fn is_absorbed(&self) -> bool {
    matches!(self, Outcome::AbsorbedFailure)
  }
}

/// One stored outcome and when it was stored.
///
/// Payloads are kept as JSON values so a single store can hold list pages and
/// single records of any resource type.
#[derive(Debug, Clone)]
pub struct CacheEntry {
  pub key: CacheKey,
  pub payload: Outcome<serde_json::Value>,
  pub stored_at: DateTime<Utc>,
}

impl CacheEntry {
  pub fn age(&self, now: DateTime<Utc>) -> Duration {
    now - self.stored_at
  }

  /// Fresh while `now - stored_at < ttl`.
  pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
    self.age(now) < ttl
  }
}

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the served entry was stored
  pub stored_at: DateTime<Utc>,
}

impl<T> CacheResult<T> {
  pub fn new(data: T, source: CacheSource, stored_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source,
      stored_at,
    }
  }

  pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CacheResult<U> {
    CacheResult {
      data: f(self.data),
      source: self.source,
      stored_at: self.stored_at,
    }
  }
}

/// Indicates where returned data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Served from a fresh cache entry without a network call
  Cache,
  /// The network call failed in an absorbable way; an empty result was cached
  Absorbed,
}

/// A list page as returned to list views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
  pub data: Vec<T>,
  pub total: u64,
}

impl<T> Page<T> {
  pub fn new(data: Vec<T>, total: u64) -> Self {
    Self { data, total }
  }

  pub fn empty() -> Self {
    Self {
      data: Vec::new(),
      total: 0,
    }
  }
}

impl<T> Default for Page<T> {
  fn default() -> Self {
    Self::empty()
  }
}

impl<T> From<Outcome<Vec<T>>> for Page<T> {
  fn from(outcome: Outcome<Vec<T>>) -> Self {
    match outcome {
      Outcome::Success { data, total } => Page::new(data, total),
      Outcome::AbsorbedFailure => Page::empty(),
    }
  }
}

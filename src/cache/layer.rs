//! Cache layer that orchestrates caching logic with network fetching.

use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::classify::{classify, Disposition};
use super::clock::{Clock, SystemClock};
use super::key::{build_key, entity_key, CacheKey, QueryDescriptor};
use super::stats::{CacheStats, CacheStatsSnapshot};
use super::storage::CacheStorage;
use super::traits::{CacheEntry, CacheResult, CacheSource, Outcome, Page};
use crate::error::ApiError;

/// Default time-to-live for cached outcomes.
pub const DEFAULT_TTL_MS: i64 = 30_000;
/// Default period of the background sweeper.
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 60_000;
/// Largest page size the backend accepts.
pub const DEFAULT_MAX_PAGE_SIZE: u32 = 150;

/// Tunables of a cache layer.
#[derive(Debug, Clone, Copy)]
pub struct CacheSettings {
  /// How long a stored outcome is served without a network call
  pub ttl: Duration,
  /// How often the sweeper purges aged entries
  pub sweep_interval: std::time::Duration,
  /// Requests asking for more rows per page are clamped to this
  pub max_page_size: u32,
}

impl Default for CacheSettings {
  fn default() -> Self {
    Self {
      ttl: Duration::milliseconds(DEFAULT_TTL_MS),
      sweep_interval: std::time::Duration::from_millis(DEFAULT_SWEEP_INTERVAL_MS),
      max_page_size: DEFAULT_MAX_PAGE_SIZE,
    }
  }
}

/// Cache layer that manages caching logic and network fetching.
///
/// This layer sits between the application and the network client. Reads go
/// through [`fetch_list`](Self::fetch_list) or [`fetch_one`](Self::fetch_one);
/// every successful write must be followed by [`invalidate`](Self::invalidate)
/// for the written resource.
///
/// Concurrent identical fetches are not coalesced: each sees the miss, each
/// calls the network and the last one to finish owns the entry.
pub struct CacheLayer<S: CacheStorage> {
  storage: Arc<S>,
  clock: Arc<dyn Clock>,
  settings: CacheSettings,
  stats: Arc<CacheStats>,
}

impl<S: CacheStorage> CacheLayer<S> {
  /// Create a new cache layer with the given storage backend.
  pub fn new(storage: S) -> Self {
    Self {
      storage: Arc::new(storage),
      clock: Arc::new(SystemClock),
      settings: CacheSettings::default(),
      stats: Arc::new(CacheStats::new()),
    }
  }

  pub fn with_settings(mut self, settings: CacheSettings) -> Self {
    self.settings = settings;
    self
  }

  /// Replace the time source. Tests use a `ManualClock`.
  pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
    self.clock = Arc::new(clock);
    self
  }

  pub fn settings(&self) -> &CacheSettings {
    &self.settings
  }

  pub fn stats(&self) -> CacheStatsSnapshot {
    self.stats.snapshot()
  }

  pub fn storage(&self) -> &S {
    &self.storage
  }

  /// Number of stored entries, fresh or not.
  pub fn len(&self) -> usize {
    self.storage.len()
  }

  pub fn is_empty(&self) -> bool {
    self.storage.is_empty()
  }

  /// Fetch a page of a list query with a cache-first strategy.
  ///
  /// The descriptor is normalized (paging clamped, filters sorted) before the
  /// key is built, and the fetcher receives that normalized descriptor. A
  /// descriptor for another resource is rejected without touching the cache.
  pub async fn fetch<T, F, Fut>(
    &self,
    resource: &str,
    descriptor: &QueryDescriptor,
    fetcher: F,
  ) -> Result<CacheResult<Outcome<Vec<T>>>, ApiError>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce(QueryDescriptor) -> Fut,
    Fut: Future<Output = Result<Page<T>, ApiError>>,
  {
    if descriptor.resource != resource {
      return Err(ApiError::InvalidResource(descriptor.resource.clone()));
    }
    let normalized = descriptor.normalized(self.settings.max_page_size);
    let key = build_key(&normalized);

    self
      .resolve(&key, || async move {
        let page = fetcher(normalized).await?;
        Ok::<_, ApiError>(Outcome::Success {
          total: page.total,
          data: page.data,
        })
      })
      .await
  }

  /// Fetch a list page; an absorbed failure yields an empty page.
  pub async fn fetch_list<T, F, Fut>(
    &self,
    resource: &str,
    descriptor: &QueryDescriptor,
    fetcher: F,
  ) -> Result<CacheResult<Page<T>>, ApiError>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce(QueryDescriptor) -> Fut,
    Fut: Future<Output = Result<Page<T>, ApiError>>,
  {
    let result = self.fetch(resource, descriptor, fetcher).await?;
    Ok(result.map(Page::from))
  }

  /// Fetch a single entity; an absorbed failure yields `None`.
  pub async fn fetch_one<T, F, Fut>(
    &self,
    resource: &str,
    id: &str,
    fetcher: F,
  ) -> Result<CacheResult<Option<T>>, ApiError>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
  {
    let key = entity_key(resource, id);

    let result = self
      .resolve(&key, || async move {
        let data = fetcher().await?;
        Ok::<_, ApiError>(Outcome::Success { data, total: 1 })
      })
      .await?;

    Ok(result.map(|outcome| match outcome {
      Outcome::Success { data, .. } => Some(data),
      Outcome::AbsorbedFailure => None,
    }))
  }

  /// Drop every entry of `resource`, whatever its page, sort or filters.
  pub fn invalidate(&self, resource: &str) -> usize {
    let removed = self
      .storage
      .delete_by_prefix(&CacheKey::resource_prefix(resource));
    CacheStats::add(&self.stats.invalidated, removed as u64);
    info!(resource, removed, "Invalidated cached queries");
    removed
  }

  /// Remove every entry whose age at `now` reached the TTL.
  pub fn sweep(&self, now: DateTime<Utc>) -> usize {
    let ttl = self.settings.ttl;
    let removed = self
      .storage
      .delete_where(&mut |entry: &CacheEntry| !entry.is_fresh(now, ttl));
    CacheStats::add(&self.stats.swept, removed as u64);
    if removed > 0 {
      debug!(removed, remaining = self.storage.len(), "Swept expired cache entries");
    }
    removed
  }

  /// Sweep against the layer's own clock.
  pub fn sweep_expired(&self) -> usize {
    self.sweep(self.clock.now())
  }

  /// Return a fresh entry for `key` or run the fetcher and record its outcome.
  async fn resolve<T, F, Fut>(
    &self,
    key: &CacheKey,
    fetcher: F,
  ) -> Result<CacheResult<Outcome<T>>, ApiError>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Outcome<T>, ApiError>>,
  {
    // Check cache first
    if let Some(cached) = self.fresh_entry::<T>(key) {
      CacheStats::add(&self.stats.hits, 1);
      debug!(key = %key, "Cache hit");
      return Ok(cached);
    }

    CacheStats::add(&self.stats.misses, 1);
    debug!(key = %key, "Cache miss, fetching from network");

    match fetcher().await {
      Ok(outcome) => {
        let stored_at = self.store(key, &outcome);
        Ok(CacheResult::new(outcome, CacheSource::Network, stored_at))
      }
      Err(err) => match classify(&err) {
        Disposition::Absorb => {
          CacheStats::add(&self.stats.absorbed, 1);
          warn!(key = %key, error = %err, "Absorbed remote failure, caching empty result");
          let outcome = Outcome::AbsorbedFailure;
          let stored_at = self.store(key, &outcome);
          Ok(CacheResult::new(outcome, CacheSource::Absorbed, stored_at))
        }
        Disposition::Propagate => {
          CacheStats::add(&self.stats.propagated, 1);
          debug!(key = %key, error = %err, "Remote failure not cached");
          Err(err)
        }
      },
    }
  }

  fn fresh_entry<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<CacheResult<Outcome<T>>> {
    let entry = self.storage.get(key)?;
    if !entry.is_fresh(self.clock.now(), self.settings.ttl) {
      return None;
    }

    let source = if entry.payload.is_absorbed() {
      CacheSource::Absorbed
    } else {
      CacheSource::Cache
    };

    let payload = match entry.payload {
      Outcome::Success { data, total } => match serde_json::from_value(data) {
        Ok(data) => Outcome::Success { data, total },
        Err(e) => {
          // Same key read back as a different type; refetch.
          warn!(key = %key, error = %e, "Cached payload has unexpected shape");
          return None;
        }
      },
      Outcome::AbsorbedFailure => Outcome::AbsorbedFailure,
    };

    Some(CacheResult::new(payload, source, entry.stored_at))
  }

  fn store<T: Serialize>(&self, key: &CacheKey, outcome: &Outcome<T>) -> DateTime<Utc> {
    let now = self.clock.now();
    let payload = match outcome {
      Outcome::Success { data, total } => match serde_json::to_value(data) {
        Ok(data) => Outcome::Success {
          data,
          total: *total,
        },
        Err(e) => {
          warn!(key = %key, error = %e, "Failed to serialize payload, not caching");
          return now;
        }
      },
      Outcome::AbsorbedFailure => Outcome::AbsorbedFailure,
    };
    self.storage.put(key, payload, now);
    now
  }
}

impl<S: CacheStorage> Clone for CacheLayer<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      clock: Arc::clone(&self.clock),
      settings: self.settings,
      stats: Arc::clone(&self.stats),
    }
  }
}

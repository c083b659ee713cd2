//! Cache storage trait and in-memory implementation.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::key::CacheKey;
use super::traits::{CacheEntry, Outcome};

/// Trait for cache storage backends.
///
/// Storage never expires anything on its own; callers decide staleness from
/// `stored_at`.
pub trait CacheStorage: Send + Sync {
  /// Look up an entry.
  fn get(&self, key: &CacheKey) -> Option<CacheEntry>;

  /// Store an outcome, replacing any previous entry for the key.
  fn put(&self, key: &CacheKey, payload: Outcome<serde_json::Value>, now: DateTime<Utc>);

  /// Remove every entry whose key starts with `prefix`. Returns how many went.
  fn delete_by_prefix(&self, prefix: &str) -> usize;

  /// Remove every entry matching `predicate`. Returns how many went.
  fn delete_where(&self, predicate: &mut dyn FnMut(&CacheEntry) -> bool) -> usize;

  /// Remove everything.
  fn delete_all(&self);

  /// Visit every entry.
  fn for_each(&self, visitor: &mut dyn FnMut(&CacheEntry));

  /// Number of stored entries.
  fn len(&self) -> usize;

  fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl<T: CacheStorage + ?Sized> CacheStorage for Box<T> {
  fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
    (**self).get(key)
  }

  fn put(&self, key: &CacheKey, payload: Outcome<serde_json::Value>, now: DateTime<Utc>) {
    (**self).put(key, payload, now)
  }

  fn delete_by_prefix(&self, prefix: &str) -> usize {
    (**self).delete_by_prefix(prefix)
  }

  fn delete_where(&self, predicate: &mut dyn FnMut(&CacheEntry) -> bool) -> usize {
    (**self).delete_where(predicate)
  }

  fn delete_all(&self) {
    (**self).delete_all()
  }

  fn for_each(&self, visitor: &mut dyn FnMut(&CacheEntry)) {
    (**self).for_each(visitor)
  }

  fn len(&self) -> usize {
    (**self).len()
  }
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
#[derive(Debug, Default)]
pub struct NoopStorage;

impl CacheStorage for NoopStorage {
  fn get(&self, _key: &CacheKey) -> Option<CacheEntry> {
    None // Always miss
  }

  fn put(&self, _key: &CacheKey, _payload: Outcome<serde_json::Value>, _now: DateTime<Utc>) {}

  fn delete_by_prefix(&self, _prefix: &str) -> usize {
    0
  }

  fn delete_where(&self, _predicate: &mut dyn FnMut(&CacheEntry) -> bool) -> usize {
    0
  }

  fn delete_all(&self) {}

  fn for_each(&self, _visitor: &mut dyn FnMut(&CacheEntry)) {}

  fn len(&self) -> usize {
    0
  }
}

/// Process-local storage behind a single mutex.
///
/// Every operation holds the lock for one map access or one scan, never
/// across an await point.
#[derive(Debug, Default)]
pub struct MemoryStorage {
  entries: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }

  // A panic elsewhere cannot leave an entry half-written, so a poisoned map is
  // still consistent.
  fn entries(&self) -> MutexGuard<'_, HashMap<CacheKey, CacheEntry>> {
    self.entries.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

impl CacheStorage for MemoryStorage {
  fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
    self.entries().get(key).cloned()
  }

  fn put(&self, key: &CacheKey, payload: Outcome<serde_json::Value>, now: DateTime<Utc>) {
    let entry = CacheEntry {
      key: key.clone(),
      payload,
      stored_at: now,
    };
    self.entries().insert(key.clone(), entry);
  }

  fn delete_by_prefix(&self, prefix: &str) -> usize {
    let mut entries = self.entries();
    let before = entries.len();
    entries.retain(|key, _| !key.as_str().starts_with(prefix));
    before - entries.len()
  }

  fn delete_where(&self, predicate: &mut dyn FnMut(&CacheEntry) -> bool) -> usize {
    let mut entries = self.entries();
    let before = entries.len();
    entries.retain(|_, entry| !predicate(entry));
    before - entries.len()
  }

  fn delete_all(&self) {
    self.entries().clear();
  }

  fn for_each(&self, visitor: &mut dyn FnMut(&CacheEntry)) {
    for entry in self.entries().values() {
      visitor(entry);
    }
  }

  fn len(&self) -> usize {
    self.entries().len()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::key::{build_key, entity_key, CacheKey, QueryDescriptor};
  use serde_json::json;

  fn success(value: serde_json::Value) -> Outcome<serde_json::Value> {
    Outcome::Success {
      data: value,
      total: 1,
    }
  }

  #[test]
  fn test_put_overwrites() {
    let storage = MemoryStorage::new();
    let key = entity_key("children", "1");
    let t0 = Utc::now();

    storage.put(&key, success(json!({"name": "Ada"})), t0);
    storage.put(&key, success(json!({"name": "Grace"})), t0);

    assert_eq!(storage.len(), 1);
    let entry = storage.get(&key).expect("entry");
    assert_eq!(entry.payload, success(json!({"name": "Grace"})));
    assert_eq!(entry.stored_at, t0);
  }

  #[test]
  fn test_delete_by_prefix() {
    let storage = MemoryStorage::new();
    let now = Utc::now();
    let children = build_key(&QueryDescriptor::new("children"));
    let child = entity_key("children", "1");
    let incidents = build_key(&QueryDescriptor::new("incidents"));

    storage.put(&children, Outcome::AbsorbedFailure, now);
    storage.put(&child, Outcome::AbsorbedFailure, now);
    storage.put(&incidents, Outcome::AbsorbedFailure, now);

    assert_eq!(storage.delete_by_prefix("children|"), 2);
    assert!(storage.get(&children).is_none());
    assert!(storage.get(&child).is_none());
    assert!(storage.get(&incidents).is_some());
  }

  #[test]
  fn test_delete_all_and_for_each() {
    let storage = MemoryStorage::new();
    let now = Utc::now();
    for id in ["1", "2", "3"] {
      storage.put(&entity_key("rooms", id), Outcome::AbsorbedFailure, now);
    }

    let mut seen = 0;
    storage.for_each(&mut |_| seen += 1);
    assert_eq!(seen, 3);

    storage.delete_all();
    assert!(storage.is_empty());
  }

  #[test]
  fn test_concurrent_writers_and_deleters() {
    let storage = MemoryStorage::new();
    let now = Utc::now();

    let removed: usize = std::thread::scope(|s| {
      let handles: Vec<_> = (0..8)
        .map(|t| {
          let storage = &storage;
          s.spawn(move || {
            let scratch = format!("scratch{t}");
            let stale = format!("stale{t}");
            for i in 0..50 {
              let id = format!("{t}-{i}");
              storage.put(&entity_key("children", &id), Outcome::AbsorbedFailure, now);
              storage.put(&entity_key(&scratch, &id), Outcome::AbsorbedFailure, now);
              storage.put(&entity_key(&stale, &id), Outcome::AbsorbedFailure, now);
            }

            let stale_prefix = CacheKey::resource_prefix(&stale);
            storage.delete_by_prefix(&CacheKey::resource_prefix(&scratch))
              + storage.delete_where(&mut |entry| entry.key.as_str().starts_with(&stale_prefix))
          })
        })
        .collect();
      handles.into_iter().map(|h| h.join().unwrap()).sum()
    });

    assert_eq!(removed, 8 * 100);
    assert_eq!(storage.len(), 8 * 50);
    let mut children = 0;
    storage.for_each(&mut |entry| {
      assert!(entry.key.as_str().starts_with("children|"));
      children += 1;
    });
    assert_eq!(children, 400);
  }

  #[test]
  fn test_noop_storage_always_misses() {
    let storage = NoopStorage;
    let key = entity_key("children", "1");
    storage.put(&key, Outcome::AbsorbedFailure, Utc::now());
    assert!(storage.get(&key).is_none());
    assert!(storage.is_empty());
  }
}

//! Backend client with transparent read caching and write invalidation.

use color_eyre::Result;
use serde_json::Value;
use tracing::debug;

use super::client::{validate_resource, Backend, RestClient};
use crate::cache::{
  CacheLayer, CacheStatsSnapshot, CacheStorage, MemoryStorage, NoopStorage, Page, QueryDescriptor,
  Sweeper,
};
use crate::config::Config;
use crate::error::ApiError;

/// Storage chosen at runtime from `cache.enabled`.
pub type DynStorage = Box<dyn CacheStorage>;

/// Client with transparent caching support.
///
/// Reads are served from the cache while fresh. Writes always hit the backend
/// and, once the backend confirms them, drop every cached query of the
/// written resource.
pub struct CachedClient<B: Backend = RestClient, S: CacheStorage = DynStorage> {
  inner: B,
  cache: CacheLayer<S>,
}

impl CachedClient {
  /// Create a new cached client from configuration.
  pub fn new(config: &Config) -> Result<Self> {
    let inner = RestClient::new(config)?;
    let storage: DynStorage = if config.cache.enabled {
      Box::new(MemoryStorage::new())
    } else {
      Box::new(NoopStorage)
    };
    let cache = CacheLayer::new(storage).with_settings(config.cache.settings());

    Ok(Self { inner, cache })
  }
}

impl<B: Backend, S: CacheStorage + 'static> CachedClient<B, S> {
  pub fn with_parts(inner: B, cache: CacheLayer<S>) -> Self {
    Self { inner, cache }
  }

  pub fn cache(&self) -> &CacheLayer<S> {
    &self.cache
  }

  pub fn stats(&self) -> CacheStatsSnapshot {
    self.cache.stats()
  }

  /// A sweeper bound to this client's cache. Call `start()` on it.
  pub fn sweeper(&self) -> Sweeper<S> {
    Sweeper::new(self.cache.clone())
  }

  /// List a page of `resource`. Absorbed failures come back as an empty page.
  pub async fn list(
    &self,
    resource: &str,
    descriptor: &QueryDescriptor,
  ) -> Result<Page<Value>, ApiError> {
    validate_resource(resource)?;
    let result = self
      .cache
      .fetch_list(resource, descriptor, |normalized| async move {
        self.inner.list(resource, &normalized).await
      })
      .await?;

    debug!(resource, source = ?result.source, total = result.data.total, "list");
    Ok(result.data)
  }

  /// Get a single record. Absorbed failures come back as `None`.
  pub async fn get(&self, resource: &str, id: &str) -> Result<Option<Value>, ApiError> {
    validate_resource(resource)?;
    let result = self
      .cache
      .fetch_one(resource, id, || self.inner.get(resource, id))
      .await?;

    debug!(resource, id, source = ?result.source, "get");
    Ok(result.data)
  }

  /// Create a record (not cached - write operation).
  pub async fn create(&self, resource: &str, body: &Value) -> Result<Value, ApiError> {
    let created = self.inner.create(resource, body).await?;
    self.cache.invalidate(resource);
    Ok(created)
  }

  /// Update a record (not cached - write operation).
  pub async fn update(&self, resource: &str, id: &str, body: &Value) -> Result<Value, ApiError> {
    let updated = self.inner.update(resource, id, body).await?;
    self.cache.invalidate(resource);
    Ok(updated)
  }

  /// Delete a record (not cached - write operation).
  pub async fn delete(&self, resource: &str, id: &str) -> Result<(), ApiError> {
    self.inner.delete(resource, id).await?;
    self.cache.invalidate(resource);
    Ok(())
  }
}

impl<B: Backend + Clone, S: CacheStorage> Clone for CachedClient<B, S> {
  fn clone(&self) -> Self {
    Self {
      inner: self.inner.clone(),
      cache: self.cache.clone(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{FilterOp, ManualClock};
  use chrono::{DateTime, Duration, Utc};
  use serde_json::json;
  use std::collections::VecDeque;
  use std::sync::Mutex;

  /// Backend that replays queued responses and counts calls.
  #[derive(Default)]
  struct FakeBackend {
    reads: Mutex<VecDeque<Result<Value, ApiError>>>,
    writes: Mutex<VecDeque<Result<Value, ApiError>>>,
    calls: Mutex<Vec<String>>,
  }

  impl FakeBackend {
    fn read(self, response: Result<Value, ApiError>) -> Self {
      self.reads.lock().unwrap().push_back(response);
      self
    }

    fn write(self, response: Result<Value, ApiError>) -> Self {
      self.writes.lock().unwrap().push_back(response);
      self
    }

    fn record(&self, call: String) {
      self.calls.lock().unwrap().push(call);
    }

    fn next_read(&self) -> Result<Value, ApiError> {
      self
        .reads
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| Err(ApiError::ServerError("no response queued".into())))
    }

    fn next_write(&self) -> Result<Value, ApiError> {
      self
        .writes
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| Err(ApiError::ServerError("no response queued".into())))
    }

    fn calls(&self) -> Vec<String> {
      self.calls.lock().unwrap().clone()
    }
  }

  impl Backend for FakeBackend {
    async fn list(&self, resource: &str, d: &QueryDescriptor) -> Result<Page<Value>, ApiError> {
      self.record(format!("list {} page={} size={}", resource, d.page, d.page_size));
      let body = self.next_read()?;
      crate::api::ResourceMapping::default().parse_page(body)
    }

    async fn get(&self, resource: &str, id: &str) -> Result<Value, ApiError> {
      self.record(format!("get {} {}", resource, id));
      self.next_read()
    }

    async fn create(&self, resource: &str, _body: &Value) -> Result<Value, ApiError> {
      self.record(format!("create {}", resource));
      self.next_write()
    }

    async fn update(&self, resource: &str, id: &str, _body: &Value) -> Result<Value, ApiError> {
      self.record(format!("update {} {}", resource, id));
      self.next_write()
    }

    async fn delete(&self, resource: &str, id: &str) -> Result<(), ApiError> {
      self.record(format!("delete {} {}", resource, id));
      self.next_write().map(|_| ())
    }
  }

  fn client(backend: FakeBackend) -> (CachedClient<FakeBackend, MemoryStorage>, ManualClock) {
    let clock = ManualClock::new(DateTime::<Utc>::UNIX_EPOCH);
    let cache = CacheLayer::new(MemoryStorage::new()).with_clock(clock.clone());
    (CachedClient::with_parts(backend, cache), clock)
  }

  fn five_children() -> Value {
    json!({"data": [{"id": 1}, {"id": 2}, {"id": 3}, {"id": 4}, {"id": 5}], "total": 5})
  }

  #[tokio::test]
  async fn test_create_invalidates_resource() {
    let backend = FakeBackend::default()
      .read(Ok(five_children()))
      .read(Ok(json!({"data": [{"id": 6}], "total": 6})))
      .write(Ok(json!({"id": 6})));
    let (client, clock) = client(backend);
    let q = QueryDescriptor::new("children").page(1).page_size(10);

    assert_eq!(client.list("children", &q).await.unwrap().total, 5);

    clock.advance(Duration::milliseconds(5_000));
    client
      .create("children", &json!({"name": "Ada"}))
      .await
      .unwrap();

    clock.advance(Duration::milliseconds(1));
    assert_eq!(client.list("children", &q).await.unwrap().total, 6);

    assert_eq!(
      client.inner.calls(),
      vec![
        "list children page=1 size=10",
        "create children",
        "list children page=1 size=10",
      ]
    );
  }

  #[tokio::test]
  async fn test_failed_write_keeps_cache() {
    let backend = FakeBackend::default()
      .read(Ok(five_children()))
      .write(Err(ApiError::ServerError("db down".into())));
    let (client, _clock) = client(backend);
    let q = QueryDescriptor::new("children");

    client.list("children", &q).await.unwrap();
    let err = client.delete("children", "1").await.unwrap_err();
    assert!(matches!(err, ApiError::ServerError(_)));

    // Still served from cache
    assert_eq!(client.list("children", &q).await.unwrap().total, 5);
    assert_eq!(client.inner.calls().len(), 2);
  }

  #[tokio::test]
  async fn test_update_leaves_other_resources_cached() {
    let backend = FakeBackend::default()
      .read(Ok(five_children()))
      .read(Ok(json!([{"id": 1, "severity": "low"}])))
      .write(Ok(json!({"id": 1})));
    let (client, _clock) = client(backend);

    client
      .list("children", &QueryDescriptor::new("children"))
      .await
      .unwrap();
    let incidents = QueryDescriptor::new("incidents").filter("severity", FilterOp::Eq, "low");
    client.list("incidents", &incidents).await.unwrap();

    client
      .update("children", "1", &json!({"name": "Grace"}))
      .await
      .unwrap();

    assert_eq!(client.cache().len(), 1);
    assert_eq!(client.list("incidents", &incidents).await.unwrap().total, 1);
    assert_eq!(client.stats().hits, 1);
  }

  #[tokio::test]
  async fn test_get_absorbs_unauthorized() {
    let backend = FakeBackend::default().read(Err(ApiError::Unauthorized));
    let (client, clock) = client(backend);

    assert_eq!(client.get("children", "7").await.unwrap(), None);
    clock.advance(Duration::milliseconds(20_000));
    assert_eq!(client.get("children", "7").await.unwrap(), None);

    assert_eq!(client.inner.calls(), vec!["get children 7"]);
  }

  #[tokio::test]
  async fn test_list_server_error_propagates() {
    let backend = FakeBackend::default()
      .read(Err(ApiError::ServerError("500".into())))
      .read(Ok(five_children()));
    let (client, _clock) = client(backend);
    let q = QueryDescriptor::new("children");

    assert!(client.list("children", &q).await.is_err());
    assert_eq!(client.list("children", &q).await.unwrap().total, 5);
  }

  #[tokio::test]
  async fn test_malformed_list_response_propagates() {
    let backend = FakeBackend::default().read(Ok(json!({"rows": []})));
    let (client, _clock) = client(backend);

    let err = client
      .list("children", &QueryDescriptor::new("children"))
      .await
      .unwrap_err();
    assert!(matches!(err, ApiError::InvalidResponse(_)));
    assert!(client.cache().is_empty());
  }

  #[tokio::test]
  async fn test_list_rejects_descriptor_of_another_resource() {
    let (client, _clock) = client(FakeBackend::default().read(Ok(five_children())));

    let err = client
      .list("children", &QueryDescriptor::new("incidents"))
      .await
      .unwrap_err();
    assert_eq!(err, ApiError::InvalidResource("incidents".into()));
    assert!(client.inner.calls().is_empty());
    assert!(client.cache().is_empty());
  }

  #[tokio::test]
  async fn test_invalid_resource_is_rejected() {
    let (client, _clock) = client(FakeBackend::default());
    let err = client.get("", "1").await.unwrap_err();
    assert_eq!(err, ApiError::InvalidResource(String::new()));
    assert!(client.inner.calls().is_empty());
  }
}

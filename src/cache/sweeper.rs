//! Background task that purges aged cache entries.
//!
//! Lookups already ignore stale entries, so the sweeper exists only to bound
//! memory for keys that are never queried again.

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use super::layer::CacheLayer;
use super::storage::CacheStorage;

/// Owns the periodic sweep task of one cache layer.
pub struct Sweeper<S: CacheStorage + 'static> {
  cache: CacheLayer<S>,
  shutdown_tx: Option<watch::Sender<bool>>,
  handle: Option<JoinHandle<()>>,
}

impl<S: CacheStorage + 'static> Sweeper<S> {
  pub fn new(cache: CacheLayer<S>) -> Self {
    Self {
      cache,
      shutdown_tx: None,
      handle: None,
    }
  }

  pub fn is_running(&self) -> bool {
    self.handle.as_ref().is_some_and(|h| !h.is_finished())
  }

  /// Spawn the sweep loop on the current tokio runtime. No-op if running.
  pub fn start(&mut self) {
    if self.is_running() {
      return;
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let cache = self.cache.clone();
    self.handle = Some(tokio::spawn(sweep_task(cache, shutdown_rx)));
    self.shutdown_tx = Some(shutdown_tx);
  }

  /// Signal the loop to exit and wait for it.
  pub async fn stop(&mut self) {
    if let Some(tx) = self.shutdown_tx.take() {
      // Receiver gone means the task already exited
      let _ = tx.send(true);
    }
    if let Some(handle) = self.handle.take() {
      if let Err(e) = handle.await {
        warn!(error = %e, "Cache sweeper task failed");
      }
    }
  }
}

impl<S: CacheStorage + 'static> Drop for Sweeper<S> {
  fn drop(&mut self) {
    if let Some(handle) = self.handle.take() {
      handle.abort();
    }
  }
}

async fn sweep_task<S: CacheStorage>(cache: CacheLayer<S>, mut shutdown_rx: watch::Receiver<bool>) {
  let period = cache.settings().sweep_interval;
  let mut ticker = interval(period);
  ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

  info!(
    interval_ms = period.as_millis() as u64,
    ttl_ms = cache.settings().ttl.num_milliseconds(),
    "Cache sweeper started"
  );

  loop {
    tokio::select! {
      changed = shutdown_rx.changed() => {
        if changed.is_err() || *shutdown_rx.borrow() {
          break;
        }
      }
      _ = ticker.tick() => {
        cache.sweep_expired();
      }
    }
  }

  let stats = cache.stats();
  info!(
    hits = stats.hits,
    misses = stats.misses,
    absorbed = stats.absorbed,
    propagated = stats.propagated,
    invalidated = stats.invalidated,
    swept = stats.swept,
    "Cache sweeper stopped"
  );
}

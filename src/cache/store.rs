//! Persistent mirror of the in-memory query cache.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, info, warn};

use super::snapshot::{CacheSnapshot, CacheStats, CACHE_VERSION, DEFAULT_TTL_HOURS};
use super::storage::SlotStorage;
use crate::config::CacheConfig;
use crate::query::{CacheEvent, QueryEngine};

/// Default storage slot for the query cache.
pub const DEFAULT_SLOT_KEY: &str = "toolshelf-query-cache";

/// Where and how snapshots are stored.
#[derive(Debug, Clone)]
pub struct PersistOptions {
  pub slot_key: String,
  /// Expected snapshot version; anything else is discarded on restore
  pub version: String,
  /// Entries older than this are never written
  pub ttl: Duration,
}

impl Default for PersistOptions {
  fn default() -> Self {
    Self {
      slot_key: DEFAULT_SLOT_KEY.to_string(),
      version: CACHE_VERSION.to_string(),
      ttl: Duration::hours(DEFAULT_TTL_HOURS),
    }
  }
}

impl PersistOptions {
  pub fn from_config(config: &CacheConfig) -> Self {
    Self {
      slot_key: config.slot_key.clone(),
      ttl: Duration::hours(config.ttl_hours),
      ..Self::default()
    }
  }
}

/// Live subscription to a query engine's cache events.
///
/// Dropping it unsubscribes.
pub struct CacheSubscription {
  rx: broadcast::Receiver<CacheEvent>,
}

impl CacheSubscription {
  pub fn new<E: QueryEngine + ?Sized>(engine: &E) -> Self {
    Self {
      rx: engine.subscribe(),
    }
  }
}

/// Keeps a storage slot in sync with a query engine's cache.
///
/// Persistence is best-effort: storage failures are logged and the cache
/// keeps working in memory for the rest of the session.
pub struct PersistentCacheStore<S: SlotStorage> {
  storage: Arc<S>,
  options: PersistOptions,
}

impl<S: SlotStorage> PersistentCacheStore<S> {
  pub fn new(storage: S, options: PersistOptions) -> Self {
    Self {
      storage: Arc::new(storage),
      options,
    }
  }

  /// Load the stored snapshot into `engine`.
  ///
  /// Returns `None` on a cold start. Unreadable snapshots and snapshots of
  /// another version are deleted and also yield `None`.
  pub fn restore<E: QueryEngine + ?Sized>(&self, engine: &E) -> Option<CacheSnapshot> {
    let snapshot = self.load()?;

    let now = Utc::now().timestamp_millis();
    let entries = snapshot.live_entries(self.options.ttl, now);
    info!(
      restored = entries.len(),
      stored = snapshot.entries.len(),
      "restored query cache"
    );
    engine.hydrate(entries);

    Some(snapshot)
  }

  /// React to a cache mutation by rewriting the snapshot.
  pub fn on_cache_mutated<E: QueryEngine + ?Sized>(&self, engine: &E, event: &CacheEvent) {
    debug!(?event, "cache mutated");
    self.persist(engine, Utc::now().timestamp_millis());
  }

  /// Handle every pending event on `subscription` without blocking.
  ///
  /// Returns the number of events handled.
  pub fn sync<E: QueryEngine + ?Sized>(
    &self,
    subscription: &mut CacheSubscription,
    engine: &E,
  ) -> usize {
    let mut handled = 0;
    loop {
      match subscription.rx.try_recv() {
        Ok(event) => {
          self.on_cache_mutated(engine, &event);
          handled += 1;
        }
        Err(TryRecvError::Lagged(skipped)) => {
          // Missed events only matter as "something changed"
          debug!(skipped, "cache subscription lagged, resynchronizing");
          self.persist(engine, Utc::now().timestamp_millis());
          handled += 1;
        }
        Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
      }
    }
    handled
  }

  /// Delete the snapshot and empty the in-memory cache.
  pub fn clear<E: QueryEngine + ?Sized>(&self, engine: &E) {
    self.discard("cleared");
    engine.clear();
  }

  /// Describe the stored snapshot; all zeros when there is none.
  pub fn stats(&self) -> CacheStats {
    let Some(raw) = self.read_slot() else {
      return CacheStats::default();
    };

    match serde_json::from_str::<CacheSnapshot>(&raw) {
      Ok(snapshot) => CacheStats {
        entry_count: snapshot.entries.len(),
        approx_byte_size: raw.len(),
        timestamp: snapshot.timestamp,
        version: snapshot.version,
      },
      Err(_) => CacheStats::default(),
    }
  }

  fn persist<E: QueryEngine + ?Sized>(&self, engine: &E, now: i64) {
    let snapshot =
      CacheSnapshot::capture(&self.options.version, &engine.entries(), self.options.ttl, now);
    if snapshot.is_empty() {
      return;
    }

    let serialized = match serde_json::to_string(&snapshot) {
      Ok(serialized) => serialized,
      Err(e) => {
        warn!(error = %e, "failed to serialize cache snapshot, keeping cache in memory only");
        return;
      }
    };

    match self.storage.write(&self.options.slot_key, &serialized) {
      Ok(()) => debug!(
        entries = snapshot.entries.len(),
        bytes = serialized.len(),
        "persisted query cache"
      ),
      Err(e) => warn!(error = %e, "failed to persist query cache, keeping cache in memory only"),
    }
  }

  fn load(&self) -> Option<CacheSnapshot> {
    let raw = self.read_slot()?;

    let snapshot = match serde_json::from_str::<CacheSnapshot>(&raw) {
      Ok(snapshot) => snapshot,
      Err(e) => {
        warn!(error = %e, "stored cache snapshot is unreadable");
        self.discard("unreadable");
        return None;
      }
    };

    if snapshot.version != self.options.version {
      info!(
        found = %snapshot.version,
        expected = %self.options.version,
        "discarding cache snapshot of another version"
      );
      self.discard("version mismatch");
      return None;
    }

    Some(snapshot)
  }

  fn read_slot(&self) -> Option<String> {
    match self.storage.read(&self.options.slot_key) {
      Ok(raw) => raw,
      Err(e) => {
        warn!(error = %e, "failed to read cache snapshot");
        None
      }
    }
  }

  fn discard(&self, reason: &str) {
    debug!(reason, slot = %self.options.slot_key, "deleting cache snapshot");
    if let Err(e) = self.storage.remove(&self.options.slot_key) {
      warn!(error = %e, "failed to delete cache snapshot");
    }
  }
}

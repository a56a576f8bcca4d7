//! In-memory query cache with async fetching and mutation tracking.
//!
//! Inspired by TanStack Query, `QueryClient` keeps one entry per query hash
//! (opaque JSON payload plus `data_updated_at`), runs fetches and mutations
//! as tokio tasks, and publishes two kinds of signals:
//!
//! - in-flight fetch/mutation counters on `watch` channels
//! - cache mutation events on a `broadcast` channel
//!
//! # Example
//!
//! ```ignore
//! let client = QueryClient::new(Duration::minutes(5));
//! let catalog = catalog_client.clone();
//! client.fetch(&CatalogQueryKey::Tools, move || async move { catalog.tools().await });
//!
//! // In render
//! match client.state::<_, Vec<Tool>>(&CatalogQueryKey::Tools) {
//!     QueryState::Loading => render_spinner(),
//!     QueryState::Success(tools) => render_tools(&tools),
//!     QueryState::Error(e) => render_error(&e),
//!     QueryState::Idle => {}
//! }
//! ```

use chrono::{Duration, Utc};
use color_eyre::{eyre::eyre, Result};
use futures::future::BoxFuture;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Capacity of the cache event channel. Subscribers that fall further behind
/// than this see a lag and resynchronize from the full cache.
const EVENT_CAPACITY: usize = 256;

/// Identity of a query in the cache.
pub trait QueryKey {
  /// Stable, fixed-length hash used as the cache key
  fn cache_hash(&self) -> String;

  /// Structured identity, persisted alongside the data
  fn identity(&self) -> Value;

  /// Human-readable description for logs and panels
  fn description(&self) -> String;
}

/// The state of a query
#[derive(Debug, Clone)]
pub enum QueryState<T> {
  /// Query has not been started
  Idle,
  /// Query is currently fetching data and has none yet
  Loading,
  /// Query has data
  Success(T),
  /// Query failed with an error
  Error(String),
}

impl<T> QueryState<T> {
  pub fn is_loading(&self) -> bool {
    matches!(self, QueryState::Loading)
  }

  pub fn data(&self) -> Option<&T> {
    match self {
      QueryState::Success(data) => Some(data),
      _ => None,
    }
  }

  pub fn error(&self) -> Option<&str> {
    match self {
      QueryState::Error(e) => Some(e),
      _ => None,
    }
  }
}

/// Read-only view of one cached query.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
  pub hash: String,
  pub query_key: Value,
  pub data: Option<Value>,
  /// Epoch milliseconds of the last successful data write
  pub data_updated_at: i64,
  pub is_stale: bool,
}

/// Number of operations currently running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InFlight {
  pub fetching: usize,
  pub mutating: usize,
}

/// Cache mutation notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
  Added { hash: String },
  Updated { hash: String },
  Invalidated { hash: String },
  Failed { hash: String },
  Hydrated { count: usize },
  Cleared,
}

/// The operations the persistence and loading layers need from a query engine.
pub trait QueryEngine: Send + Sync {
  /// Current in-flight counters
  fn in_flight(&self) -> InFlight;

  /// Subscribe to the in-flight fetch counter
  fn watch_fetching(&self) -> watch::Receiver<usize>;

  /// Subscribe to the in-flight mutation counter
  fn watch_mutating(&self) -> watch::Receiver<usize>;

  /// Subscribe to cache mutation events
  fn subscribe(&self) -> broadcast::Receiver<CacheEvent>;

  /// Snapshot of every cached query
  fn entries(&self) -> Vec<CacheEntry>;

  /// Inject entries, keeping whichever side has the newer data
  fn hydrate(&self, entries: Vec<CacheEntry>);

  /// Remove every cached query
  fn clear(&self);

  /// Mutations executed since startup
  fn mutation_count(&self) -> usize;
}

#[derive(Debug)]
struct Record {
  query_key: Value,
  data: Option<Value>,
  data_updated_at: i64,
  invalidated: bool,
  error: Option<String>,
}

struct Shared {
  records: Mutex<HashMap<String, Record>>,
  in_progress: Mutex<HashSet<String>>,
  stale_time: Duration,
  events: broadcast::Sender<CacheEvent>,
  fetching: watch::Sender<usize>,
  mutating: watch::Sender<usize>,
  mutations: AtomicUsize,
}

/// Shared handle to the query cache.
#[derive(Clone)]
pub struct QueryClient {
  shared: Arc<Shared>,
}

impl QueryClient {
  /// Create an empty client. Data older than `stale_time` is reported stale.
  pub fn new(stale_time: Duration) -> Self {
    let (events, _) = broadcast::channel(EVENT_CAPACITY);
    let (fetching, _) = watch::channel(0);
    let (mutating, _) = watch::channel(0);

    Self {
      shared: Arc::new(Shared {
        records: Mutex::new(HashMap::new()),
        in_progress: Mutex::new(HashSet::new()),
        stale_time,
        events,
        fetching,
        mutating,
        mutations: AtomicUsize::new(0),
      }),
    }
  }

  /// Start fetching `key` unless a fetch for it is already running.
  ///
  /// Returns the task handle when a fetch was started.
  pub fn fetch<K, T, F, Fut>(&self, key: &K, fetcher: F) -> Option<JoinHandle<()>>
  where
    K: QueryKey,
    T: Serialize + Send + 'static,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
  {
    let hash = key.cache_hash();
    if !lock(&self.shared.in_progress).insert(hash.clone()) {
      debug!(query = %key.description(), "fetch already in flight");
      return None;
    }

    let identity = key.identity();
    let description = key.description();
    let future: BoxFuture<'static, Result<T>> = Box::pin(fetcher());
    let shared = Arc::clone(&self.shared);
    shared.fetching.send_modify(|n| *n += 1);

    Some(tokio::spawn(async move {
      let result = future.await.and_then(|data| {
        serde_json::to_value(data).map_err(|e| eyre!("Failed to serialize query data: {}", e))
      });

      match result {
        Ok(data) => {
          let event = shared.write(&hash, identity, data);
          shared.emit(event);
        }
        Err(e) => {
          warn!(query = %description, error = %e, "query failed");
          shared.fail(&hash, identity, e.to_string());
          shared.emit(CacheEvent::Failed { hash: hash.clone() });
        }
      }

      lock(&shared.in_progress).remove(&hash);
      shared.fetching.send_modify(|n| *n = n.saturating_sub(1));
    }))
  }

  /// Fetch only when the query has no fresh data.
  pub fn ensure<K, T, F, Fut>(&self, key: &K, fetcher: F) -> Option<JoinHandle<()>>
  where
    K: QueryKey,
    T: Serialize + Send + 'static,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
  {
    let hash = key.cache_hash();
    let fresh = lock(&self.shared.records)
      .get(&hash)
      .is_some_and(|record| !self.shared.is_stale(record, Utc::now().timestamp_millis()));

    if fresh {
      return None;
    }
    self.fetch(key, fetcher)
  }

  /// Run a mutation, then invalidate the given query hashes.
  #[allow(dead_code)]
  pub fn mutate<F, Fut>(&self, invalidates: Vec<String>, mutation: F) -> JoinHandle<()>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<()>> + Send + 'static,
  {
    let future: BoxFuture<'static, Result<()>> = Box::pin(mutation());
    let shared = Arc::clone(&self.shared);
    shared.mutating.send_modify(|n| *n += 1);

    tokio::spawn(async move {
      match future.await {
        Ok(()) => {
          for hash in invalidates {
            if shared.invalidate(&hash) {
              shared.emit(CacheEvent::Invalidated { hash });
            }
          }
        }
        Err(e) => warn!(error = %e, "mutation failed"),
      }

      shared.mutations.fetch_add(1, Ordering::SeqCst);
      shared.mutating.send_modify(|n| *n = n.saturating_sub(1));
    })
  }

  /// Write data for a query directly, as if a fetch had just succeeded.
  pub fn set_query_data<K: QueryKey, T: Serialize>(&self, key: &K, data: &T) -> Result<()> {
    let value =
      serde_json::to_value(data).map_err(|e| eyre!("Failed to serialize query data: {}", e))?;
    let event = self
      .shared
      .write(&key.cache_hash(), key.identity(), value);
    self.shared.emit(event);
    Ok(())
  }

  /// Deserialized data for a query, if present.
  pub fn get_query_data<K: QueryKey, T: DeserializeOwned>(&self, key: &K) -> Option<T> {
    let records = lock(&self.shared.records);
    let data = records.get(&key.cache_hash())?.data.as_ref()?;

    match serde_json::from_value(data.clone()) {
      Ok(value) => Some(value),
      Err(e) => {
        warn!(query = %key.description(), error = %e, "cached data has unexpected shape");
        None
      }
    }
  }

  /// Current state of a query, for rendering.
  pub fn state<K: QueryKey, T: DeserializeOwned>(&self, key: &K) -> QueryState<T> {
    if let Some(data) = self.get_query_data(key) {
      return QueryState::Success(data);
    }

    let hash = key.cache_hash();
    if lock(&self.shared.in_progress).contains(&hash) {
      return QueryState::Loading;
    }

    match lock(&self.shared.records)
      .get(&hash)
      .and_then(|r| r.error.clone())
    {
      Some(error) => QueryState::Error(error),
      None => QueryState::Idle,
    }
  }

  /// Mark a query stale so the next `ensure` refetches it.
  pub fn invalidate<K: QueryKey>(&self, key: &K) {
    let hash = key.cache_hash();
    if self.shared.invalidate(&hash) {
      self.shared.emit(CacheEvent::Invalidated { hash });
    }
  }
}

impl QueryEngine for QueryClient {
  fn in_flight(&self) -> InFlight {
    InFlight {
      fetching: *self.shared.fetching.borrow(),
      mutating: *self.shared.mutating.borrow(),
    }
  }

  fn watch_fetching(&self) -> watch::Receiver<usize> {
    self.shared.fetching.subscribe()
  }

  fn watch_mutating(&self) -> watch::Receiver<usize> {
    self.shared.mutating.subscribe()
  }

  fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
    self.shared.events.subscribe()
  }

  fn entries(&self) -> Vec<CacheEntry> {
    let now = Utc::now().timestamp_millis();
    let mut entries: Vec<CacheEntry> = lock(&self.shared.records)
      .iter()
      .map(|(hash, record)| CacheEntry {
        hash: hash.clone(),
        query_key: record.query_key.clone(),
        data: record.data.clone(),
        data_updated_at: record.data_updated_at,
        is_stale: self.shared.is_stale(record, now),
      })
      .collect();
    entries.sort_by(|a, b| a.hash.cmp(&b.hash));
    entries
  }

  fn hydrate(&self, entries: Vec<CacheEntry>) {
    let mut count = 0;
    {
      let mut records = lock(&self.shared.records);
      for entry in entries {
        let newer = records
          .get(&entry.hash)
          .map_or(true, |existing| existing.data_updated_at < entry.data_updated_at);
        if !newer {
          continue;
        }
        records.insert(
          entry.hash,
          Record {
            query_key: entry.query_key,
            data: entry.data,
            data_updated_at: entry.data_updated_at,
            invalidated: false,
            error: None,
          },
        );
        count += 1;
      }
    }

    debug!(count, "hydrated query cache");
    if count > 0 {
      self.shared.emit(CacheEvent::Hydrated { count });
    }
  }

  fn clear(&self) {
    lock(&self.shared.records).clear();
    self.shared.emit(CacheEvent::Cleared);
  }

  fn mutation_count(&self) -> usize {
    self.shared.mutations.load(Ordering::SeqCst)
  }
}

impl Shared {
  fn is_stale(&self, record: &Record, now: i64) -> bool {
    record.invalidated
      || record.data.is_none()
      || now.saturating_sub(record.data_updated_at) > self.stale_time.num_milliseconds()
  }

  fn write(&self, hash: &str, query_key: Value, data: Value) -> CacheEvent {
    let now = Utc::now().timestamp_millis();
    let previous = lock(&self.records).insert(
      hash.to_string(),
      Record {
        query_key,
        data: Some(data),
        data_updated_at: now,
        invalidated: false,
        error: None,
      },
    );

    let hash = hash.to_string();
    match previous {
      Some(_) => CacheEvent::Updated { hash },
      None => CacheEvent::Added { hash },
    }
  }

  /// Record a failure, keeping any previous data.
  fn fail(&self, hash: &str, query_key: Value, error: String) {
    lock(&self.records)
      .entry(hash.to_string())
      .and_modify(|record| record.error = Some(error.clone()))
      .or_insert(Record {
        query_key,
        data: None,
        data_updated_at: 0,
        invalidated: false,
        error: Some(error),
      });
  }

  fn invalidate(&self, hash: &str) -> bool {
    match lock(&self.records).get_mut(hash) {
      Some(record) => {
        record.invalidated = true;
        true
      }
      None => false,
    }
  }

  fn emit(&self, event: CacheEvent) {
    // No subscribers is fine: nothing is persisting yet
    let _ = self.events.send(event);
  }
}

/// A poisoned lock only means another task panicked mid-update; the map is
/// still structurally valid.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl std::fmt::Debug for QueryClient {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("QueryClient")
      .field("stale_time", &self.shared.stale_time)
      .field("in_flight", &self.in_flight())
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;
  use serde_json::json;

  /// Minimal key for tests.
  pub(crate) struct TestKey(pub &'static str);

  impl QueryKey for TestKey {
    fn cache_hash(&self) -> String {
      format!("hash-{}", self.0)
    }

    fn identity(&self) -> Value {
      json!([self.0])
    }

    fn description(&self) -> String {
      self.0.to_string()
    }
  }

  fn client() -> QueryClient {
    QueryClient::new(Duration::minutes(5))
  }

  #[tokio::test]
  async fn test_fetch_success() {
    let client = client();
    let key = TestKey("tools");

    assert!(matches!(
      client.state::<_, Vec<i32>>(&key),
      QueryState::Idle
    ));

    let handle = client
      .fetch(&key, || async { Ok(vec![1, 2, 3]) })
      .expect("fetch started");
    handle.await.unwrap();

    assert_eq!(client.get_query_data::<_, Vec<i32>>(&key), Some(vec![1, 2, 3]));
    assert_eq!(client.in_flight(), InFlight::default());
  }

  #[tokio::test]
  async fn test_fetch_error() {
    let client = client();
    let key = TestKey("broken");

    let handle = client
      .fetch(&key, || async { Err::<i32, _>(eyre!("Something went wrong")) })
      .unwrap();
    handle.await.unwrap();

    let state = client.state::<_, i32>(&key);
    assert_eq!(state.error(), Some("Something went wrong"));
  }

  #[tokio::test]
  async fn test_fetch_while_loading_is_noop() {
    let client = client();
    let key = TestKey("slow");

    let first = client.fetch(&key, || async {
      tokio::time::sleep(std::time::Duration::from_millis(50)).await;
      Ok(42)
    });
    assert!(first.is_some());
    assert!(client.state::<_, i32>(&key).is_loading());
    assert_eq!(client.in_flight().fetching, 1);

    // Second fetch should be no-op
    let second = client.fetch(&key, || async { Ok(7) });
    assert!(second.is_none());

    first.unwrap().await.unwrap();
    assert_eq!(client.get_query_data::<_, i32>(&key), Some(42));
  }

  #[tokio::test]
  async fn test_fetch_counters_are_published() {
    let client = client();
    let mut fetching = client.watch_fetching();

    let handle = client
      .fetch(&TestKey("a"), || async {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        Ok(1)
      })
      .unwrap();

    assert!(fetching.has_changed().unwrap());
    assert_eq!(*fetching.borrow_and_update(), 1);

    handle.await.unwrap();
    assert_eq!(*fetching.borrow_and_update(), 0);
  }

  #[tokio::test]
  async fn test_ensure_skips_fresh_data() {
    let client = client();
    let key = TestKey("fresh");
    client.set_query_data(&key, &1).unwrap();

    assert!(client.ensure(&key, || async { Ok(2) }).is_none());

    client.invalidate(&key);
    let handle = client.ensure(&key, || async { Ok(2) }).unwrap();
    handle.await.unwrap();
    assert_eq!(client.get_query_data::<_, i32>(&key), Some(2));
  }

  #[tokio::test]
  async fn test_mutation_invalidates_and_counts() {
    let client = client();
    let key = TestKey("list");
    client.set_query_data(&key, &vec!["a"]).unwrap();
    let mut events = client.subscribe();

    let handle = client.mutate(vec![key.cache_hash()], || async { Ok(()) });
    assert_eq!(client.in_flight().mutating, 1);
    handle.await.unwrap();

    assert_eq!(client.mutation_count(), 1);
    assert_eq!(client.in_flight().mutating, 0);
    assert_eq!(
      events.try_recv().unwrap(),
      CacheEvent::Invalidated {
        hash: key.cache_hash()
      }
    );
    assert!(client.entries()[0].is_stale);
  }

  #[test]
  fn test_set_query_data_emits_added_then_updated() {
    let client = client();
    let key = TestKey("x");
    let mut events = client.subscribe();

    client.set_query_data(&key, &1).unwrap();
    client.set_query_data(&key, &2).unwrap();

    assert_eq!(
      events.try_recv().unwrap(),
      CacheEvent::Added {
        hash: "hash-x".into()
      }
    );
    assert_eq!(
      events.try_recv().unwrap(),
      CacheEvent::Updated {
        hash: "hash-x".into()
      }
    );
  }

  #[test]
  fn test_stale_time_marks_old_entries() {
    let client = QueryClient::new(Duration::zero());
    client.hydrate(vec![CacheEntry {
      hash: "old".into(),
      query_key: json!(["old"]),
      data: Some(json!(1)),
      data_updated_at: Utc::now().timestamp_millis() - 1_000,
      is_stale: false,
    }]);

    assert!(client.entries()[0].is_stale);
  }

  #[test]
  fn test_extreme_update_time_is_stale() {
    let client = client();
    client.hydrate(vec![CacheEntry {
      hash: "ancient".into(),
      query_key: json!(["ancient"]),
      data: Some(json!(1)),
      data_updated_at: i64::MIN,
      is_stale: false,
    }]);

    assert!(client.entries()[0].is_stale);
  }

  #[test]
  fn test_hydrate_keeps_newer_data() {
    let client = client();
    let key = TestKey("k");
    client.set_query_data(&key, &"live").unwrap();

    client.hydrate(vec![CacheEntry {
      hash: key.cache_hash(),
      query_key: key.identity(),
      data: Some(json!("restored")),
      data_updated_at: 1,
      is_stale: false,
    }]);

    assert_eq!(
      client.get_query_data::<_, String>(&key),
      Some("live".to_string())
    );
  }

  #[test]
  fn test_clear_removes_everything() {
    let client = client();
    client.set_query_data(&TestKey("a"), &1).unwrap();
    client.set_query_data(&TestKey("b"), &2).unwrap();

    client.clear();
    assert!(client.entries().is_empty());
  }
}

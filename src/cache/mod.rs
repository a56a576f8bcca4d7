//! Durable persistence for the query cache.
//!
//! This module mirrors the in-memory `QueryClient` cache into a single
//! storage slot:
//! - Only fresh entries with data, updated within the TTL, are written
//! - Every write replaces the whole versioned snapshot
//! - A snapshot of another version is deleted on restore
//! - Storage failures degrade to an in-memory-only session

mod admin;
mod snapshot;
mod storage;
mod store;

pub use admin::{format_bytes, CacheAdministration, CacheInfo};
pub use snapshot::{CacheSnapshot, CacheStats, CACHE_VERSION};
pub use storage::{MemoryStorage, NoopStorage, SlotStorage, SqliteStorage};
pub use store::{CacheSubscription, PersistOptions, PersistentCacheStore};

use crate::config::CacheConfig;

/// Open the storage backend described by `config`.
///
/// Falls back to in-memory storage when the database cannot be opened.
pub fn open_storage(config: &CacheConfig) -> Box<dyn SlotStorage> {
  if !config.enabled {
    return Box::new(NoopStorage);
  }

  let opened = match &config.path {
    Some(path) => SqliteStorage::open_at(path),
    None => SqliteStorage::open(),
  };

  match opened {
    Ok(storage) => Box::new(storage),
    Err(e) => {
      tracing::warn!(error = %e, "cache storage unavailable, keeping cache in memory only");
      Box::new(MemoryStorage::new())
    }
  }
}

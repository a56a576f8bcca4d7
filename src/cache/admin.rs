//! Operator-facing inspection and reset of the persisted cache.

use chrono::{DateTime, Utc};

use super::storage::SlotStorage;
use super::store::PersistentCacheStore;
use crate::query::QueryEngine;

/// What the cache panel and `toolshelf cache info` show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheInfo {
  /// Bytes held by the storage slot
  pub size: usize,
  /// Queries in the in-memory cache
  pub query_count: usize,
  pub mutation_count: usize,
  /// Epoch milliseconds of the stored snapshot, 0 when none
  pub timestamp: i64,
  pub version: String,
}

impl CacheInfo {
  /// Label/value pairs for display.
  pub fn rows(&self) -> Vec<(&'static str, String)> {
    let written = if self.timestamp > 0 {
      DateTime::<Utc>::from_timestamp_millis(self.timestamp)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "unknown".to_string())
    } else {
      "never".to_string()
    };

    vec![
      ("Stored size", format_bytes(self.size)),
      ("Queries", self.query_count.to_string()),
      ("Mutations", self.mutation_count.to_string()),
      ("Last written", written),
      (
        "Version",
        if self.version.is_empty() {
          "-".to_string()
        } else {
          self.version.clone()
        },
      ),
    ]
  }
}

/// Thin wrapper giving an operator inspect and clear over the cache.
pub struct CacheAdministration<'a, S: SlotStorage, E: QueryEngine + ?Sized> {
  store: &'a PersistentCacheStore<S>,
  engine: &'a E,
}

impl<'a, S: SlotStorage, E: QueryEngine + ?Sized> CacheAdministration<'a, S, E> {
  pub fn new(store: &'a PersistentCacheStore<S>, engine: &'a E) -> Self {
    Self { store, engine }
  }

  pub fn cache_info(&self) -> CacheInfo {
    let stats = self.store.stats();
    CacheInfo {
      size: stats.approx_byte_size,
      query_count: self.engine.entries().len(),
      mutation_count: self.engine.mutation_count(),
      timestamp: stats.timestamp,
      version: stats.version,
    }
  }

  pub fn clear_cache(&self) {
    tracing::info!("cache cleared by operator");
    self.store.clear(self.engine);
  }
}

/// Format a byte count for humans
pub fn format_bytes(bytes: usize) -> String {
  const KIB: f64 = 1024.0;
  let b = bytes as f64;
  if b < KIB {
    format!("{} B", bytes)
  } else if b < KIB * KIB {
    format!("{:.1} KiB", b / KIB)
  } else {
    format!("{:.1} MiB", b / (KIB * KIB))
  }
}

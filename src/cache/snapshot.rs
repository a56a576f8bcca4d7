//! Versioned snapshots of the query cache.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::query::CacheEntry;

/// Snapshot format version. Bump when the stored shape changes; older
/// snapshots are discarded on restore.
pub const CACHE_VERSION: &str = "v1";

/// Maximum age of an entry that is still worth persisting.
pub const DEFAULT_TTL_HOURS: i64 = 24;

/// One persisted query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedEntry {
  pub data: Value,
  pub data_updated_at: i64,
  pub query_key: Value,
}

/// The complete, versioned content of a storage slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSnapshot {
  pub version: String,
  /// Epoch milliseconds at which the snapshot was taken
  pub timestamp: i64,
  #[serde(rename = "data")]
  pub entries: BTreeMap<String, PersistedEntry>,
}

impl CacheSnapshot {
  /// Capture every eligible entry.
  pub fn capture(version: &str, entries: &[CacheEntry], ttl: Duration, now: i64) -> Self {
    let entries = entries
      .iter()
      .filter(|entry| is_eligible(entry, ttl, now))
      .filter_map(|entry| {
        let data = entry.data.clone()?;
        Some((
          entry.hash.clone(),
          PersistedEntry {
            data,
            data_updated_at: entry.data_updated_at,
            query_key: entry.query_key.clone(),
          },
        ))
      })
      .collect();

    Self {
      version: version.to_string(),
      timestamp: now,
      entries,
    }
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Entries still inside the TTL window, ready to hydrate a query engine.
  pub fn live_entries(&self, ttl: Duration, now: i64) -> Vec<CacheEntry> {
    self
      .entries
      .iter()
      .filter(|(_, entry)| within_ttl(entry.data_updated_at, ttl, now))
      .map(|(hash, entry)| CacheEntry {
        hash: hash.clone(),
        query_key: entry.query_key.clone(),
        data: Some(entry.data.clone()),
        data_updated_at: entry.data_updated_at,
        is_stale: false,
      })
      .collect()
  }
}

/// Whether an entry may be written to durable storage: fresh, carrying data,
/// and updated within the TTL window.
pub fn is_eligible(entry: &CacheEntry, ttl: Duration, now: i64) -> bool {
  !entry.is_stale && entry.data.is_some() && within_ttl(entry.data_updated_at, ttl, now)
}

fn within_ttl(updated_at: i64, ttl: Duration, now: i64) -> bool {
  now.saturating_sub(updated_at) <= ttl.num_milliseconds()
}

/// Summary of the storage slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
  pub entry_count: usize,
  pub approx_byte_size: usize,
  pub timestamp: i64,
  pub version: String,
}

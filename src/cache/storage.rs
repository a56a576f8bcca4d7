//! Durable storage slots and their backends.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// A persistent key/value store holding whole string values per slot.
///
/// Writes replace the slot wholesale; readers see either the previous value
/// or the new one.
pub trait SlotStorage: Send + Sync {
  /// Read the value of a slot, `None` if it does not exist.
  fn read(&self, key: &str) -> Result<Option<String>>;

  /// Replace the value of a slot.
  fn write(&self, key: &str, value: &str) -> Result<()>;

  /// Delete a slot. Deleting a missing slot is not an error.
  fn remove(&self, key: &str) -> Result<()>;
}

impl<T: SlotStorage + ?Sized> SlotStorage for Box<T> {
  fn read(&self, key: &str) -> Result<Option<String>> {
    (**self).read(key)
  }

  fn write(&self, key: &str, value: &str) -> Result<()> {
    (**self).write(key, value)
  }

  fn remove(&self, key: &str) -> Result<()> {
    (**self).remove(key)
  }
}

/// Storage implementation that doesn't persist anything.
/// Used when persistence is disabled - all operations are no-ops.
pub struct NoopStorage;

impl SlotStorage for NoopStorage {
  fn read(&self, _key: &str) -> Result<Option<String>> {
    Ok(None) // Always empty
  }

  fn write(&self, _key: &str, _value: &str) -> Result<()> {
    Ok(()) // Discard
  }

  fn remove(&self, _key: &str) -> Result<()> {
    Ok(())
  }
}

/// In-memory storage with an optional per-value byte quota.
///
/// Backs the session when the database cannot be opened, and lets tests
/// simulate a full store.
#[derive(Default)]
pub struct MemoryStorage {
  slots: Mutex<HashMap<String, String>>,
  quota: Option<usize>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }

  /// Reject writes larger than `bytes`.
  #[cfg(test)]
  pub fn with_quota(bytes: usize) -> Self {
    Self {
      slots: Mutex::new(HashMap::new()),
      quota: Some(bytes),
    }
  }
}

impl SlotStorage for MemoryStorage {
  fn read(&self, key: &str) -> Result<Option<String>> {
    let slots = self
      .slots
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(slots.get(key).cloned())
  }

  fn write(&self, key: &str, value: &str) -> Result<()> {
    if let Some(quota) = self.quota {
      if value.len() > quota {
        return Err(eyre!(
          "Storage quota exceeded: {} bytes over a {} byte limit",
          value.len(),
          quota
        ));
      }
    }

    let mut slots = self
      .slots
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    slots.insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    let mut slots = self
      .slots
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    slots.remove(key);
    Ok(())
  }
}

/// SQLite-based slot storage.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open the storage database at the default location.
  pub fn open() -> Result<Self> {
    Self::open_at(&Self::default_path()?)
  }

  /// Open (or create) the storage database at `path`.
  pub fn open_at(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create storage directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open storage database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Storage that lives only as long as this value.
  #[cfg(test)]
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory database: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    Ok(crate::config::data_dir()?.join("storage.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(STORAGE_SCHEMA)
      .map_err(|e| eyre!("Failed to run storage migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for slot storage.
const STORAGE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS slots (
    slot_key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    written_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl SlotStorage for SqliteStorage {
  fn read(&self, key: &str) -> Result<Option<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .query_row(
        "SELECT value FROM slots WHERE slot_key = ?",
        params![key],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read slot {}: {}", key, e))
  }

  fn write(&self, key: &str, value: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO slots (slot_key, value, written_at)
         VALUES (?, ?, datetime('now'))",
        params![key, value],
      )
      .map_err(|e| eyre!("Failed to write slot {}: {}", key, e))?;

    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM slots WHERE slot_key = ?", params![key])
      .map_err(|e| eyre!("Failed to delete slot {}: {}", key, e))?;

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_sqlite_read_write_remove() {
    let storage = SqliteStorage::open_in_memory().unwrap();

    assert_eq!(storage.read("slot").unwrap(), None);

    storage.write("slot", "first").unwrap();
    storage.write("slot", "second").unwrap();
    assert_eq!(storage.read("slot").unwrap().as_deref(), Some("second"));

    storage.remove("slot").unwrap();
    assert_eq!(storage.read("slot").unwrap(), None);

    // Removing again is fine
    storage.remove("slot").unwrap();
  }

  #[test]
  fn test_sqlite_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("storage.db");

    SqliteStorage::open_at(&path)
      .unwrap()
      .write("slot", "kept")
      .unwrap();

    let reopened = SqliteStorage::open_at(&path).unwrap();
    assert_eq!(reopened.read("slot").unwrap().as_deref(), Some("kept"));
  }

  #[test]
  fn test_memory_quota() {
    let storage = MemoryStorage::with_quota(4);

    storage.write("slot", "tiny").unwrap();
    let err = storage.write("slot", "too large").unwrap_err();
    assert!(err.to_string().contains("quota exceeded"));

    // The previous value survives a rejected write
    assert_eq!(storage.read("slot").unwrap().as_deref(), Some("tiny"));
  }

  #[test]
  fn test_noop_storage_is_always_empty() {
    let storage: Box<dyn SlotStorage> = Box::new(NoopStorage);
    storage.write("slot", "value").unwrap();
    assert_eq!(storage.read("slot").unwrap(), None);
  }
}

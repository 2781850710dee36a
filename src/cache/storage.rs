//! Cache storage trait and its backends.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::traits::TtlClass;
use crate::error::{CatalogError, Result};

/// A single stored entry, payload still serialized.
#[derive(Debug, Clone)]
pub struct StoredEntry {
  /// Serialized payload (JSON)
  pub payload: Vec<u8>,
  /// When the entry was written
  pub written_at: DateTime<Utc>,
  /// TTL class the entry was written under
  pub ttl_class: TtlClass,
}

/// Trait for cache storage backends.
///
/// Entries are whole snapshots: a write replaces whatever was stored under the
/// key, there is no merge.
pub trait CacheStorage: Send + Sync {
  /// Read the entry stored under `key`.
  fn read(&self, key: &str) -> Result<Option<StoredEntry>>;

  /// Store `payload` under `key`, replacing any previous entry.
  fn write(&self, key: &str, description: &str, ttl_class: TtlClass, payload: &[u8])
    -> Result<()>;

  /// Remove a single entry.
  fn remove(&self, key: &str) -> Result<()>;

  /// Remove every entry.
  fn clear(&self) -> Result<()>;
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStorage;

impl CacheStorage for NoopStorage {
  fn read(&self, _key: &str) -> Result<Option<StoredEntry>> {
    Ok(None) // Always miss
  }

  fn write(&self, _key: &str, _description: &str, _ttl: TtlClass, _payload: &[u8]) -> Result<()> {
    Ok(()) // Discard
  }

  fn remove(&self, _key: &str) -> Result<()> {
    Ok(())
  }

  fn clear(&self) -> Result<()> {
    Ok(())
  }
}

/// Process-local storage backed by a map.
#[derive(Default)]
pub struct MemoryStorage {
  entries: Mutex<HashMap<String, StoredEntry>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }

  fn entries(&self) -> MutexGuard<'_, HashMap<String, StoredEntry>> {
    self.entries.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

impl CacheStorage for MemoryStorage {
  fn read(&self, key: &str) -> Result<Option<StoredEntry>> {
    Ok(self.entries().get(key).cloned())
  }

  fn write(&self, key: &str, _description: &str, ttl_class: TtlClass, payload: &[u8]) -> Result<()> {
    self.entries().insert(
      key.to_string(),
      StoredEntry {
        payload: payload.to_vec(),
        written_at: Utc::now(),
        ttl_class,
      },
    );
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    self.entries().remove(key);
    Ok(())
  }

  fn clear(&self) -> Result<()> {
    self.entries().clear();
    Ok(())
  }
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS cache_entries (
    cache_key TEXT PRIMARY KEY,
    description TEXT NOT NULL,
    ttl_class TEXT NOT NULL,
    payload BLOB NOT NULL,
    written_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_cache_entries_class ON cache_entries(ttl_class);
"#;

impl SqliteStorage {
  /// Create a new SQLite storage at the default location.
  pub fn open() -> Result<Self> {
    let path = Self::default_path()?;
    Self::open_at(&path)
  }

  /// Open or create the cache database at `path`.
  pub fn open_at(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| CatalogError::Cache(format!("Failed to create cache directory: {}", e)))?;
    }

    let conn = Connection::open(path).map_err(|e| {
      CatalogError::Cache(format!(
        "Failed to open cache database at {}: {}",
        path.display(),
        e
      ))
    })?;

    Self::with_connection(conn)
  }

  /// Open a throwaway database that lives only as long as this value.
  pub fn in_memory() -> Result<Self> {
    Self::with_connection(Connection::open_in_memory()?)
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
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| CatalogError::Cache("Could not determine data directory".to_string()))?;

    Ok(data_dir.join("photocat").join("cache.db"))
  }

  fn conn(&self) -> MutexGuard<'_, Connection> {
    self.conn.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    self
      .conn()
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| CatalogError::Cache(format!("Failed to run cache migrations: {}", e)))
  }
}

impl CacheStorage for SqliteStorage {
  fn read(&self, key: &str) -> Result<Option<StoredEntry>> {
    let conn = self.conn();

    let row: Option<(Vec<u8>, String, String)> = conn
      .query_row(
        "SELECT payload, written_at, ttl_class FROM cache_entries WHERE cache_key = ?",
        params![key],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
      )
      .optional()?;

    let Some((payload, written_at, ttl_class)) = row else {
      return Ok(None);
    };

    Ok(Some(StoredEntry {
      payload,
      written_at: parse_datetime(&written_at)?,
      ttl_class: ttl_class.parse().map_err(CatalogError::Cache)?,
    }))
  }

  fn write(&self, key: &str, description: &str, ttl_class: TtlClass, payload: &[u8]) -> Result<()> {
    let written_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

    self.conn().execute(
      "INSERT OR REPLACE INTO cache_entries (cache_key, description, ttl_class, payload, written_at)
       VALUES (?, ?, ?, ?, ?)",
      params![key, description, ttl_class.as_str(), payload, written_at],
    )?;

    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    self
      .conn()
      .execute("DELETE FROM cache_entries WHERE cache_key = ?", params![key])?;
    Ok(())
  }

  fn clear(&self) -> Result<()> {
    self.conn().execute("DELETE FROM cache_entries", [])?;
    Ok(())
  }
}

/// Parse a stored RFC 3339 timestamp.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| CatalogError::Cache(format!("Failed to parse datetime '{}': {}", s, e)))
}

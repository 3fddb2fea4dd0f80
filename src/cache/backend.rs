//! Storage backends for named cache stores.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Report, Result};
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::http::Response;

/// A stored response together with its capture metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry {
  /// Request URL the entry was captured for
  pub url: String,
  /// The captured response
  pub response: Response,
  /// When the entry was written
  pub cached_at: DateTime<Utc>,
}

/// Marker error for storage-quota exhaustion.
///
/// Backends wrap this into their error report when the underlying store is
/// full; the manager downcasts to it to trigger drop-and-recreate recovery.
#[derive(Debug)]
pub struct QuotaExceeded;

impl std::fmt::Display for QuotaExceeded {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "storage quota exceeded")
  }
}

impl std::error::Error for QuotaExceeded {}

/// Trait for cache store backends.
pub trait StoreBackend: Send + Sync {
  /// Ensure a named store exists.
  fn open_store(&self, name: &str) -> Result<()>;

  /// Insert or replace an entry in a store.
  fn put(&self, store: &str, key: &str, entry: &CacheEntry) -> Result<()>;

  /// Look up an entry in a store.
  fn get(&self, store: &str, key: &str) -> Result<Option<CacheEntry>>;

  /// Delete a store and all its entries. Returns whether the store existed.
  fn delete_store(&self, name: &str) -> Result<bool>;

  /// Names of all existing stores.
  fn store_names(&self) -> Result<Vec<String>>;

  /// Number of entries in a store.
  fn entry_count(&self, store: &str) -> Result<usize>;
}

// ============================================================================
// SQLite backend
// ============================================================================

/// SQLite-backed store implementation.
pub struct SqliteBackend {
  conn: Mutex<Connection>,
}

impl SqliteBackend {
  /// Open the backend at the default location.
  pub fn open() -> Result<Self> {
    let path = Self::default_path()?;

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(&path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::from_connection(conn)
  }

  /// Open an in-memory backend (used by tests).
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;

    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    let backend = Self {
      conn: Mutex::new(conn),
    };
    backend.run_migrations()?;

    Ok(backend)
  }

  /// Get the default database path.
  fn default_path() -> Result<std::path::PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("helpdesk-sw").join("cache.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for cache store tables.
const CACHE_SCHEMA: &str = r#"
-- Named store registry
CREATE TABLE IF NOT EXISTS stores (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Captured responses, keyed by request identity per store
CREATE TABLE IF NOT EXISTS entries (
    store TEXT NOT NULL,
    entry_key TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers BLOB NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (store, entry_key),
    FOREIGN KEY (store) REFERENCES stores(name) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_entries_store ON entries(store);
"#;

/// Map a rusqlite error, surfacing quota exhaustion as [`QuotaExceeded`].
fn map_sqlite_error(context: &str, err: rusqlite::Error) -> Report {
  if let rusqlite::Error::SqliteFailure(failure, _) = &err {
    if failure.code == rusqlite::ErrorCode::DiskFull {
      return Report::new(QuotaExceeded);
    }
  }
  eyre!("{}: {}", context, err)
}

impl StoreBackend for SqliteBackend {
  fn open_store(&self, name: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR IGNORE INTO stores (name) VALUES (?)",
        params![name],
      )
      .map_err(|e| map_sqlite_error("Failed to open store", e))?;

    Ok(())
  }

  fn put(&self, store: &str, key: &str, entry: &CacheEntry) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let headers = serde_json::to_vec(&entry.response.headers)
      .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

    conn
      .execute(
        "INSERT OR IGNORE INTO stores (name) VALUES (?)",
        params![store],
      )
      .map_err(|e| map_sqlite_error("Failed to open store", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO entries (store, entry_key, url, status, headers, body, cached_at)
         VALUES (?, ?, ?, ?, ?, ?, datetime('now'))",
        params![
          store,
          key,
          entry.url,
          entry.response.status,
          headers,
          entry.response.body
        ],
      )
      .map_err(|e| map_sqlite_error("Failed to store entry", e))?;

    Ok(())
  }

  fn get(&self, store: &str, key: &str) -> Result<Option<CacheEntry>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare(
        "SELECT url, status, headers, body, cached_at FROM entries
         WHERE store = ? AND entry_key = ?",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let row: Option<(String, u16, Vec<u8>, Vec<u8>, String)> = stmt
      .query_row(params![store, key], |row| {
        Ok((
          row.get(0)?,
          row.get(1)?,
          row.get(2)?,
          row.get(3)?,
          row.get(4)?,
        ))
      })
      .ok();

    match row {
      Some((url, status, headers, body, cached_at_str)) => {
        let headers: HashMap<String, String> = serde_json::from_slice(&headers)
          .map_err(|e| eyre!("Failed to deserialize headers: {}", e))?;
        let cached_at = parse_datetime(&cached_at_str)?;

        Ok(Some(CacheEntry {
          url,
          response: Response {
            status,
            headers,
            body,
          },
          cached_at,
        }))
      }
      None => Ok(None),
    }
  }

  fn delete_store(&self, name: &str) -> Result<bool> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM entries WHERE store = ?", params![name])
      .map_err(|e| eyre!("Failed to delete store entries: {}", e))?;

    let deleted = conn
      .execute("DELETE FROM stores WHERE name = ?", params![name])
      .map_err(|e| eyre!("Failed to delete store: {}", e))?;

    Ok(deleted > 0)
  }

  fn store_names(&self) -> Result<Vec<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT name FROM stores ORDER BY name")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list stores: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    Ok(names)
  }

  fn entry_count(&self, store: &str) -> Result<usize> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let count: i64 = conn
      .query_row(
        "SELECT COUNT(*) FROM entries WHERE store = ?",
        params![store],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to count entries: {}", e))?;

    Ok(count as usize)
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

// ============================================================================
// In-memory backend
// ============================================================================

/// In-memory backend for tests.
///
/// An optional per-store entry cap simulates quota exhaustion: inserting a
/// new key into a full store fails with [`QuotaExceeded`].
#[derive(Default)]
pub struct MemoryBackend {
  stores: Mutex<HashMap<String, HashMap<String, CacheEntry>>>,
  entry_cap: Option<usize>,
}

impl MemoryBackend {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_entry_cap(cap: usize) -> Self {
    Self {
      stores: Mutex::new(HashMap::new()),
      entry_cap: Some(cap),
    }
  }
}

impl StoreBackend for MemoryBackend {
  fn open_store(&self, name: &str) -> Result<()> {
    let mut stores = self
      .stores
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    stores.entry(name.to_string()).or_default();
    Ok(())
  }

  fn put(&self, store: &str, key: &str, entry: &CacheEntry) -> Result<()> {
    let mut stores = self
      .stores
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let entries = stores.entry(store.to_string()).or_default();
    if let Some(cap) = self.entry_cap {
      if entries.len() >= cap && !entries.contains_key(key) {
        return Err(Report::new(QuotaExceeded));
      }
    }

    entries.insert(key.to_string(), entry.clone());
    Ok(())
  }

  fn get(&self, store: &str, key: &str) -> Result<Option<CacheEntry>> {
    let stores = self
      .stores
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    Ok(stores.get(store).and_then(|entries| entries.get(key)).cloned())
  }

  fn delete_store(&self, name: &str) -> Result<bool> {
    let mut stores = self
      .stores
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    Ok(stores.remove(name).is_some())
  }

  fn store_names(&self) -> Result<Vec<String>> {
    let stores = self
      .stores
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut names: Vec<String> = stores.keys().cloned().collect();
    names.sort();
    Ok(names)
  }

  fn entry_count(&self, store: &str) -> Result<usize> {
    let stores = self
      .stores
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    Ok(stores.get(store).map(HashMap::len).unwrap_or(0))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn entry(url: &str, body: &str) -> CacheEntry {
    CacheEntry {
      url: url.to_string(),
      response: Response::new(200).with_body(body),
      cached_at: Utc::now(),
    }
  }

  fn roundtrip(backend: &dyn StoreBackend) {
    backend.open_store("shell-v1").unwrap();

    backend
      .put("shell-v1", "k1", &entry("https://example.com/a", "alpha"))
      .unwrap();

    let found = backend.get("shell-v1", "k1").unwrap().unwrap();
    assert_eq!(found.response.body, b"alpha");
    assert_eq!(found.url, "https://example.com/a");

    assert!(backend.get("shell-v1", "missing").unwrap().is_none());
    assert!(backend.get("other", "k1").unwrap().is_none());

    assert_eq!(backend.store_names().unwrap(), vec!["shell-v1".to_string()]);
    assert_eq!(backend.entry_count("shell-v1").unwrap(), 1);

    assert!(backend.delete_store("shell-v1").unwrap());
    assert!(!backend.delete_store("shell-v1").unwrap());
    assert!(backend.get("shell-v1", "k1").unwrap().is_none());
  }

  #[test]
  fn sqlite_roundtrip() {
    let backend = SqliteBackend::open_in_memory().unwrap();
    roundtrip(&backend);
  }

  #[test]
  fn memory_roundtrip() {
    let backend = MemoryBackend::new();
    roundtrip(&backend);
  }

  #[test]
  fn memory_cap_surfaces_quota_error() {
    let backend = MemoryBackend::with_entry_cap(1);
    backend
      .put("d", "k1", &entry("https://example.com/1", "one"))
      .unwrap();

    // Replacing an existing key is fine even at the cap
    backend
      .put("d", "k1", &entry("https://example.com/1", "one again"))
      .unwrap();

    let err = backend
      .put("d", "k2", &entry("https://example.com/2", "two"))
      .unwrap_err();
    assert!(err.downcast_ref::<QuotaExceeded>().is_some());
  }

  #[test]
  fn sqlite_put_creates_store_row() {
    let backend = SqliteBackend::open_in_memory().unwrap();
    backend
      .put("dynamic-v1", "k", &entry("https://example.com/x", "x"))
      .unwrap();

    assert_eq!(
      backend.store_names().unwrap(),
      vec!["dynamic-v1".to_string()]
    );
  }
}

//! SQLite-backed cache store.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;

use crate::resource::{RequestKey, StoredResponse};

use super::traits::{CachedEntry, StoreBackend};

/// Persistent store implementation backed by a single SQLite database.
///
/// Named stores are rows in a registry table; entries are keyed by
/// (store name, request identity hash).
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Create a new SQLite store at the default location.
  pub fn open() -> Result<Self> {
    let path = Self::default_path()?;
    Self::open_at(&path)
  }

  /// Create a new SQLite store at the given path.
  pub fn open_at(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create store directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open store database at {}: {}", path.display(), e))?;

    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;

    Ok(store)
  }

  /// Get the default database path.
  fn default_path() -> Result<std::path::PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("offshell").join("store.db"))
  }

  /// Run database migrations for the store tables.
  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(STORE_SCHEMA)
      .map_err(|e| eyre!("Failed to run store migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for the store tables.
const STORE_SCHEMA: &str = r#"
-- Store registry; one row per named cache store
CREATE TABLE IF NOT EXISTS stores (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Cached responses keyed by request identity within a store
CREATE TABLE IF NOT EXISTS entries (
    store_name TEXT NOT NULL,
    identity TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers BLOB NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (store_name, identity)
);

CREATE INDEX IF NOT EXISTS idx_entries_store ON entries(store_name);
"#;

impl StoreBackend for SqliteStore {
  fn open(&self, name: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("INSERT OR IGNORE INTO stores (name) VALUES (?)", params![name])
      .map_err(|e| eyre!("Failed to open store {}: {}", name, e))?;

    Ok(())
  }

  fn list_names(&self) -> Result<Vec<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT name FROM stores ORDER BY rowid")
      .map_err(|e| eyre!("Failed to prepare store listing: {}", e))?;

    let names: Vec<String> = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list stores: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    Ok(names)
  }

  fn delete_store(&self, name: &str) -> Result<bool> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM entries WHERE store_name = ?", params![name])
      .map_err(|e| eyre!("Failed to delete entries of store {}: {}", name, e))?;

    let removed = conn
      .execute("DELETE FROM stores WHERE name = ?", params![name])
      .map_err(|e| eyre!("Failed to delete store {}: {}", name, e))?;

    Ok(removed > 0)
  }

  fn get(&self, store: &str, key: &RequestKey) -> Result<Option<CachedEntry>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare(
        "SELECT status, headers, body, cached_at FROM entries
         WHERE store_name = ? AND identity = ?",
      )
      .map_err(|e| eyre!("Failed to prepare entry lookup: {}", e))?;

    let result: Option<(u16, Vec<u8>, Vec<u8>, String)> = stmt
      .query_row(params![store, key.identity_hash()], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
      })
      .ok();

    match result {
      Some((status, headers_blob, body, cached_at_str)) => {
        let headers: Vec<(String, String)> = serde_json::from_slice(&headers_blob)
          .map_err(|e| eyre!("Failed to deserialize headers: {}", e))?;
        let cached_at = parse_datetime(&cached_at_str)?;

        let mut response = StoredResponse::new(status, headers, body);
        response.from_cache = true;

        Ok(Some(CachedEntry {
          response,
          cached_at,
        }))
      }
      None => Ok(None),
    }
  }

  fn put(&self, store: &str, key: &RequestKey, response: &StoredResponse) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    insert_entry(&conn, store, key, response)
  }

  fn put_all(&self, store: &str, entries: &[(RequestKey, StoredResponse)]) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("BEGIN TRANSACTION", [])
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    for (key, response) in entries {
      if let Err(e) = insert_entry(&conn, store, key, response) {
        let _ = conn.execute("ROLLBACK", []);
        return Err(e);
      }
    }

    conn
      .execute("COMMIT", [])
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }
}

fn insert_entry(
  conn: &Connection,
  store: &str,
  key: &RequestKey,
  response: &StoredResponse,
) -> Result<()> {
  let headers =
    serde_json::to_vec(&response.headers).map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

  conn
    .execute(
      "INSERT OR REPLACE INTO entries (store_name, identity, method, url, status, headers, body, cached_at)
       VALUES (?, ?, ?, ?, ?, ?, ?, datetime('now'))",
      params![
        store,
        key.identity_hash(),
        key.method(),
        key.url(),
        response.status,
        headers,
        response.body,
      ],
    )
    .map_err(|e| eyre!("Failed to store entry for {}: {}", key.url(), e))?;

  Ok(())
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn temp_store() -> (tempfile::TempDir, SqliteStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open_at(&dir.path().join("store.db")).unwrap();
    (dir, store)
  }

  fn response(status: u16, body: &str) -> StoredResponse {
    StoredResponse::new(
      status,
      vec![("content-type".to_string(), "text/plain".to_string())],
      body.as_bytes().to_vec(),
    )
  }

  #[test]
  fn test_open_and_list_preserves_creation_order() {
    let (_dir, store) = temp_store();
    store.open("shell-v1").unwrap();
    store.open("shell-v2").unwrap();
    store.open("shell-v1").unwrap(); // reopening is a no-op

    assert_eq!(
      store.list_names().unwrap(),
      vec!["shell-v1".to_string(), "shell-v2".to_string()]
    );
  }

  #[test]
  fn test_round_trip_is_byte_identical() {
    let (_dir, store) = temp_store();
    store.open("shell-v1").unwrap();

    let key = RequestKey::get("./a.js");
    let original = response(200, "X");
    store.put("shell-v1", &key, &original).unwrap();

    let entry = store.get("shell-v1", &key).unwrap().unwrap();
    assert_eq!(entry.response.status, original.status);
    assert_eq!(entry.response.headers, original.headers);
    assert_eq!(entry.response.body, original.body);
    assert!(entry.response.from_cache);
  }

  #[test]
  fn test_get_misses_across_stores() {
    let (_dir, store) = temp_store();
    store.open("shell-v1").unwrap();
    store.open("shell-v2").unwrap();

    let key = RequestKey::get("./a.js");
    store.put("shell-v1", &key, &response(200, "X")).unwrap();

    assert!(store.get("shell-v2", &key).unwrap().is_none());
  }

  #[test]
  fn test_put_all_stores_every_entry() {
    let (_dir, store) = temp_store();
    store.open("shell-v1").unwrap();

    let entries = vec![
      (RequestKey::get("./index.html"), response(200, "<html>Shell</html>")),
      (RequestKey::get("./a.js"), response(200, "X")),
    ];
    store.put_all("shell-v1", &entries).unwrap();

    for (key, original) in &entries {
      let entry = store.get("shell-v1", key).unwrap().unwrap();
      assert_eq!(entry.response.body, original.body);
    }
  }

  #[test]
  fn test_delete_store_removes_name_and_entries() {
    let (_dir, store) = temp_store();
    store.open("shell-v1").unwrap();
    store.open("shell-v2").unwrap();

    let key = RequestKey::get("./a.js");
    store.put("shell-v1", &key, &response(200, "X")).unwrap();

    assert!(store.delete_store("shell-v1").unwrap());
    assert!(!store.delete_store("shell-v1").unwrap());
    assert_eq!(store.list_names().unwrap(), vec!["shell-v2".to_string()]);
    assert!(store.get("shell-v1", &key).unwrap().is_none());
  }

  #[test]
  fn test_put_replaces_previous_entry() {
    let (_dir, store) = temp_store();
    store.open("shell-v1").unwrap();

    let key = RequestKey::get("./a.js");
    store.put("shell-v1", &key, &response(200, "old")).unwrap();
    store.put("shell-v1", &key, &response(200, "new")).unwrap();

    let entry = store.get("shell-v1", &key).unwrap().unwrap();
    assert_eq!(entry.response.body, b"new");
  }
}

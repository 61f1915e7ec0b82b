//! In-memory cache store for tests and ephemeral runs.

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::resource::{RequestKey, StoredResponse};

use super::traits::{CachedEntry, StoreBackend};

/// Store implementation that keeps everything in process memory.
///
/// Used with `--ephemeral` and throughout the test suite. Creation order of
/// named stores is preserved for `list_names`.
#[derive(Default)]
pub struct MemoryStore {
  stores: Mutex<Vec<(String, HashMap<String, CachedEntry>)>>,
}

impl StoreBackend for MemoryStore {
  fn open(&self, name: &str) -> Result<()> {
    let mut stores = self
      .stores
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    if !stores.iter().any(|(n, _)| n == name) {
      stores.push((name.to_string(), HashMap::new()));
    }

    Ok(())
  }

  fn list_names(&self) -> Result<Vec<String>> {
    let stores = self
      .stores
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    Ok(stores.iter().map(|(n, _)| n.clone()).collect())
  }

  fn delete_store(&self, name: &str) -> Result<bool> {
    let mut stores = self
      .stores
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let before = stores.len();
    stores.retain(|(n, _)| n != name);

    Ok(stores.len() < before)
  }

  fn get(&self, store: &str, key: &RequestKey) -> Result<Option<CachedEntry>> {
    let stores = self
      .stores
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let entries = match stores.iter().find(|(n, _)| n == store) {
      Some((_, entries)) => entries,
      None => return Ok(None),
    };

    Ok(entries.get(&key.identity_hash()).cloned().map(|mut entry| {
      entry.response.from_cache = true;
      entry
    }))
  }

  fn put(&self, store: &str, key: &RequestKey, response: &StoredResponse) -> Result<()> {
    let mut stores = self
      .stores
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    if !stores.iter().any(|(n, _)| n == store) {
      stores.push((store.to_string(), HashMap::new()));
    }

    if let Some((_, entries)) = stores.iter_mut().find(|(n, _)| n == store) {
      entries.insert(
        key.identity_hash(),
        CachedEntry {
          response: response.clone(),
          cached_at: Utc::now(),
        },
      );
    }

    Ok(())
  }

  fn put_all(&self, store: &str, entries: &[(RequestKey, StoredResponse)]) -> Result<()> {
    // In-memory puts cannot fail partway, so per-entry inserts stay
    // all-or-nothing.
    for (key, response) in entries {
      self.put(store, key, response)?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_open_list_delete() {
    let store = MemoryStore::default();
    store.open("shell-v4").unwrap();
    store.open("shell-v5").unwrap();

    assert_eq!(
      store.list_names().unwrap(),
      vec!["shell-v4".to_string(), "shell-v5".to_string()]
    );

    assert!(store.delete_store("shell-v4").unwrap());
    assert!(!store.delete_store("shell-v4").unwrap());
    assert_eq!(store.list_names().unwrap(), vec!["shell-v5".to_string()]);
  }

  #[test]
  fn test_get_marks_from_cache() {
    let store = MemoryStore::default();
    store.open("shell-v1").unwrap();

    let key = RequestKey::get("./a.js");
    let response = StoredResponse::new(200, Vec::new(), b"X".to_vec());
    assert!(!response.from_cache);
    store.put("shell-v1", &key, &response).unwrap();

    let entry = store.get("shell-v1", &key).unwrap().unwrap();
    assert!(entry.response.from_cache);
    assert_eq!(entry.response.body, b"X");
  }

  #[test]
  fn test_miss_on_unknown_store_or_key() {
    let store = MemoryStore::default();
    let key = RequestKey::get("./a.js");
    assert!(store.get("shell-v1", &key).unwrap().is_none());

    store.open("shell-v1").unwrap();
    assert!(store.get("shell-v1", &key).unwrap().is_none());
  }
}

//! Cache store interface consumed by the lifecycle controller.

use chrono::{DateTime, Utc};
use color_eyre::Result;

use crate::resource::{RequestKey, StoredResponse};

/// A stored response plus when it was cached.
#[derive(Debug, Clone)]
pub struct CachedEntry {
  pub response: StoredResponse,
  pub cached_at: DateTime<Utc>,
}

/// A collection of named cache stores, each mapping request identities to
/// stored responses.
///
/// Per-key operations are atomic; a reader may miss a write that is still in
/// flight. Responses returned by `get` are marked `from_cache`.
pub trait StoreBackend: Send + Sync {
  /// Open the named store, creating it if absent.
  fn open(&self, name: &str) -> Result<()>;

  /// Names of every store present, in creation order.
  fn list_names(&self) -> Result<Vec<String>>;

  /// Delete the named store and all its entries. Returns whether it existed.
  fn delete_store(&self, name: &str) -> Result<bool>;

  /// Look up a request identity in the named store.
  fn get(&self, store: &str, key: &RequestKey) -> Result<Option<CachedEntry>>;

  /// Store a response under a request identity, replacing any previous entry.
  fn put(&self, store: &str, key: &RequestKey, response: &StoredResponse) -> Result<()>;

  /// Store many entries at once; either all of them land or none do.
  fn put_all(&self, store: &str, entries: &[(RequestKey, StoredResponse)]) -> Result<()>;
}

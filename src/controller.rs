//! Cache lifecycle controller: install, activate, fetch.
//!
//! The controller owns one named, versioned cache store. Install precaches
//! the asset manifest all-or-nothing, activate purges stale store versions,
//! and fetch resolves every request cache-first with network fallback and
//! the offline shell as last resort.

use color_eyre::{eyre::eyre, Result};
use futures::future::try_join_all;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::config::CacheConfig;
use crate::net::AssetFetcher;
use crate::resource::{RequestKey, StoredResponse};
use crate::store::StoreBackend;

/// Lifecycle phase of one controller instance.
///
/// Transitions are guarded: signals arriving in the wrong phase are rejected
/// rather than reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
  Uninstalled,
  Installing,
  /// Precache complete. Install always requests immediate activation
  /// (skip-waiting), so drivers activate as soon as install returns.
  Installed,
  Active,
}

pub struct CacheController<S, F> {
  store: Arc<S>,
  fetcher: F,
  /// Versioned store name; doubles as the version identity for purging.
  version: String,
  manifest: Vec<String>,
  offline_shell: String,
  state: Mutex<LifecycleState>,
}

impl<S, F> CacheController<S, F>
where
  S: StoreBackend + 'static,
  F: AssetFetcher,
{
  pub fn new(store: S, fetcher: F, cache: &CacheConfig) -> Self {
    Self {
      store: Arc::new(store),
      fetcher,
      version: cache.version.clone(),
      manifest: cache.manifest.clone(),
      offline_shell: cache.offline_shell.clone(),
      state: Mutex::new(LifecycleState::Uninstalled),
    }
  }

  pub fn state(&self) -> LifecycleState {
    self
      .state
      .lock()
      .map_or(LifecycleState::Uninstalled, |s| *s)
  }

  /// Precache the asset manifest into the current version's store.
  ///
  /// All-or-nothing: every manifest URL must fetch with status 200 before
  /// anything is written. A failed install leaves the previous version in
  /// control and this controller back at `Uninstalled`.
  pub async fn handle_install(&self) -> Result<()> {
    self.transition(LifecycleState::Uninstalled, LifecycleState::Installing, "install")?;

    info!(version = %self.version, assets = self.manifest.len(), "installing");
    if let Err(e) = self.store.open(&self.version) {
      self.set_state(LifecycleState::Uninstalled);
      return Err(e);
    }

    let fetches = self.manifest.iter().map(|url| {
      let key = RequestKey::get(url);
      async move {
        let response = self.fetcher.fetch(&key).await?;
        if !response.is_ok() {
          return Err(eyre!(
            "Precache fetch for {} returned status {}",
            key.url(),
            response.status
          ));
        }
        Ok((key, response))
      }
    });

    let entries = match try_join_all(fetches).await {
      Ok(entries) => entries,
      Err(e) => {
        self.set_state(LifecycleState::Uninstalled);
        warn!(version = %self.version, error = %e, "install failed, previous version stays in control");
        return Err(e);
      }
    };

    if let Err(e) = self.store.put_all(&self.version, &entries) {
      self.set_state(LifecycleState::Uninstalled);
      return Err(e);
    }

    self.set_state(LifecycleState::Installed);
    info!(version = %self.version, "install complete, requesting immediate activation");
    Ok(())
  }

  /// Purge stale store versions and take control of fetch routing.
  ///
  /// A stale store that fails to delete is logged and skipped; it never
  /// blocks activation or the other deletions.
  pub async fn handle_activate(&self) -> Result<()> {
    self.expect_state(LifecycleState::Installed, "activate")?;

    for name in self.store.list_names()? {
      if name == self.version {
        continue;
      }
      match self.store.delete_store(&name) {
        Ok(_) => info!(store = %name, "purged stale store"),
        Err(e) => warn!(store = %name, error = %e, "failed to delete stale store"),
      }
    }

    self.set_state(LifecycleState::Active);
    info!(version = %self.version, "active, claiming all open clients");
    Ok(())
  }

  /// Resolve one intercepted request: cache first, then network, then the
  /// offline shell.
  ///
  /// A cache hit never touches the network. A status-200 network response
  /// is returned immediately while a copy is written to the store without
  /// blocking the caller; any other status passes through uncached. Only a
  /// missing offline shell lets a network error surface.
  pub async fn handle_fetch(&self, request: RequestKey) -> Result<StoredResponse> {
    self.expect_state(LifecycleState::Active, "fetch")?;

    if let Some(entry) = self.store.get(&self.version, &request)? {
      debug!(url = %request.url(), cached_at = %entry.cached_at, "cache hit");
      return Ok(entry.response);
    }

    debug!(url = %request.url(), "cache miss, going to network");
    match self.fetcher.fetch(&request).await {
      Ok(response) => {
        if response.is_ok() && !response.from_cache {
          // One copy goes back to the caller, one copy is persisted; the
          // write never blocks the returned response.
          let store = Arc::clone(&self.store);
          let version = self.version.clone();
          let copy = response.clone();
          let key = request.clone();
          tokio::spawn(async move {
            if let Err(e) = store.put(&version, &key, &copy) {
              warn!(url = %key.url(), error = %e, "runtime cache write failed");
            }
          });
        }
        Ok(response)
      }
      Err(net_err) => {
        let shell = RequestKey::get(&self.offline_shell);
        let shell_hit = match self.store.get(&self.version, &shell) {
          Ok(hit) => hit,
          Err(e) => {
            warn!(error = %e, "offline shell lookup failed");
            None
          }
        };

        match shell_hit {
          Some(entry) => {
            warn!(url = %request.url(), "network unreachable, serving offline shell");
            Ok(entry.response)
          }
          // The original network error surfaces only when the shell is
          // missing too.
          None => Err(net_err),
        }
      }
    }
  }

  /// Guarded transition into `next`; rejects the signal in any other phase.
  fn transition(&self, expected: LifecycleState, next: LifecycleState, signal: &str) -> Result<()> {
    let mut state = self
      .state
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    if *state != expected {
      return Err(eyre!("{} signal rejected in state {:?}", signal, *state));
    }

    *state = next;
    Ok(())
  }

  fn expect_state(&self, expected: LifecycleState, signal: &str) -> Result<()> {
    let state = self
      .state
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    if *state != expected {
      return Err(eyre!("{} signal rejected in state {:?}", signal, *state));
    }

    Ok(())
  }

  fn set_state(&self, next: LifecycleState) {
    if let Ok(mut state) = self.state.lock() {
      *state = next;
    }
  }
}

//! Lifecycle signal delivery, standing in for the hosting runtime.

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use crate::controller::CacheController;
use crate::net::AssetFetcher;
use crate::resource::{RequestKey, StoredResponse};
use crate::store::StoreBackend;

/// Lifecycle signals delivered to the controller.
///
/// Each signal carries a oneshot reply channel: the completion the handler
/// registers with the runtime so the runtime knows when that phase is done.
pub enum Signal {
  Install(oneshot::Sender<Result<()>>),
  Activate(oneshot::Sender<Result<()>>),
  Fetch(RequestKey, oneshot::Sender<Result<StoredResponse>>),
}

/// Sender half handed to whatever drives the controller.
#[derive(Clone)]
pub struct RuntimeHandle {
  tx: mpsc::UnboundedSender<Signal>,
}

impl RuntimeHandle {
  /// Deliver the install signal and wait for precache to complete.
  pub async fn install(&self) -> Result<()> {
    let (tx, rx) = oneshot::channel();
    self
      .tx
      .send(Signal::Install(tx))
      .map_err(|_| eyre!("Controller is gone"))?;
    rx.await.map_err(|_| eyre!("Install signal dropped"))?
  }

  /// Deliver the activate signal and wait for the purge to complete.
  pub async fn activate(&self) -> Result<()> {
    let (tx, rx) = oneshot::channel();
    self
      .tx
      .send(Signal::Activate(tx))
      .map_err(|_| eyre!("Controller is gone"))?;
    rx.await.map_err(|_| eyre!("Activate signal dropped"))?
  }

  /// Deliver one intercepted request and wait for its resolution.
  pub async fn fetch(&self, request: RequestKey) -> Result<StoredResponse> {
    let (tx, rx) = oneshot::channel();
    self
      .tx
      .send(Signal::Fetch(request, tx))
      .map_err(|_| eyre!("Controller is gone"))?;
    rx.await.map_err(|_| eyre!("Fetch signal dropped"))?
  }
}

/// Spawn the delivery loop for a controller, returning the handle used to
/// send it lifecycle signals.
///
/// Install and activate are handled in order on the loop itself; fetch
/// resolutions are independent and run on their own tasks so they may
/// interleave.
pub fn spawn<S, F>(controller: CacheController<S, F>) -> RuntimeHandle
where
  S: StoreBackend + 'static,
  F: AssetFetcher + 'static,
{
  let (tx, mut rx) = mpsc::unbounded_channel();
  let controller = Arc::new(controller);

  tokio::spawn(async move {
    while let Some(signal) = rx.recv().await {
      match signal {
        Signal::Install(done) => {
          let _ = done.send(controller.handle_install().await);
        }
        Signal::Activate(done) => {
          let _ = done.send(controller.handle_activate().await);
        }
        Signal::Fetch(request, done) => {
          let controller = Arc::clone(&controller);
          tokio::spawn(async move {
            let _ = done.send(controller.handle_fetch(request).await);
          });
        }
      }
    }
  });

  RuntimeHandle { tx }
}

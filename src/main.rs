mod config;
mod controller;
mod net;
mod resource;
mod signal;
mod store;

use clap::Parser;
use color_eyre::Result;
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use controller::CacheController;
use resource::RequestKey;
use store::{MemoryStore, SqliteStore, StoreBackend};

#[derive(Parser, Debug)]
#[command(name = "offshell")]
#[command(about = "Offline asset cache controller for a web game shell")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/offshell/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Resolve one URL through the active controller and print its body
  #[arg(short, long)]
  resolve: Option<String>,

  /// Keep the store in memory instead of on disk
  #[arg(long)]
  ephemeral: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .init();

  let args = Args::parse();
  let config = config::Config::load(args.config.as_deref())?;
  let fetcher = net::HttpFetcher::new(config.origin_url()?);

  if args.ephemeral {
    run(MemoryStore::default(), fetcher, &config, args.resolve).await
  } else {
    let store = match &config.store_path {
      Some(path) => SqliteStore::open_at(path)?,
      None => SqliteStore::open()?,
    };
    run(store, fetcher, &config, args.resolve).await
  }
}

/// Install, activate, then optionally resolve one request.
async fn run<S: StoreBackend + 'static>(
  store: S,
  fetcher: net::HttpFetcher,
  config: &config::Config,
  resolve: Option<String>,
) -> Result<()> {
  let controller = CacheController::new(store, fetcher, &config.cache);
  let runtime = signal::spawn(controller);

  runtime.install().await?;
  runtime.activate().await?;

  if let Some(url) = resolve {
    let response = runtime.fetch(RequestKey::get(&url)).await?;
    std::io::stdout().write_all(&response.body)?;
  }

  Ok(())
}

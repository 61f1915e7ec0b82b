//! Network side of the controller.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use url::Url;

use crate::resource::{RequestKey, StoredResponse};

/// Network interface the controller resolves cache misses through.
///
/// An `Err` means the network itself failed (connectivity, DNS); HTTP error
/// statuses come back as ordinary responses.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
  async fn fetch(&self, key: &RequestKey) -> Result<StoredResponse>;
}

/// Fetcher backed by reqwest, resolving manifest-relative URLs against the
/// configured origin.
pub struct HttpFetcher {
  client: reqwest::Client,
  origin: Url,
}

impl HttpFetcher {
  pub fn new(origin: Url) -> Self {
    Self {
      client: reqwest::Client::new(),
      origin,
    }
  }

  fn resolve(&self, url: &str) -> Result<Url> {
    self
      .origin
      .join(url)
      .map_err(|e| eyre!("Invalid asset URL {}: {}", url, e))
  }
}

#[async_trait]
impl AssetFetcher for HttpFetcher {
  async fn fetch(&self, key: &RequestKey) -> Result<StoredResponse> {
    let url = self.resolve(key.url())?;
    let method = reqwest::Method::from_bytes(key.method().as_bytes())
      .map_err(|e| eyre!("Invalid method {}: {}", key.method(), e))?;

    let response = self
      .client
      .request(method, url.clone())
      .send()
      .await
      .map_err(|e| eyre!("Request for {} failed: {}", url, e))?;

    let status = response.status().as_u16();
    let headers = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();

    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read body for {}: {}", url, e))?
      .to_vec();

    Ok(StoredResponse::new(status, headers, body))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_resolve_joins_relative_urls_against_origin() {
    let fetcher = HttpFetcher::new(Url::parse("https://game.example/shell/").unwrap());
    let resolved = fetcher.resolve("./assets/a.js").unwrap();
    assert_eq!(resolved.as_str(), "https://game.example/shell/assets/a.js");
  }

  #[test]
  fn test_resolve_keeps_absolute_urls() {
    let fetcher = HttpFetcher::new(Url::parse("https://game.example/").unwrap());
    let resolved = fetcher.resolve("https://cdn.example/lib.js").unwrap();
    assert_eq!(resolved.as_str(), "https://cdn.example/lib.js");
  }
}

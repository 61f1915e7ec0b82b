//! Request identities and stored responses.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Identity of a request for cache-matching purposes.
///
/// Two requests with the same method and normalized URL share a cache entry;
/// header variation is deliberately ignored. The normalization policy lives
/// entirely in [`RequestKey::new`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
  method: String,
  url: String,
}

impl RequestKey {
  pub fn new(method: &str, url: &str) -> Self {
    Self {
      method: method.trim().to_uppercase(),
      url: normalize_url(url),
    }
  }

  /// GET request for a URL, the common case for asset loads.
  pub fn get(url: &str) -> Self {
    Self::new("GET", url)
  }

  pub fn method(&self) -> &str {
    &self.method
  }

  pub fn url(&self) -> &str {
    &self.url
  }

  /// Stable fixed-length identity hash used as the storage key.
  pub fn identity_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.method.as_bytes());
    hasher.update(b" ");
    hasher.update(self.url.as_bytes());
    hex::encode(hasher.finalize())
  }
}

/// Normalize a URL for identity matching: trim whitespace, drop the fragment.
fn normalize_url(url: &str) -> String {
  let url = url.trim();
  match url.split_once('#') {
    Some((base, _)) => base.to_string(),
    None => url.to_string(),
  }
}

/// A response as held by a cache store: status, headers, body bytes.
///
/// Bodies are fully buffered, so serving one response to the caller while
/// persisting another copy is an explicit `clone` rather than a stream split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredResponse {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
  /// True when this response came out of a cache store rather than the
  /// network. Never persisted as true; stores set it on the way out.
  #[serde(skip)]
  pub from_cache: bool,
}

impl StoredResponse {
  pub fn new(status: u16, headers: Vec<(String, String)>, body: Vec<u8>) -> Self {
    Self {
      status,
      headers,
      body,
      from_cache: false,
    }
  }

  /// Whether this response is cacheable-successful (status exactly 200).
  pub fn is_ok(&self) -> bool {
    self.status == 200
  }

  /// First header value with the given name (case-insensitive).
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(n, _)| n.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_identity_ignores_method_case_and_whitespace() {
    let a = RequestKey::new("get", " ./a.js ");
    let b = RequestKey::new("GET", "./a.js");
    assert_eq!(a, b);
    assert_eq!(a.identity_hash(), b.identity_hash());
  }

  #[test]
  fn test_identity_ignores_fragment() {
    let a = RequestKey::get("./index.html#level-2");
    let b = RequestKey::get("./index.html");
    assert_eq!(a.identity_hash(), b.identity_hash());
  }

  #[test]
  fn test_identity_distinguishes_methods() {
    let get = RequestKey::new("GET", "./a.js");
    let head = RequestKey::new("HEAD", "./a.js");
    assert_ne!(get.identity_hash(), head.identity_hash());
  }

  #[test]
  fn test_identity_hash_is_fixed_length_hex() {
    let hash = RequestKey::get("./a.js").identity_hash();
    assert_eq!(hash.len(), 64);
    assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
  }

  #[test]
  fn test_header_lookup_is_case_insensitive() {
    let response = StoredResponse::new(
      200,
      vec![("Content-Type".to_string(), "text/html".to_string())],
      Vec::new(),
    );
    assert_eq!(response.header("content-type"), Some("text/html"));
    assert_eq!(response.header("etag"), None);
  }
}

//! Content cache for proxied webview resources.
//!
//! Only responses carrying an `ETag` are cached. On the next fetch of the
//! same path the validator is attached to the outgoing request, and a
//! not-modified answer from the host is served from here without shipping
//! the bytes across the message channel again.

use std::collections::HashMap;

use bytes::Bytes;
use tokio::sync::RwLock;

/// A cached resource body with its validator.
#[derive(Debug, Clone)]
pub struct CachedResource {
    pub body: Bytes,
    pub mime: Option<String>,
    pub etag: String,
}

/// Path-keyed resource cache for one webview.
pub struct ResourceCache {
    entries: RwLock<HashMap<String, CachedResource>>,
}

impl ResourceCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// The validator to send as a conditional header for `path`, if any.
    pub async fn validator(&self, path: &str) -> Option<String> {
        let entries = self.entries.read().await;
        entries.get(path).map(|cached| cached.etag.clone())
    }

    /// Get the cached copy of `path`.
    pub async fn get(&self, path: &str) -> Option<CachedResource> {
        let entries = self.entries.read().await;
        entries.get(path).cloned()
    }

    /// Store a response body under `path`. Replaces any previous entry.
    pub async fn insert(&self, path: &str, body: Bytes, mime: Option<String>, etag: String) {
        let mut entries = self.entries.write().await;
        entries.insert(path.to_string(), CachedResource { body, mime, etag });
    }

    /// Drop everything. Called when the webview navigates.
    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        entries.clear();
    }

    /// Number of cached resources.
    pub async fn len(&self) -> usize {
        let entries = self.entries.read().await;
        entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for ResourceCache {
    fn default() -> Self {
        Self::new()
    }
}

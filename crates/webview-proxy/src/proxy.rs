//! Proxy core: turns webview fetches into correlated host requests.
//!
//! One `WebviewProxy` serves one webview. It owns a `RequestStore` per
//! correlation channel (resource loads and localhost lookups), the content
//! cache, and the outbound half of the host message channel. The host
//! drives the inbound half by calling [`WebviewProxy::handle_host_response`]
//! for every message it receives from the window.

use std::time::Duration;

use bytes::Bytes;
use log::{debug, info, warn};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::cache::ResourceCache;
use crate::protocol::{HostRequest, HostResponse};
use crate::request_store::RequestStore;
use crate::resource::ResourceResponse;

/// A fetch issued by the webview, as seen by the proxy.
#[derive(Debug, Clone)]
pub struct ResourceRequest {
    pub method: String,
    pub scheme: String,
    pub authority: String,
    pub path: String,
    pub query: String,
}

impl ResourceRequest {
    /// A plain GET for `path` on the default resource authority.
    pub fn get(path: &str) -> Self {
        Self {
            method: "GET".to_string(),
            scheme: "webview-resource".to_string(),
            authority: "main".to_string(),
            path: path.to_string(),
            query: String::new(),
        }
    }
}

/// What the proxy answers a webview fetch with.
#[derive(Debug, Clone, PartialEq)]
pub enum ProxyReply {
    /// Resource bytes, either fresh from the host or revalidated from the
    /// cache.
    Payload {
        body: Bytes,
        mime: Option<String>,
        etag: Option<String>,
        from_cache: bool,
    },
    /// No data materialized: the host answered absent, the correlation
    /// expired, or a not-modified answer had no cached copy behind it.
    NotFound,
    /// Only GET and HEAD are proxied.
    MethodNotAllowed,
}

/// Error type for proxy operations.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Host message channel closed")]
    HostGone,
}

/// Resource proxy for a single webview.
pub struct WebviewProxy {
    webview_id: Uuid,
    resources: RequestStore<ResourceResponse>,
    localhost: RequestStore<Option<String>>,
    cache: ResourceCache,
    outbound: mpsc::Sender<HostRequest>,
}

impl WebviewProxy {
    /// Create a proxy that sends host requests on `outbound`.
    pub fn new(outbound: mpsc::Sender<HostRequest>) -> Self {
        Self {
            webview_id: Uuid::new_v4(),
            resources: RequestStore::new(),
            localhost: RequestStore::new(),
            cache: ResourceCache::new(),
            outbound,
        }
    }

    /// Create a proxy whose correlation entries expire after `timeout`.
    pub fn with_resolve_timeout(outbound: mpsc::Sender<HostRequest>, timeout: Duration) -> Self {
        Self {
            webview_id: Uuid::new_v4(),
            resources: RequestStore::with_timeout(timeout),
            localhost: RequestStore::with_timeout(timeout),
            cache: ResourceCache::new(),
            outbound,
        }
    }

    pub fn webview_id(&self) -> Uuid {
        self.webview_id
    }

    /// Proxy one webview fetch through the hosting window.
    ///
    /// Attaches the cache validator when the path was served before, and
    /// serves a not-modified answer from the cache. An expired correlation
    /// and an absent resource both come back as [`ProxyReply::NotFound`];
    /// only a closed host channel is an error.
    pub async fn fetch_resource(&self, request: ResourceRequest) -> Result<ProxyReply, ProxyError> {
        if request.method != "GET" && request.method != "HEAD" {
            return Ok(ProxyReply::MethodNotAllowed);
        }

        let if_none_match = self.cache.validator(&request.path).await;
        let (id, response) = self.resources.create();
        debug!(
            "[webview-proxy] {} resource request {} for {}",
            self.webview_id, id, request.path
        );

        let path = request.path;
        self.outbound
            .send(HostRequest::LoadResource {
                id,
                scheme: request.scheme,
                authority: request.authority,
                path: path.clone(),
                query: request.query,
                if_none_match,
            })
            .await
            .map_err(|_| ProxyError::HostGone)?;

        match response.await {
            Some(ResourceResponse::Payload { body, mime, etag }) => {
                if let Some(etag) = &etag {
                    self.cache
                        .insert(&path, body.clone(), mime.clone(), etag.clone())
                        .await;
                }
                Ok(ProxyReply::Payload {
                    body,
                    mime,
                    etag,
                    from_cache: false,
                })
            }
            Some(ResourceResponse::NotModified { mime }) => match self.cache.get(&path).await {
                Some(cached) => Ok(ProxyReply::Payload {
                    body: cached.body,
                    mime: mime.or(cached.mime),
                    etag: Some(cached.etag),
                    from_cache: true,
                }),
                None => {
                    warn!(
                        "[webview-proxy] {} got not-modified for {} with no cached copy",
                        self.webview_id, path
                    );
                    Ok(ProxyReply::NotFound)
                }
            },
            Some(ResourceResponse::Absent) => Ok(ProxyReply::NotFound),
            None => {
                info!(
                    "[webview-proxy] {} resource request {} for {} went unanswered",
                    self.webview_id, id, path
                );
                Ok(ProxyReply::NotFound)
            }
        }
    }

    /// Resolve a localhost origin to its mapped redirect target.
    ///
    /// Returns `None` when the host has no mapping or the correlation
    /// expired unanswered.
    pub async fn resolve_localhost(&self, origin: &str) -> Result<Option<String>, ProxyError> {
        let (id, response) = self.localhost.create();
        debug!(
            "[webview-proxy] {} localhost request {} for {}",
            self.webview_id, id, origin
        );

        self.outbound
            .send(HostRequest::LoadLocalhost {
                id,
                origin: origin.to_string(),
            })
            .await
            .map_err(|_| ProxyError::HostGone)?;

        Ok(response.await.flatten())
    }

    /// Feed one message from the hosting window into the correlation
    /// tables. A response for a request that is unknown, already resolved,
    /// or expired is logged and dropped.
    pub fn handle_host_response(&self, message: HostResponse) {
        let id = message.request_id();
        let delivered = match message {
            HostResponse::DidLoadResource { id, response } => self.resources.resolve(id, response),
            HostResponse::DidLoadLocalhost { id, location } => self.localhost.resolve(id, location),
        };
        if !delivered {
            warn!(
                "[webview-proxy] {} response for unknown request {}, dropping",
                self.webview_id, id
            );
        }
    }

    /// Drop all cached resources. Called when the webview navigates.
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
        info!("[webview-proxy] {} cache cleared", self.webview_id);
    }

    /// Outstanding correlations across both channels.
    pub fn pending_requests(&self) -> usize {
        self.resources.pending() + self.localhost.pending()
    }
}

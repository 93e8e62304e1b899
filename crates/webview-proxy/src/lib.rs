//! webview-proxy - Resource proxy between notebook webviews and the
//! hosting window.
//!
//! Embedded webviews cannot fetch notebook resources directly; every fetch
//! is forwarded to the hosting window over an asynchronous message channel
//! and the answer is correlated back by request id. This crate provides the
//! correlation table ([`request_store::RequestStore`]), the payload and
//! message types, a per-webview content cache with `ETag` revalidation, and
//! a loopback HTTP bridge that real webviews fetch from.

pub mod cache;
pub mod protocol;
pub mod proxy;
pub mod request_store;
pub mod resource;
pub mod server;

pub use proxy::{ProxyError, ProxyReply, ResourceRequest, WebviewProxy};
pub use request_store::{RequestId, RequestStore, ResponseFuture};
pub use resource::ResourceResponse;

//! Payload types for proxied webview resources.
//!
//! Resource bodies cross the host message channel as base64 strings inside
//! JSON; everything else is plain tagged JSON. The response shape is a sum
//! type so the proxy dispatches by match instead of field sniffing.

use base64::prelude::*;
use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Outcome of asking the hosting window for a webview resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResourceResponse {
    /// The host produced the resource bytes.
    Payload {
        #[serde(
            serialize_with = "serialize_body",
            deserialize_with = "deserialize_body"
        )]
        body: Bytes,
        mime: Option<String>,
        /// Cache validator; responses without one are never cached.
        etag: Option<String>,
    },
    /// The webview's cached copy is still current.
    NotModified { mime: Option<String> },
    /// The host has no such resource, or access to it was denied.
    Absent,
}

/// Serialize a resource body as a base64-encoded string.
pub fn serialize_body<S>(data: &Bytes, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    BASE64_STANDARD.encode(data).serialize(serializer)
}

/// Deserialize a base64-encoded resource body into Bytes.
///
/// A `null` or missing body is treated as empty.
pub fn deserialize_body<'de, D>(deserializer: D) -> Result<Bytes, D::Error>
where
    D: Deserializer<'de>,
{
    let encoded: Option<String> = Option::deserialize(deserializer)?;
    match encoded {
        Some(s) => BASE64_STANDARD
            .decode(s)
            .map(Bytes::from)
            .map_err(serde::de::Error::custom),
        None => Ok(Bytes::new()),
    }
}

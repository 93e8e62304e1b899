//! Message schema between the proxy worker and the hosting window.
//!
//! Messages are serialized as tagged JSON and exchanged over the window's
//! message channel. Every request embeds a correlation id allocated by a
//! `RequestStore`; the matching response carries the same id back.

use serde::{Deserialize, Serialize};

use crate::request_store::RequestId;
use crate::resource::ResourceResponse;

/// Requests the proxy sends to the hosting window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostRequest {
    /// Resolve a webview resource against the host's resource roots.
    LoadResource {
        id: RequestId,
        scheme: String,
        authority: String,
        path: String,
        query: String,
        /// Cache validator for the webview's copy, when one exists.
        if_none_match: Option<String>,
    },
    /// Resolve a localhost origin to its mapped redirect target.
    LoadLocalhost { id: RequestId, origin: String },
}

/// Responses the hosting window sends back to the proxy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostResponse {
    DidLoadResource {
        id: RequestId,
        response: ResourceResponse,
    },
    DidLoadLocalhost {
        id: RequestId,
        /// Mapped origin to redirect to; `None` when no mapping exists.
        location: Option<String>,
    },
}

impl HostResponse {
    /// The correlation id this response answers.
    pub fn request_id(&self) -> RequestId {
        match self {
            HostResponse::DidLoadResource { id, .. } => *id,
            HostResponse::DidLoadLocalhost { id, .. } => *id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_load_resource_wire_shape() {
        let msg = HostRequest::LoadResource {
            id: 7,
            scheme: "webview-resource".to_string(),
            authority: "main".to_string(),
            path: "/media/logo.png".to_string(),
            query: "".to_string(),
            if_none_match: Some("abc".to_string()),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"load_resource\""));
        assert!(json.contains("\"id\":7"));
        assert!(json.contains("\"if_none_match\":\"abc\""));

        let parsed: HostRequest = serde_json::from_str(&json).unwrap();
        match parsed {
            HostRequest::LoadResource { id, path, .. } => {
                assert_eq!(id, 7);
                assert_eq!(path, "/media/logo.png");
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_did_load_localhost_without_mapping() {
        let json = r#"{"type":"did_load_localhost","id":3,"location":null}"#;
        let parsed: HostResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.request_id(), 3);
        match parsed {
            HostResponse::DidLoadLocalhost { location, .. } => assert!(location.is_none()),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_did_load_resource_carries_payload() {
        let msg = HostResponse::DidLoadResource {
            id: 12,
            response: ResourceResponse::Payload {
                body: Bytes::from("data"),
                mime: Some("application/octet-stream".to_string()),
                etag: None,
            },
        };
        let json = serde_json::to_string(&msg).unwrap();
        let parsed: HostResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.request_id(), 12);
    }
}

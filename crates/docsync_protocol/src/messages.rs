//! Request and response bodies for the sync endpoints.
//!
//! All bodies are JSON with camelCase field names.

use crate::error::ProtocolResult;
use crate::Document;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Error code carried by a push rejected for a stale version.
pub const CONFLICT_CODE: &str = "CONFLICT";

/// HTTP status used for conflict responses.
pub const CONFLICT_STATUS: u16 = 409;

/// Metadata of the authoritative remote copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMeta {
    /// Monotonic document version, starting at 1 for the first push.
    pub version: u64,
    /// When this version was written.
    pub last_modified: DateTime<Utc>,
    /// Device that wrote this version.
    pub device_id: String,
    /// Hex SHA-256 of the stored document.
    pub checksum: String,
    /// Stored document size in bytes.
    pub size: u64,
}

/// Response of `GET /sync/{app}/meta`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaResponse {
    /// Whether the request succeeded.
    pub success: bool,
    /// Whether a remote document exists.
    pub exists: bool,
    /// Metadata of the current remote document.
    #[serde(default)]
    pub meta: Option<SyncMeta>,
    /// Versions retained in the server's history, newest first.
    #[serde(default)]
    pub available_versions: Vec<u64>,
}

impl MetaResponse {
    /// Response for an app with no remote document yet.
    pub fn missing() -> Self {
        Self {
            success: true,
            exists: false,
            meta: None,
            available_versions: Vec::new(),
        }
    }

    /// Response for an existing document.
    pub fn found(meta: SyncMeta, available_versions: Vec<u64>) -> Self {
        Self {
            success: true,
            exists: true,
            meta: Some(meta),
            available_versions,
        }
    }

    /// Returns the remote metadata if the document exists.
    pub fn remote(&self) -> Option<&SyncMeta> {
        if self.exists {
            self.meta.as_ref()
        } else {
            None
        }
    }
}

/// Response of `GET /sync/{app}/pull`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResponse {
    /// Whether the request succeeded.
    pub success: bool,
    /// The full remote document.
    pub data: Document,
    /// Metadata of the returned document.
    pub meta: SyncMeta,
    /// Versions retained in the server's history, newest first.
    #[serde(default)]
    pub available_versions: Vec<u64>,
}

/// Body of `POST /sync/{app}/push`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    /// The full local document.
    pub data: Document,
    /// Device authoring this version.
    pub device_id: String,
    /// The version the client believes the server holds.
    pub local_version: u64,
}

impl PushRequest {
    /// Creates a new push request.
    pub fn new(data: Document, device_id: impl Into<String>, local_version: u64) -> Self {
        Self {
            data,
            device_id: device_id.into(),
            local_version,
        }
    }
}

/// Successful push response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResponse {
    /// Whether the push was accepted.
    pub success: bool,
    /// Version assigned by the server.
    pub version: u64,
    /// Hex SHA-256 of the stored document.
    pub checksum: String,
    /// Server write time.
    pub timestamp: DateTime<Utc>,
}

/// Push rejected because the client's version is stale (HTTP 409).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictResponse {
    /// Human-readable message.
    pub error: String,
    /// Always [`CONFLICT_CODE`].
    pub code: String,
    /// Version the client sent.
    pub local_version: u64,
    /// Server's current version.
    pub server_version: u64,
    /// When the server copy was last written.
    pub server_modified: DateTime<Utc>,
    /// Device that wrote the server copy.
    pub server_device_id: String,
}

impl ConflictResponse {
    /// Returns true if the code marks an optimistic-concurrency rejection.
    pub fn is_conflict(&self) -> bool {
        self.code == CONFLICT_CODE
    }
}

/// Generic error body for non-conflict failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable message.
    pub error: String,
    /// Optional machine-readable code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorResponse {
    /// Creates an error body.
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: None,
        }
    }

    /// Attaches a code.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// Encodes a body to JSON bytes.
pub fn encode<T: Serialize>(value: &T) -> ProtocolResult<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

/// Decodes a body from JSON bytes.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> ProtocolResult<T> {
    Ok(serde_json::from_slice(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_meta() -> SyncMeta {
        SyncMeta {
            version: 5,
            last_modified: "2024-03-01T12:00:00Z".parse().unwrap(),
            device_id: "phone".into(),
            checksum: "abc123".into(),
            size: 42,
        }
    }

    #[test]
    fn meta_uses_camel_case() {
        let value = serde_json::to_value(sample_meta()).unwrap();
        assert_eq!(value["lastModified"], "2024-03-01T12:00:00Z");
        assert_eq!(value["deviceId"], "phone");
    }

    #[test]
    fn meta_response_missing_document() {
        let body = br#"{"success":true,"exists":false,"meta":null,"availableVersions":[]}"#;
        let response: MetaResponse = decode(body).unwrap();
        assert!(!response.exists);
        assert!(response.remote().is_none());
    }

    #[test]
    fn meta_response_tolerates_absent_optional_fields() {
        let body = br#"{"success":true,"exists":false}"#;
        let response: MetaResponse = decode(body).unwrap();
        assert!(response.available_versions.is_empty());
    }

    #[test]
    fn push_request_wire_shape() {
        let request = PushRequest::new(json!({"tasks": []}), "device-1", 3);
        let value: serde_json::Value = serde_json::from_slice(&encode(&request).unwrap()).unwrap();
        assert_eq!(value["deviceId"], "device-1");
        assert_eq!(value["localVersion"], 3);
        assert_eq!(value["data"], json!({"tasks": []}));
    }

    #[test]
    fn conflict_response_from_server_body() {
        let body = json!({
            "error": "version conflict",
            "code": "CONFLICT",
            "localVersion": 4,
            "serverVersion": 6,
            "serverModified": "2024-03-01T12:00:00Z",
            "serverDeviceId": "desktop"
        });
        let response: ConflictResponse = serde_json::from_value(body).unwrap();
        assert!(response.is_conflict());
        assert_eq!(response.server_version, 6);
    }

    #[test]
    fn malformed_body_is_an_error() {
        let result: ProtocolResult<PushResponse> = decode(b"{\"success\":true}");
        assert!(result.is_err());
    }
}

//! Dataset identifiers.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies which dataset is being synced.
///
/// One engine instance exists per app per device. The name is embedded in
/// request paths (`/sync/{app}/...`) and storage keys, so it is restricted
/// to ASCII alphanumerics, `-` and `_`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SyncApp(String);

impl SyncApp {
    /// Creates an app identifier, validating the name.
    pub fn new(name: impl Into<String>) -> ProtocolResult<Self> {
        let name = name.into();
        let valid = !name.is_empty()
            && name
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if valid {
            Ok(Self(name))
        } else {
            Err(ProtocolError::InvalidApp(name))
        }
    }

    /// Returns the app name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Storage key for a per-app record, e.g. `docsync:tasks:meta`.
    pub fn storage_key(&self, record: &str) -> String {
        format!("docsync:{}:{}", self.0, record)
    }

    /// Request path for an endpoint, e.g. `/sync/tasks/pull`.
    pub fn endpoint(&self, endpoint: &str) -> String {
        format!("/sync/{}/{}", self.0, endpoint)
    }
}

impl fmt::Display for SyncApp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SyncApp {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SyncApp> for String {
    fn from(app: SyncApp) -> Self {
        app.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_names() {
        assert!(SyncApp::new("tasks").is_ok());
        assert!(SyncApp::new("resume-builder_v2").is_ok());
    }

    #[test]
    fn invalid_names() {
        assert!(SyncApp::new("").is_err());
        assert!(SyncApp::new("../etc").is_err());
        assert!(SyncApp::new("with space").is_err());
    }

    #[test]
    fn keys_and_paths() {
        let app = SyncApp::new("tasks").unwrap();
        assert_eq!(app.storage_key("meta"), "docsync:tasks:meta");
        assert_eq!(app.endpoint("push"), "/sync/tasks/push");
    }

    #[test]
    fn deserialize_rejects_bad_name() {
        let result: Result<SyncApp, _> = serde_json::from_str("\"a/b\"");
        assert!(result.is_err());
    }
}

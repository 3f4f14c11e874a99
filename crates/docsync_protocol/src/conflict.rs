//! Conflict description and resolution choices.

use crate::messages::ConflictResponse;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A version conflict detected on push.
///
/// Another device pushed after our last pull, so the version we sent no
/// longer matches the server's. Exists only until it is resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConflict {
    /// The version this client pushed against.
    pub local_version: u64,
    /// The server's current version.
    pub server_version: u64,
    /// When the local copy was last synced, if ever.
    pub local_modified: Option<DateTime<Utc>>,
    /// When the server copy was last written.
    pub server_modified: DateTime<Utc>,
    /// Device that wrote the server copy.
    pub server_device_id: String,
}

impl SyncConflict {
    /// Builds a conflict from the server's rejection.
    pub fn from_response(response: &ConflictResponse, local_modified: Option<DateTime<Utc>>) -> Self {
        Self {
            local_version: response.local_version,
            server_version: response.server_version,
            local_modified,
            server_modified: response.server_modified,
            server_device_id: response.server_device_id.clone(),
        }
    }

    /// Number of versions the server is ahead of us.
    pub fn versions_behind(&self) -> u64 {
        self.server_version.saturating_sub(self.local_version)
    }
}

/// How a conflict should be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictChoice {
    /// Keep the local document and overwrite the server copy.
    Local,
    /// Discard local changes and take the server copy.
    Remote,
}

impl fmt::Display for ConflictChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictChoice::Local => f.write_str("local"),
            ConflictChoice::Remote => f.write_str("remote"),
        }
    }
}

impl FromStr for ConflictChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(ConflictChoice::Local),
            "remote" => Ok(ConflictChoice::Remote),
            other => Err(format!("unknown conflict choice: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::CONFLICT_CODE;

    #[test]
    fn conflict_from_response() {
        let response = ConflictResponse {
            error: "version conflict".into(),
            code: CONFLICT_CODE.into(),
            local_version: 4,
            server_version: 6,
            server_modified: Utc::now(),
            server_device_id: "laptop".into(),
        };

        let conflict = SyncConflict::from_response(&response, None);
        assert_eq!(conflict.local_version, 4);
        assert_eq!(conflict.server_version, 6);
        assert_eq!(conflict.versions_behind(), 2);
        assert_eq!(conflict.server_device_id, "laptop");
    }

    #[test]
    fn choice_parsing() {
        assert_eq!("local".parse::<ConflictChoice>(), Ok(ConflictChoice::Local));
        assert_eq!("remote".parse::<ConflictChoice>(), Ok(ConflictChoice::Remote));
        assert!("both".parse::<ConflictChoice>().is_err());
        assert_eq!(ConflictChoice::Remote.to_string(), "remote");
    }
}

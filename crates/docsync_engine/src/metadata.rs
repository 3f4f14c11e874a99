//! Persisted `(version, lastModified)` pair per app.

use crate::error::{SyncError, SyncResult};
use crate::storage::KeyValueStore;
use chrono::{DateTime, Utc};
use docsync_protocol::SyncApp;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const META_RECORD: &str = "meta";

/// The last version this device synced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalMeta {
    /// Last server-confirmed version.
    pub version: u64,
    /// When that version was written.
    pub last_modified: DateTime<Utc>,
}

/// Stores one [`LocalMeta`] record per app.
#[derive(Clone)]
pub struct LocalMetadataStore {
    store: Arc<dyn KeyValueStore>,
}

impl LocalMetadataStore {
    /// Creates a metadata store over `store`.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Returns the last saved record, if any.
    ///
    /// An unreadable or corrupt record reads as `None`.
    pub fn get_local(&self, app: &SyncApp) -> Option<LocalMeta> {
        let raw = match self.store.get(&app.storage_key(META_RECORD)) {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(app = %app, error = %e, "local metadata unreadable");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(meta) => Some(meta),
            Err(e) => {
                tracing::warn!(app = %app, error = %e, "local metadata corrupt, ignoring");
                None
            }
        }
    }

    /// Overwrites the record for `app`.
    pub fn save_local(
        &self,
        app: &SyncApp,
        version: u64,
        last_modified: DateTime<Utc>,
    ) -> SyncResult<()> {
        let meta = LocalMeta {
            version,
            last_modified,
        };
        let raw = serde_json::to_string(&meta).map_err(|e| SyncError::Persistence(e.to_string()))?;
        self.store.set(&app.storage_key(META_RECORD), &raw)
    }
}

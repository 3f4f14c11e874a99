//! Versioned document storage.

use chrono::Utc;
use docsync_protocol::{ConflictResponse, Document, PushRequest, PushResponse, SyncApp, SyncMeta, CONFLICT_CODE};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};

/// One stored version of a document.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    /// Document body.
    pub data: Document,
    /// Version metadata.
    pub meta: SyncMeta,
}

/// Result of applying a push.
#[derive(Debug, Clone, PartialEq)]
pub enum PushResult {
    /// Stored under a new version.
    Stored(PushResponse),
    /// Rejected: the client pushed against a stale version.
    Conflict(ConflictResponse),
}

/// In-memory store of one document per app with bounded history.
///
/// Versions start at 1. A push is accepted only when its `localVersion`
/// equals the current version (0 when nothing is stored yet).
pub struct DocumentStore {
    apps: RwLock<HashMap<SyncApp, VecDeque<StoredDocument>>>,
    history_limit: usize,
}

impl DocumentStore {
    /// Creates a store keeping at most `history_limit` versions per app.
    pub fn new(history_limit: usize) -> Self {
        Self {
            apps: RwLock::new(HashMap::new()),
            history_limit: history_limit.max(1),
        }
    }

    /// Current document of `app`.
    pub fn current(&self, app: &SyncApp) -> Option<StoredDocument> {
        self.apps.read().get(app).and_then(|h| h.front().cloned())
    }

    /// Current version of `app`, 0 if nothing is stored.
    pub fn version(&self, app: &SyncApp) -> u64 {
        self.apps
            .read()
            .get(app)
            .and_then(|h| h.front())
            .map(|d| d.meta.version)
            .unwrap_or(0)
    }

    /// A retained version of `app`.
    pub fn get_version(&self, app: &SyncApp, version: u64) -> Option<StoredDocument> {
        self.apps
            .read()
            .get(app)
            .and_then(|h| h.iter().find(|d| d.meta.version == version).cloned())
    }

    /// Retained versions of `app`, newest first.
    pub fn available_versions(&self, app: &SyncApp) -> Vec<u64> {
        self.apps
            .read()
            .get(app)
            .map(|h| h.iter().map(|d| d.meta.version).collect())
            .unwrap_or_default()
    }

    /// Applies a push with an optimistic version check.
    pub fn push(&self, app: &SyncApp, request: PushRequest) -> PushResult {
        let mut apps = self.apps.write();
        let history = apps.entry(app.clone()).or_default();

        if let Some(current) = history.front() {
            if current.meta.version != request.local_version {
                return PushResult::Conflict(ConflictResponse {
                    error: format!(
                        "version conflict: pushed against {}, server has {}",
                        request.local_version, current.meta.version
                    ),
                    code: CONFLICT_CODE.into(),
                    local_version: request.local_version,
                    server_version: current.meta.version,
                    server_modified: current.meta.last_modified,
                    server_device_id: current.meta.device_id.clone(),
                });
            }
        } else if request.local_version != 0 {
            return PushResult::Conflict(ConflictResponse {
                error: format!(
                    "version conflict: pushed against {}, server has nothing",
                    request.local_version
                ),
                code: CONFLICT_CODE.into(),
                local_version: request.local_version,
                server_version: 0,
                server_modified: Utc::now(),
                server_device_id: String::new(),
            });
        }

        let bytes = canonical_bytes(&request.data);
        let meta = SyncMeta {
            version: request.local_version + 1,
            last_modified: Utc::now(),
            device_id: request.device_id,
            checksum: checksum(&bytes),
            size: bytes.len() as u64,
        };
        let response = PushResponse {
            success: true,
            version: meta.version,
            checksum: meta.checksum.clone(),
            timestamp: meta.last_modified,
        };

        history.push_front(StoredDocument {
            data: request.data,
            meta,
        });
        history.truncate(self.history_limit);
        PushResult::Stored(response)
    }
}

/// Serialized form used for size and checksum. Object keys are sorted.
pub fn canonical_bytes(document: &Document) -> Vec<u8> {
    serde_json::to_vec(document).unwrap_or_default()
}

/// Hex SHA-256 of `bytes`.
pub fn checksum(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn app() -> SyncApp {
        SyncApp::new("tasks").unwrap()
    }

    fn push(store: &DocumentStore, data: Document, local_version: u64) -> PushResult {
        store.push(&app(), PushRequest::new(data, "device-1", local_version))
    }

    #[test]
    fn first_push_creates_version_one() {
        let store = DocumentStore::new(10);
        assert_eq!(store.version(&app()), 0);

        let PushResult::Stored(response) = push(&store, json!({"a": 1}), 0) else {
            panic!("expected store");
        };
        assert_eq!(response.version, 1);
        assert_eq!(response.checksum.len(), 64);

        let current = store.current(&app()).unwrap();
        assert_eq!(current.data, json!({"a": 1}));
        assert_eq!(current.meta.device_id, "device-1");
        assert_eq!(current.meta.size, br#"{"a":1}"#.len() as u64);
    }

    #[test]
    fn first_push_must_start_at_zero() {
        let store = DocumentStore::new(10);
        let PushResult::Conflict(conflict) = push(&store, json!({}), 3) else {
            panic!("expected conflict");
        };
        assert_eq!(conflict.server_version, 0);
        assert!(store.current(&app()).is_none());
    }

    #[test]
    fn stale_push_conflicts() {
        let store = DocumentStore::new(10);
        push(&store, json!({"v": 1}), 0);
        push(&store, json!({"v": 2}), 1);

        let PushResult::Conflict(conflict) = push(&store, json!({"v": "stale"}), 1) else {
            panic!("expected conflict");
        };
        assert_eq!(conflict.code, CONFLICT_CODE);
        assert_eq!(conflict.local_version, 1);
        assert_eq!(conflict.server_version, 2);
        assert_eq!(conflict.server_device_id, "device-1");
        assert_eq!(store.current(&app()).unwrap().data, json!({"v": 2}));
    }

    #[test]
    fn history_is_bounded_newest_first() {
        let store = DocumentStore::new(3);
        for v in 0..5 {
            push(&store, json!({ "v": v }), v);
        }
        assert_eq!(store.available_versions(&app()), vec![5, 4, 3]);
        assert_eq!(store.get_version(&app(), 4).unwrap().data, json!({"v": 3}));
        assert!(store.get_version(&app(), 1).is_none());
    }

    #[test]
    fn checksum_ignores_key_order() {
        let a = canonical_bytes(&json!({"a": 1, "b": 2}));
        let b = canonical_bytes(&json!({"b": 2, "a": 1}));
        assert_eq!(checksum(&a), checksum(&b));
    }
}

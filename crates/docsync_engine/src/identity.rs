//! Stable per-app device identifiers.

use crate::storage::KeyValueStore;
use docsync_protocol::SyncApp;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

const DEVICE_RECORD: &str = "device";

/// Generates and persists one device id per app.
///
/// The id is created on first use and never regenerated. If the store
/// cannot be read or written, a fresh id is kept in memory for the rest of
/// the process instead (reported by [`DeviceIdentity::is_ephemeral`]).
pub struct DeviceIdentity {
    store: Arc<dyn KeyValueStore>,
    cache: Mutex<HashMap<SyncApp, CachedId>>,
}

#[derive(Clone)]
struct CachedId {
    id: String,
    persisted: bool,
}

impl DeviceIdentity {
    /// Creates an identity source over `store`.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the device id for `app`, creating it on first call.
    pub fn device_id(&self, app: &SyncApp) -> String {
        let mut cache = self.cache.lock();
        if let Some(cached) = cache.get(app) {
            return cached.id.clone();
        }

        let cached = self.load_or_create(app);
        cache.insert(app.clone(), cached.clone());
        cached.id
    }

    /// Returns true if the id for `app` only lives in memory.
    pub fn is_ephemeral(&self, app: &SyncApp) -> bool {
        self.cache
            .lock()
            .get(app)
            .map(|cached| !cached.persisted)
            .unwrap_or(false)
    }

    fn load_or_create(&self, app: &SyncApp) -> CachedId {
        let key = app.storage_key(DEVICE_RECORD);
        match self.store.get(&key) {
            Ok(Some(id)) if !id.trim().is_empty() => {
                return CachedId {
                    id: id.trim().to_string(),
                    persisted: true,
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(app = %app, error = %e, "device id unreadable, using ephemeral id");
                return CachedId {
                    id: Uuid::new_v4().to_string(),
                    persisted: false,
                };
            }
        }

        let id = Uuid::new_v4().to_string();
        let persisted = match self.store.set(&key, &id) {
            Ok(()) => {
                tracing::debug!(app = %app, device_id = %id, "generated device id");
                true
            }
            Err(e) => {
                tracing::warn!(app = %app, error = %e, "device id not persisted, using ephemeral id");
                false
            }
        };
        CachedId { id, persisted }
    }
}

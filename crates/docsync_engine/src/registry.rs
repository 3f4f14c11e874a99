//! Per-app engine registry.

use crate::engine::SyncEngine;
use docsync_protocol::SyncApp;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Holds at most one engine per app.
///
/// Hosts that open several views on the same dataset share one engine
/// through the registry instead of racing two against the server.
#[derive(Default)]
pub struct EngineRegistry {
    engines: Mutex<HashMap<SyncApp, SyncEngine>>,
}

impl EngineRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the engine for `app`, building it with `factory` if absent.
    pub fn get_or_create(&self, app: &SyncApp, factory: impl FnOnce() -> SyncEngine) -> SyncEngine {
        self.engines
            .lock()
            .entry(app.clone())
            .or_insert_with(|| {
                tracing::debug!(app = %app, "registering sync engine");
                factory()
            })
            .clone()
    }

    /// Returns the engine for `app`, if registered.
    pub fn get(&self, app: &SyncApp) -> Option<SyncEngine> {
        self.engines.lock().get(app).cloned()
    }

    /// Destroys and forgets the engine for `app`. Returns true if one existed.
    pub fn dispose(&self, app: &SyncApp) -> bool {
        let removed = self.engines.lock().remove(app);
        match removed {
            Some(engine) => {
                engine.destroy();
                true
            }
            None => false,
        }
    }

    /// Destroys every registered engine.
    pub fn dispose_all(&self) {
        let engines: Vec<SyncEngine> = self.engines.lock().drain().map(|(_, e)| e).collect();
        for engine in engines {
            engine.destroy();
        }
    }

    /// Number of registered engines.
    pub fn len(&self) -> usize {
        self.engines.lock().len()
    }

    /// Returns true if no engine is registered.
    pub fn is_empty(&self) -> bool {
        self.engines.lock().is_empty()
    }
}

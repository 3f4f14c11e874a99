//! CLI command implementations.

pub mod run;
pub mod status;
pub mod sync;

use crate::file_adapter::JsonFileAdapter;
use docsync_engine::{
    AppLock, FileStore, HttpTransport, ReqwestClient, SyncApp, SyncConfig, SyncEngine,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Connection settings shared by every command.
#[derive(Debug, Clone)]
pub struct Connection {
    /// Server base URL.
    pub server: String,
    /// Synced app.
    pub app: SyncApp,
    /// Directory for the device id, local metadata and lock file.
    pub state_dir: PathBuf,
    /// Bearer token, if signed in.
    pub token: Option<String>,
}

/// HTTP transport used by the CLI.
pub type Transport = HttpTransport<ReqwestClient>;

impl Connection {
    /// Builds the HTTP transport.
    pub fn transport(&self) -> Arc<Transport> {
        Arc::new(HttpTransport::new(self.server.clone(), ReqwestClient::new()))
    }

    /// Opens the state directory and takes the per-app lock.
    pub fn open_store(&self) -> Result<(FileStore, AppLock), Box<dyn std::error::Error>> {
        let store = FileStore::open(&self.state_dir)?;
        let lock = store.lock_app(&self.app)?;
        Ok((store, lock))
    }
}

/// A live engine over a JSON file, holding the app lock.
pub struct Session {
    /// The engine.
    pub engine: SyncEngine,
    /// The synced file.
    pub adapter: Arc<JsonFileAdapter>,
    _lock: AppLock,
}

impl Session {
    /// Opens a session for `file`.
    pub fn open(
        connection: &Connection,
        file: &Path,
        config: SyncConfig,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let (store, lock) = connection.open_store()?;
        let adapter = Arc::new(JsonFileAdapter::new(file));

        let mut builder = SyncEngine::builder(
            connection.app.clone(),
            connection.transport(),
            Arc::clone(&adapter),
        )
        .with_config(config)
        .with_store(Arc::new(store));
        if let Some(token) = &connection.token {
            builder = builder.with_token(token.clone());
        } else {
            tracing::warn!("no token configured, nothing will be synced");
        }

        Ok(Self {
            engine: builder.build(),
            adapter,
            _lock: lock,
        })
    }
}

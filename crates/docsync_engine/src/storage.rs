//! Key-value persistence backing device identity and local metadata.

use crate::error::{SyncError, SyncResult};
use docsync_protocol::SyncApp;
use fs2::FileExt;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// A string key-value store, one value per key.
///
/// Keys look like `docsync:{app}:{record}`.
pub trait KeyValueStore: Send + Sync {
    /// Reads a value.
    fn get(&self, key: &str) -> SyncResult<Option<String>>;

    /// Writes a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> SyncResult<()>;
}

/// A process-local store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> SyncResult<Option<String>> {
        Ok(self.values.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> SyncResult<()> {
        self.values.write().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// A directory-backed store with one file per key.
///
/// Writes go to a temporary file that is renamed into place, so a reader
/// never sees a half-written value.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Opens (and creates if missing) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> SyncResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| persistence(&dir, e))?;
        Ok(Self { dir })
    }

    /// Returns the store directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Takes the exclusive per-app lock, failing if another process holds it.
    ///
    /// The lock is released when the returned guard is dropped.
    pub fn lock_app(&self, app: &SyncApp) -> SyncResult<AppLock> {
        let path = self.dir.join(format!("{}.lock", app.as_str()));
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| persistence(&path, e))?;

        if file.try_lock_exclusive().is_err() {
            return Err(SyncError::Persistence(format!(
                "another engine for app '{app}' holds {}",
                path.display()
            )));
        }

        Ok(AppLock { _file: file, path })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '.' })
            .collect();
        self.dir.join(format!("{name}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> SyncResult<Option<String>> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(persistence(&path, e)),
        }
    }

    fn set(&self, key: &str, value: &str) -> SyncResult<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value).map_err(|e| persistence(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| persistence(&path, e))
    }
}

/// Exclusive lock guaranteeing one live engine per app across processes.
#[derive(Debug)]
pub struct AppLock {
    _file: File,
    path: PathBuf,
}

impl AppLock {
    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn persistence(path: &Path, err: std::io::Error) -> SyncError {
    SyncError::Persistence(format!("{}: {err}", path.display()))
}

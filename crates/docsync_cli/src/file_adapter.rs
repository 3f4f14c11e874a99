//! JSON file as the synced document.

use docsync_engine::{DataAdapter, Document, SyncError, SyncResult};
use parking_lot::Mutex;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Syncs the contents of one JSON file.
///
/// A missing file reads as `null`. Pulled documents are written
/// pretty-printed through a temporary file.
pub struct JsonFileAdapter {
    path: PathBuf,
    seen: Mutex<Option<SystemTime>>,
}

impl JsonFileAdapter {
    /// Creates an adapter for `path`. The current modification time counts
    /// as already seen.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let seen = modified(&path);
        Self {
            path,
            seen: Mutex::new(seen),
        }
    }

    /// The synced file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true if the file changed since the last call or the last
    /// pulled write.
    pub fn poll_change(&self) -> bool {
        let current = modified(&self.path);
        let mut seen = self.seen.lock();
        if *seen == current {
            return false;
        }
        *seen = current;
        true
    }
}

impl DataAdapter for JsonFileAdapter {
    type Document = Document;

    fn read(&self) -> SyncResult<Document> {
        match fs::read(&self.path) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Document::Null),
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| SyncError::Adapter(format!("{}: {e}", self.path.display()))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Document::Null),
            Err(e) => Err(SyncError::Adapter(format!("{}: {e}", self.path.display()))),
        }
    }

    fn write(&self, document: Document) -> SyncResult<()> {
        let bytes = serde_json::to_vec_pretty(&document)
            .map_err(|e| SyncError::Adapter(e.to_string()))?;
        let tmp = self.path.with_extension("docsync.tmp");
        fs::write(&tmp, bytes)
            .and_then(|()| fs::rename(&tmp, &self.path))
            .map_err(|e| SyncError::Adapter(format!("{}: {e}", self.path.display())))?;

        *self.seen.lock() = modified(&self.path);
        Ok(())
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

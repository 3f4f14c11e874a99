//! Data adapters connecting the engine to an application's document.

use crate::error::{SyncError, SyncResult};
use docsync_protocol::Document;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Reads and writes the application's whole document.
///
/// The engine is data-agnostic: it serializes whatever `read` returns and
/// hands pulled documents to `write` as a full overwrite.
pub trait DataAdapter: Send + Sync + 'static {
    /// The application's document type.
    type Document: Serialize + DeserializeOwned;

    /// Returns a snapshot of the current local document.
    fn read(&self) -> SyncResult<Self::Document>;

    /// Replaces the local document with a pulled remote one.
    fn write(&self, document: Self::Document) -> SyncResult<()>;
}

/// Object-safe view of a [`DataAdapter`] over JSON values.
pub(crate) trait DocumentAdapter: Send + Sync {
    fn read_document(&self) -> SyncResult<Document>;
    fn write_document(&self, document: Document) -> SyncResult<()>;
}

impl<A: DataAdapter> DocumentAdapter for A {
    fn read_document(&self) -> SyncResult<Document> {
        let document = self.read()?;
        serde_json::to_value(document).map_err(|e| SyncError::Adapter(e.to_string()))
    }

    fn write_document(&self, document: Document) -> SyncResult<()> {
        let document = serde_json::from_value(document)
            .map_err(|e| SyncError::Adapter(format!("remote document does not fit: {e}")))?;
        self.write(document)
    }
}

/// Returns true if a document carries nothing worth bootstrapping.
pub fn is_empty_document(document: &Document) -> bool {
    match document {
        Document::Null => true,
        Document::String(s) => s.is_empty(),
        Document::Array(items) => items.is_empty(),
        Document::Object(fields) => fields.is_empty(),
        _ => false,
    }
}

/// An in-memory adapter holding a JSON document.
#[derive(Debug)]
pub struct MemoryAdapter {
    document: RwLock<Document>,
    writes: AtomicUsize,
}

impl MemoryAdapter {
    /// Creates an adapter holding `document`.
    pub fn new(document: Document) -> Self {
        Self {
            document: RwLock::new(document),
            writes: AtomicUsize::new(0),
        }
    }

    /// Replaces the document, as a local edit would.
    pub fn set(&self, document: Document) {
        *self.document.write() = document;
    }

    /// Returns the current document.
    pub fn get(&self) -> Document {
        self.document.read().clone()
    }

    /// Number of remote documents written so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl Default for MemoryAdapter {
    fn default() -> Self {
        Self::new(Document::Null)
    }
}

impl DataAdapter for MemoryAdapter {
    type Document = Document;

    fn read(&self) -> SyncResult<Document> {
        Ok(self.get())
    }

    fn write(&self, document: Document) -> SyncResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.set(document);
        Ok(())
    }
}

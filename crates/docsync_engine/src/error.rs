//! Error types for the sync engine.

use docsync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
///
/// A version conflict is not an error: it is reported as
/// [`SyncOutcome::Conflict`](crate::SyncOutcome::Conflict).
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the next natural trigger may try again.
        retryable: bool,
    },

    /// Malformed request or response body.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The server rejected the bearer credential.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Non-2xx response other than a conflict.
    #[error("server error {status}: {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Error message from the response body.
        message: String,
    },

    /// Request timed out.
    #[error("operation timed out")]
    Timeout,

    /// No credential is available, so no request was made.
    #[error("not authenticated")]
    NotAuthenticated,

    /// Another push or pull is already in flight for this engine.
    #[error("a sync operation is already in progress")]
    InProgress,

    /// Conflict resolution requested without an outstanding conflict.
    #[error("no active conflict to resolve")]
    NoActiveConflict,

    /// The data adapter failed to read or write the document.
    #[error("data adapter error: {0}")]
    Adapter(String),

    /// Local metadata or device id could not be persisted.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Invalid app identifier.
    #[error("invalid app: {0}")]
    InvalidApp(String),
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if a later trigger may succeed without user action.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Timeout => true,
            SyncError::Server { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<ProtocolError> for SyncError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::InvalidApp(name) => SyncError::InvalidApp(name),
            ProtocolError::Json(e) => SyncError::Protocol(e.to_string()),
        }
    }
}

//! Error types for the protocol crate.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while validating or (de)serializing protocol values.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// An app name that cannot be embedded in a sync URL.
    #[error("invalid app name {0:?}: expected [A-Za-z0-9_-]+")]
    InvalidApp(String),

    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

//! Error types for the sync server.

use docsync_protocol::ErrorResponse;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the sync server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid request format.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Missing, malformed or expired token.
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// No document or route at this path.
    #[error("not found: {0}")]
    NotFound(String),

    /// Route exists, method does not.
    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),

    /// Document exceeds the configured size limit.
    #[error("document too large: {size} bytes (limit {limit})")]
    PayloadTooLarge {
        /// Serialized size.
        size: usize,
        /// Configured limit.
        limit: usize,
    },

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// Body was not valid JSON for the endpoint.
    #[error("malformed body: {0}")]
    Json(#[from] serde_json::Error),
}

impl ServerError {
    /// HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ServerError::InvalidRequest(_) | ServerError::Json(_) => 400,
            ServerError::NotAuthorized(_) => 401,
            ServerError::NotFound(_) => 404,
            ServerError::MethodNotAllowed(_) => 405,
            ServerError::PayloadTooLarge { .. } => 413,
            ServerError::Internal(_) => 500,
        }
    }

    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }

    /// Error body sent to the client.
    pub fn to_response(&self) -> ErrorResponse {
        let code = match self {
            ServerError::InvalidRequest(_) | ServerError::Json(_) => "INVALID_REQUEST",
            ServerError::NotAuthorized(_) => "UNAUTHORIZED",
            ServerError::NotFound(_) => "NOT_FOUND",
            ServerError::MethodNotAllowed(_) => "METHOD_NOT_ALLOWED",
            ServerError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            ServerError::Internal(_) => "INTERNAL",
        };
        ErrorResponse::new(self.to_string()).with_code(code)
    }
}

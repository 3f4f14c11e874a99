//! # DocSync Server
//!
//! Reference sync server for DocSync.
//!
//! This crate provides:
//! - Endpoint handlers (meta, pull, push) behind a single `route` entry point
//! - Versioned in-memory document store with bounded history
//! - Authentication (HMAC-SHA256 bearer tokens)
//! - Optimistic version checks with conflict responses
//!
//! # Authentication
//!
//! Authentication is optional but recommended for production:
//!
//! ```rust
//! use docsync_server::{ServerConfig, SyncServer};
//!
//! let config = ServerConfig::default().with_auth(b"my-secure-secret".to_vec());
//! let server = SyncServer::new(config);
//!
//! // Hand out tokens to clients
//! let token = server.issue_token("alice").unwrap();
//! assert_eq!(server.route("GET", "/sync/tasks/meta", Some(&token), &[]).status, 200);
//! ```
//!
//! # Protocol
//!
//! Each app holds one JSON document with a monotonic version:
//! 1. Client fetches meta to compare versions
//! 2. Client pulls the document when the server is ahead
//! 3. Client pushes with the version it is based on
//! 4. Server rejects stale pushes with 409 `CONFLICT`

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod auth;
mod config;
mod error;
mod handler;
mod server;
mod store;

pub use auth::{AuthConfig, TokenValidator};
pub use config::{ServerConfig, DEFAULT_HISTORY_LIMIT, DEFAULT_MAX_DOCUMENT_BYTES};
pub use error::{ServerError, ServerResult};
pub use handler::{HandlerContext, RequestHandler};
pub use server::{HttpReply, SyncServer};
pub use store::{canonical_bytes, checksum, DocumentStore, PushResult, StoredDocument};

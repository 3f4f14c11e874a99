//! # DocSync Protocol
//!
//! Wire types and JSON codec for the DocSync whole-document sync protocol.
//!
//! This crate provides:
//! - `SyncApp` for naming the dataset being synced
//! - `SyncMeta` describing the authoritative remote copy
//! - `SyncConflict` for optimistic-concurrency rejections
//! - Request/response bodies for the `/meta`, `/pull` and `/push` endpoints
//!
//! This is a pure protocol crate with no I/O operations.
//!
//! ## Endpoints
//!
//! | Method | Path | Response |
//! |---|---|---|
//! | `GET` | `/sync/{app}/meta` | [`MetaResponse`] |
//! | `GET` | `/sync/{app}/pull` | [`PullResponse`] |
//! | `POST` | `/sync/{app}/push` | [`PushResponse`] or [`ConflictResponse`] (409) |

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod app;
mod conflict;
mod error;
mod messages;

pub use app::SyncApp;
pub use conflict::{ConflictChoice, SyncConflict};
pub use error::{ProtocolError, ProtocolResult};
pub use messages::{
    decode, encode, ConflictResponse, ErrorResponse, MetaResponse, PullResponse, PushRequest,
    PushResponse, SyncMeta, CONFLICT_CODE, CONFLICT_STATUS,
};

/// A whole synced document. The protocol never looks inside it.
pub type Document = serde_json::Value;

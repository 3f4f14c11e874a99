//! # DocSync Engine
//!
//! Client-side engine that keeps one JSON document per app in step with a
//! DocSync server.
//!
//! This crate provides:
//! - Sync state machine (idle → syncing → idle/error/conflict, offline)
//! - Version reconciliation (bootstrap, pull, push, nothing)
//! - Debounced pushes and best-effort pushes on suspend/terminate
//! - Offline queue drained in order on reconnect
//! - Conflict detection and explicit resolution
//! - HTTP transport abstraction with an in-process loopback
//!
//! ## Architecture
//!
//! The engine follows an **optimistic whole-document** model:
//! 1. Every push carries the version it was based on
//! 2. The server rejects a push whose base version is stale
//! 3. A rejection halts automatic sync until the user picks a side
//!
//! ## Key Invariants
//!
//! - Local version only moves to a server-confirmed version
//! - One network operation per engine at a time
//! - No automatic merge and no automatic retry
//! - No credential, no network traffic

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod adapter;
mod config;
mod credentials;
mod debounce;
mod diagnostics;
mod engine;
mod error;
mod http;
mod identity;
mod lifecycle;
mod metadata;
mod poller;
mod queue;
mod reconcile;
mod registry;
#[cfg(feature = "reqwest")]
mod reqwest_client;
mod state;
mod storage;
mod transport;

pub use adapter::{is_empty_document, DataAdapter, MemoryAdapter};
pub use config::{SyncConfig, DEFAULT_DEBOUNCE, DEFAULT_POLL_INTERVAL};
pub use credentials::{CredentialProvider, StaticCredentials};
pub use debounce::Debouncer;
pub use diagnostics::{DebugSnapshot, DiagnosticEvent, Diagnostics, RecordingDiagnostics, TracingDiagnostics};
pub use engine::{BestEffort, Dispatch, EngineBuilder, ListenerId, SyncEngine, SyncOutcome};
pub use error::{SyncError, SyncResult};
pub use http::{HttpClient, HttpResponse, HttpTransport, LoopbackClient, LoopbackServer};
pub use identity::DeviceIdentity;
pub use lifecycle::{ChannelLifecycle, LifecycleEvent, LifecycleSignal};
pub use metadata::{LocalMeta, LocalMetadataStore};
pub use queue::{DrainReport, OfflineQueue, QueuedTask, TaskFuture};
pub use reconcile::{decide, ReconcileAction};
pub use registry::EngineRegistry;
#[cfg(feature = "reqwest")]
pub use reqwest_client::ReqwestClient;
pub use state::{SyncState, SyncStatus};
pub use storage::{AppLock, FileStore, KeyValueStore, MemoryStore};
pub use transport::{MockPush, MockTransport, PushOutcome, SyncTransport};

pub use docsync_protocol::{ConflictChoice, Document, SyncApp, SyncConflict};

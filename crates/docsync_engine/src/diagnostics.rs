//! Observer interface for engine internals.

use crate::state::{SyncState, SyncStatus};
use docsync_protocol::{ConflictChoice, SyncApp};
use parking_lot::Mutex;

/// Something observable happened inside an engine.
#[derive(Debug, Clone, PartialEq)]
pub enum DiagnosticEvent {
    /// The status changed.
    StatusChanged {
        /// Previous status.
        from: SyncStatus,
        /// New status.
        to: SyncStatus,
    },
    /// A push request is about to be sent.
    PushStarted {
        /// Version pushed against.
        local_version: u64,
    },
    /// The server accepted a push.
    PushCompleted {
        /// Server-confirmed version.
        version: u64,
    },
    /// A pull overwrote the local document.
    PullCompleted {
        /// Version now held locally.
        version: u64,
    },
    /// A push was rejected for a stale version.
    ConflictDetected {
        /// Version pushed against.
        local_version: u64,
        /// Server's current version.
        server_version: u64,
    },
    /// A conflict was resolved.
    ConflictResolved {
        /// The chosen side.
        choice: ConflictChoice,
    },
    /// A network operation failed.
    TransportError {
        /// Error message.
        message: String,
        /// Whether a later trigger may succeed without user action.
        retryable: bool,
    },
    /// An operation was deferred to the offline queue.
    Queued {
        /// Operation name.
        operation: &'static str,
        /// Queue length after enqueueing.
        queue_len: usize,
    },
    /// The offline queue was drained.
    QueueDrained {
        /// Tasks that succeeded.
        succeeded: usize,
        /// Tasks that failed.
        failed: usize,
    },
    /// A best-effort push was dispatched.
    BestEffortSent,
    /// Local metadata or the device id could not be persisted.
    PersistenceDegraded {
        /// Error message.
        message: String,
    },
    /// A state listener panicked.
    ListenerPanicked,
}

/// Receives engine diagnostics. Injected at construction.
pub trait Diagnostics: Send + Sync {
    /// Records one event.
    fn record(&self, app: &SyncApp, event: &DiagnosticEvent);
}

/// Logs every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn record(&self, app: &SyncApp, event: &DiagnosticEvent) {
        match event {
            DiagnosticEvent::StatusChanged { from, to } => {
                tracing::debug!(app = %app, %from, %to, "sync status changed");
            }
            DiagnosticEvent::PushStarted { local_version } => {
                tracing::debug!(app = %app, local_version, "push started");
            }
            DiagnosticEvent::PushCompleted { version } => {
                tracing::info!(app = %app, version, "push completed");
            }
            DiagnosticEvent::PullCompleted { version } => {
                tracing::info!(app = %app, version, "pull completed");
            }
            DiagnosticEvent::ConflictDetected {
                local_version,
                server_version,
            } => {
                tracing::info!(app = %app, local_version, server_version, "version conflict");
            }
            DiagnosticEvent::ConflictResolved { choice } => {
                tracing::info!(app = %app, %choice, "conflict resolved");
            }
            DiagnosticEvent::TransportError { message, retryable } => {
                tracing::error!(app = %app, error = %message, retryable, "sync failed");
            }
            DiagnosticEvent::Queued {
                operation,
                queue_len,
            } => {
                tracing::debug!(app = %app, operation, queue_len, "deferred while offline");
            }
            DiagnosticEvent::QueueDrained { succeeded, failed } => {
                tracing::info!(app = %app, succeeded, failed, "offline queue drained");
            }
            DiagnosticEvent::BestEffortSent => {
                tracing::debug!(app = %app, "best-effort push dispatched");
            }
            DiagnosticEvent::PersistenceDegraded { message } => {
                tracing::warn!(app = %app, error = %message, "running without persistence");
            }
            DiagnosticEvent::ListenerPanicked => {
                tracing::warn!(app = %app, "state listener panicked");
            }
        }
    }
}

/// Keeps events in memory, for tests and debug panels.
#[derive(Debug, Default)]
pub struct RecordingDiagnostics {
    events: Mutex<Vec<DiagnosticEvent>>,
}

impl RecordingDiagnostics {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every recorded event.
    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.events.lock().clone()
    }

    /// Returns true if an event matching `pred` was recorded.
    pub fn any(&self, pred: impl Fn(&DiagnosticEvent) -> bool) -> bool {
        self.events.lock().iter().any(pred)
    }
}

impl Diagnostics for RecordingDiagnostics {
    fn record(&self, _app: &SyncApp, event: &DiagnosticEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Point-in-time view of an engine for debugging.
#[derive(Debug, Clone)]
pub struct DebugSnapshot {
    /// The dataset.
    pub app: SyncApp,
    /// Device id used for pushes.
    pub device_id: String,
    /// Observable state.
    pub state: SyncState,
    /// Tasks waiting for connectivity.
    pub queue_len: usize,
    /// Whether a debounced push is armed.
    pub debounce_armed: bool,
    /// Whether the poller task is running.
    pub poller_running: bool,
    /// Whether a lifecycle listener is attached.
    pub lifecycle_attached: bool,
    /// Versions the server reported as retained, newest first.
    pub available_versions: Vec<u64>,
}

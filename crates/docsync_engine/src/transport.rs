//! Transport layer abstraction for sync operations.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use chrono::Utc;
use docsync_protocol::{
    ConflictResponse, Document, MetaResponse, PullResponse, PushRequest, PushResponse, SyncApp,
    SyncMeta, CONFLICT_CODE,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Result of a push that reached the server.
#[derive(Debug, Clone, PartialEq)]
pub enum PushOutcome {
    /// The server stored the document under a new version.
    Accepted(PushResponse),
    /// The server holds a newer version than the one we pushed against.
    Conflict(ConflictResponse),
}

/// A sync transport handles network communication with the sync server.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (HTTP, in-process loopback, mock for testing).
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Fetches metadata of the remote document.
    async fn fetch_meta(&self, app: &SyncApp, token: &str) -> SyncResult<MetaResponse>;

    /// Pulls the full remote document.
    async fn pull(&self, app: &SyncApp, token: &str) -> SyncResult<PullResponse>;

    /// Pushes the full local document with an optimistic version check.
    async fn push(
        &self,
        app: &SyncApp,
        token: &str,
        request: &PushRequest,
    ) -> SyncResult<PushOutcome>;
}

/// Scripted reply for the next push made to a [`MockTransport`].
#[derive(Debug, Clone)]
pub enum MockPush {
    /// Accept and assign this version.
    Accept(u64),
    /// Reject with a conflict at this server version.
    Conflict {
        /// Server version reported in the rejection.
        server_version: u64,
        /// Device reported as the server copy's author.
        server_device_id: String,
    },
    /// Fail with a transport error.
    Fail(String),
}

/// A mock transport for testing.
///
/// Without scripting it behaves like a tiny server: pushes against the
/// current version are accepted and bump it, stale pushes conflict.
#[derive(Debug, Default)]
pub struct MockTransport {
    remote: Mutex<Option<(Document, SyncMeta)>>,
    push_script: Mutex<VecDeque<MockPush>>,
    pushes: Mutex<Vec<PushRequest>>,
    meta_calls: AtomicUsize,
    pull_calls: AtomicUsize,
    failing: AtomicBool,
    latency: Mutex<Option<Duration>>,
}

impl MockTransport {
    /// Creates a mock with no remote document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the remote document and its version.
    pub fn set_remote(&self, data: Document, version: u64, device_id: &str) {
        let meta = SyncMeta {
            version,
            last_modified: Utc::now(),
            device_id: device_id.to_string(),
            checksum: format!("mock-{version}"),
            size: data.to_string().len() as u64,
        };
        *self.remote.lock() = Some((data, meta));
    }

    /// Returns the remote document, if any.
    pub fn remote_data(&self) -> Option<Document> {
        self.remote.lock().as_ref().map(|(data, _)| data.clone())
    }

    /// Returns the remote version, if any.
    pub fn remote_version(&self) -> Option<u64> {
        self.remote.lock().as_ref().map(|(_, meta)| meta.version)
    }

    /// Queues a scripted reply for a future push.
    pub fn script_push(&self, reply: MockPush) {
        self.push_script.lock().push_back(reply);
    }

    /// Makes every call fail with a retryable transport error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Delays every call, to keep an operation in flight.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    /// All push requests received, in order.
    pub fn pushes(&self) -> Vec<PushRequest> {
        self.pushes.lock().clone()
    }

    /// Number of push requests received.
    pub fn push_count(&self) -> usize {
        self.pushes.lock().len()
    }

    /// Number of pull requests received.
    pub fn pull_count(&self) -> usize {
        self.pull_calls.load(Ordering::SeqCst)
    }

    /// Number of meta requests received.
    pub fn meta_count(&self) -> usize {
        self.meta_calls.load(Ordering::SeqCst)
    }

    async fn simulate(&self) -> SyncResult<()> {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(SyncError::transport_retryable("mock transport unreachable"));
        }
        Ok(())
    }

    fn accept(&self, request: &PushRequest, version: u64) -> PushOutcome {
        self.set_remote(request.data.clone(), version, &request.device_id);
        let timestamp = self
            .remote
            .lock()
            .as_ref()
            .map(|(_, meta)| meta.last_modified)
            .unwrap_or_else(Utc::now);
        PushOutcome::Accepted(PushResponse {
            success: true,
            version,
            checksum: format!("mock-{version}"),
            timestamp,
        })
    }
}

#[async_trait]
impl SyncTransport for MockTransport {
    async fn fetch_meta(&self, _app: &SyncApp, _token: &str) -> SyncResult<MetaResponse> {
        self.meta_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate().await?;
        let remote = self.remote.lock().clone();
        Ok(match remote {
            Some((_, meta)) => {
                let version = meta.version;
                MetaResponse::found(meta, vec![version])
            }
            None => MetaResponse::missing(),
        })
    }

    async fn pull(&self, _app: &SyncApp, _token: &str) -> SyncResult<PullResponse> {
        self.pull_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate().await?;
        let remote = self.remote.lock().clone();
        let (data, meta) = remote.ok_or_else(|| SyncError::Server {
            status: 404,
            message: "no remote document".into(),
        })?;
        let version = meta.version;
        Ok(PullResponse {
            success: true,
            data,
            meta,
            available_versions: vec![version],
        })
    }

    async fn push(
        &self,
        _app: &SyncApp,
        _token: &str,
        request: &PushRequest,
    ) -> SyncResult<PushOutcome> {
        self.pushes.lock().push(request.clone());
        self.simulate().await?;

        let scripted = self.push_script.lock().pop_front();
        match scripted {
            Some(MockPush::Accept(version)) => Ok(self.accept(request, version)),
            Some(MockPush::Conflict {
                server_version,
                server_device_id,
            }) => Ok(PushOutcome::Conflict(ConflictResponse {
                error: "version conflict".into(),
                code: CONFLICT_CODE.into(),
                local_version: request.local_version,
                server_version,
                server_modified: Utc::now(),
                server_device_id,
            })),
            Some(MockPush::Fail(message)) => Err(SyncError::transport_retryable(message)),
            None => {
                let current = self.remote.lock().as_ref().map(|(_, meta)| meta.clone());
                match current {
                    Some(meta) if meta.version != request.local_version => {
                        Ok(PushOutcome::Conflict(ConflictResponse {
                            error: "version conflict".into(),
                            code: CONFLICT_CODE.into(),
                            local_version: request.local_version,
                            server_version: meta.version,
                            server_modified: meta.last_modified,
                            server_device_id: meta.device_id,
                        }))
                    }
                    Some(meta) => Ok(self.accept(request, meta.version + 1)),
                    None => Ok(self.accept(request, request.local_version + 1)),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn app() -> SyncApp {
        SyncApp::new("tasks").unwrap()
    }

    #[tokio::test]
    async fn mock_transport_missing_document() {
        let transport = MockTransport::new();
        let meta = transport.fetch_meta(&app(), "t").await.unwrap();
        assert!(!meta.exists);
        assert!(transport.pull(&app(), "t").await.is_err());
    }

    #[tokio::test]
    async fn mock_transport_accepts_current_version() {
        let transport = MockTransport::new();
        transport.set_remote(json!({"a": 1}), 3, "other");

        let request = PushRequest::new(json!({"a": 2}), "me", 3);
        let outcome = transport.push(&app(), "t", &request).await.unwrap();
        match outcome {
            PushOutcome::Accepted(response) => assert_eq!(response.version, 4),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(transport.remote_version(), Some(4));
        assert_eq!(transport.remote_data(), Some(json!({"a": 2})));
    }

    #[tokio::test]
    async fn mock_transport_rejects_stale_version() {
        let transport = MockTransport::new();
        transport.set_remote(json!({"a": 1}), 6, "desktop");

        let request = PushRequest::new(json!({"a": 2}), "me", 4);
        let outcome = transport.push(&app(), "t", &request).await.unwrap();
        match outcome {
            PushOutcome::Conflict(conflict) => {
                assert_eq!(conflict.local_version, 4);
                assert_eq!(conflict.server_version, 6);
                assert_eq!(conflict.server_device_id, "desktop");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn mock_transport_failing() {
        let transport = MockTransport::new();
        transport.set_failing(true);
        let result = transport.fetch_meta(&app(), "t").await;
        assert!(matches!(result, Err(SyncError::Transport { .. })));
        assert_eq!(transport.meta_count(), 1);
    }

    #[tokio::test]
    async fn mock_transport_script_takes_precedence() {
        let transport = MockTransport::new();
        transport.script_push(MockPush::Fail("boom".into()));
        let request = PushRequest::new(json!({}), "me", 0);
        assert!(transport.push(&app(), "t", &request).await.is_err());
        assert!(transport.push(&app(), "t", &request).await.is_ok());
        assert_eq!(transport.push_count(), 2);
    }
}

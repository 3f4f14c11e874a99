//! HTTP transport implementation.
//!
//! This module provides an HTTP-based transport for the sync engine.
//! The actual HTTP client is abstracted via a trait to allow different
//! implementations (reqwest, an in-process loopback, test doubles).

use crate::error::{SyncError, SyncResult};
use crate::transport::{PushOutcome, SyncTransport};
use async_trait::async_trait;
use docsync_protocol::{
    decode, encode, ConflictResponse, ErrorResponse, MetaResponse, PullResponse, PushRequest,
    PushResponse, SyncApp, CONFLICT_STATUS,
};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;

/// A raw HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: Vec<u8>) -> Self {
        Self { status, body }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP transport. Errors are
/// connection-level failures; any received response, whatever its status,
/// is `Ok`.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a GET request with a bearer credential.
    async fn get(&self, url: &str, bearer: &str) -> Result<HttpResponse, String>;

    /// Sends a POST request with a JSON body and a bearer credential.
    async fn post(&self, url: &str, bearer: &str, body: Vec<u8>) -> Result<HttpResponse, String>;
}

/// HTTP-based sync transport speaking JSON.
pub struct HttpTransport<C: HttpClient> {
    /// Base URL of the sync server (e.g., "https://sync.example.com").
    base_url: String,
    /// HTTP client implementation.
    client: C,
    /// Per-request timeout.
    timeout: Duration,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a new HTTP transport.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            timeout: Duration::from_secs(30),
        }
    }

    /// Sets the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the wrapped client.
    pub fn client(&self) -> &C {
        &self.client
    }

    fn url(&self, app: &SyncApp, endpoint: &str) -> String {
        format!("{}{}", self.base_url, app.endpoint(endpoint))
    }

    async fn send<F>(&self, request: F) -> SyncResult<HttpResponse>
    where
        F: Future<Output = Result<HttpResponse, String>> + Send,
    {
        match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(message)) => Err(SyncError::transport_retryable(message)),
            Err(_) => Err(SyncError::Timeout),
        }
    }
}

fn decode_body<T: DeserializeOwned>(response: &HttpResponse) -> SyncResult<T> {
    decode(&response.body)
        .map_err(|e| SyncError::Protocol(format!("failed to decode response: {e}")))
}

fn status_error(response: &HttpResponse) -> SyncError {
    let message = decode::<ErrorResponse>(&response.body)
        .map(|body| body.error)
        .unwrap_or_else(|_| String::from_utf8_lossy(&response.body).into_owned());

    match response.status {
        401 | 403 => SyncError::AuthenticationFailed(message),
        status => SyncError::Server { status, message },
    }
}

#[async_trait]
impl<C: HttpClient> SyncTransport for HttpTransport<C> {
    async fn fetch_meta(&self, app: &SyncApp, token: &str) -> SyncResult<MetaResponse> {
        let url = self.url(app, "meta");
        let response = self.send(self.client.get(&url, token)).await?;
        if !response.is_success() {
            return Err(status_error(&response));
        }
        decode_body(&response)
    }

    async fn pull(&self, app: &SyncApp, token: &str) -> SyncResult<PullResponse> {
        let url = self.url(app, "pull");
        let response = self.send(self.client.get(&url, token)).await?;
        if !response.is_success() {
            return Err(status_error(&response));
        }
        decode_body(&response)
    }

    async fn push(
        &self,
        app: &SyncApp,
        token: &str,
        request: &PushRequest,
    ) -> SyncResult<PushOutcome> {
        let url = self.url(app, "push");
        let body = encode(request)
            .map_err(|e| SyncError::Protocol(format!("failed to encode request: {e}")))?;
        let response = self.send(self.client.post(&url, token, body)).await?;

        if response.is_success() {
            let accepted: PushResponse = decode_body(&response)?;
            return Ok(PushOutcome::Accepted(accepted));
        }

        if response.status == CONFLICT_STATUS {
            let conflict: ConflictResponse = decode_body(&response)?;
            if conflict.is_conflict() {
                return Ok(PushOutcome::Conflict(conflict));
            }
        }

        Err(status_error(&response))
    }
}

/// Trait for servers that can handle loopback requests.
pub trait LoopbackServer: Send + Sync {
    /// Handles a request for `path` (starting at `/sync/`).
    fn handle(&self, method: &str, path: &str, bearer: Option<&str>, body: &[u8]) -> HttpResponse;
}

/// A loopback HTTP client that routes requests directly to a sync server.
///
/// Useful for testing without actual network overhead.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
}

impl<S: LoopbackServer> LoopbackClient<S> {
    /// Creates a new loopback client connected to the given server.
    pub fn new(server: S) -> Self {
        Self { server }
    }

    /// Returns the server.
    pub fn server(&self) -> &S {
        &self.server
    }
}

fn sync_path(url: &str) -> &str {
    url.find("/sync/").map(|i| &url[i..]).unwrap_or(url)
}

#[async_trait]
impl<S: LoopbackServer> HttpClient for LoopbackClient<S> {
    async fn get(&self, url: &str, bearer: &str) -> Result<HttpResponse, String> {
        Ok(self.server.handle("GET", sync_path(url), Some(bearer), &[]))
    }

    async fn post(&self, url: &str, bearer: &str, body: Vec<u8>) -> Result<HttpResponse, String> {
        Ok(self.server.handle("POST", sync_path(url), Some(bearer), &body))
    }
}

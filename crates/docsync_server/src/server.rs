//! Main sync server.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::{HandlerContext, RequestHandler};
use crate::store::{DocumentStore, PushResult, StoredDocument};
use docsync_protocol::{encode, SyncApp, CONFLICT_STATUS};
use serde::Serialize;
use std::sync::Arc;

/// An HTTP-shaped reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    /// Status code.
    pub status: u16,
    /// JSON body.
    pub body: Vec<u8>,
}

impl HttpReply {
    fn json<T: Serialize>(status: u16, value: &T) -> Self {
        match encode(value) {
            Ok(body) => Self { status, body },
            Err(e) => Self::error(&ServerError::Internal(e.to_string())),
        }
    }

    fn error(err: &ServerError) -> Self {
        let body = encode(&err.to_response()).unwrap_or_default();
        Self {
            status: err.status_code(),
            body,
        }
    }
}

/// The sync server.
///
/// This server serves the DocSync endpoints from an in-memory document
/// store. It is transport-agnostic: an HTTP front end (or the engine's
/// loopback client in tests) hands each request to [`SyncServer::route`].
///
/// # Example
///
/// ```
/// use docsync_server::{ServerConfig, SyncServer};
///
/// let server = SyncServer::new(ServerConfig::default());
/// let reply = server.route("GET", "/sync/tasks/meta", None, &[]);
/// assert_eq!(reply.status, 200);
/// ```
pub struct SyncServer {
    handler: RequestHandler,
    context: Arc<HandlerContext>,
}

impl SyncServer {
    /// Creates a new sync server.
    pub fn new(config: ServerConfig) -> Self {
        let store = Arc::new(DocumentStore::new(config.history_limit));
        Self::with_store(config, store)
    }

    /// Creates a sync server over an existing store.
    pub fn with_store(config: ServerConfig, store: Arc<DocumentStore>) -> Self {
        let context = Arc::new(HandlerContext::new(config, store));
        let handler = RequestHandler::new(Arc::clone(&context));

        Self { handler, context }
    }

    /// Dispatches one request.
    ///
    /// `path` is `/sync/{app}/{meta|pull|push}`, optionally with a query
    /// string. `bearer` is the token from the `Authorization` header.
    pub fn route(&self, method: &str, path: &str, bearer: Option<&str>, body: &[u8]) -> HttpReply {
        match self.dispatch(method, path, bearer, body) {
            Ok(reply) => reply,
            Err(e) => {
                if e.is_server_error() {
                    tracing::error!(method, path, error = %e, "request failed");
                } else {
                    tracing::debug!(method, path, error = %e, "request rejected");
                }
                HttpReply::error(&e)
            }
        }
    }

    fn dispatch(&self, method: &str, path: &str, bearer: Option<&str>, body: &[u8]) -> ServerResult<HttpReply> {
        let path = path.split('?').next().unwrap_or(path);
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        let [prefix, app, endpoint] = segments.as_slice() else {
            return Err(ServerError::NotFound(path.to_string()));
        };
        if *prefix != "sync" {
            return Err(ServerError::NotFound(path.to_string()));
        }

        let app = SyncApp::new(*app).map_err(|e| ServerError::InvalidRequest(e.to_string()))?;
        self.context.authenticate(bearer)?;

        match (*endpoint, method) {
            ("meta", "GET") => Ok(HttpReply::json(200, &self.handler.handle_meta(&app))),
            ("pull", "GET") => Ok(HttpReply::json(200, &self.handler.handle_pull(&app)?)),
            ("push", "POST") => Ok(match self.handler.handle_push(&app, body)? {
                PushResult::Stored(response) => HttpReply::json(200, &response),
                PushResult::Conflict(conflict) => HttpReply::json(CONFLICT_STATUS, &conflict),
            }),
            ("meta" | "pull" | "push", _) => Err(ServerError::MethodNotAllowed(format!("{method} {path}"))),
            _ => Err(ServerError::NotFound(path.to_string())),
        }
    }

    /// Issues a bearer token for `subject`. Fails if auth is disabled.
    pub fn issue_token(&self, subject: &str) -> ServerResult<String> {
        self.context
            .validator()
            .ok_or_else(|| ServerError::InvalidRequest("authentication is disabled".into()))?
            .create_token(subject)
    }

    /// Returns a retained version of an app's document.
    pub fn pull_version(&self, app: &SyncApp, version: u64) -> Option<StoredDocument> {
        self.context.store.get_version(app, version)
    }

    /// Returns the current version of an app, 0 if none.
    pub fn version(&self, app: &SyncApp) -> u64 {
        self.context.store.version(app)
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<DocumentStore> {
        &self.context.store
    }
}

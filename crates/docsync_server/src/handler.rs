//! Request handlers for sync endpoints.

use crate::auth::{AuthConfig, TokenValidator};
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::store::{canonical_bytes, DocumentStore, PushResult};
use docsync_protocol::{decode, MetaResponse, PullResponse, PushRequest, SyncApp};
use std::sync::Arc;

/// Context for request handling.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// Document store (shared across all handlers).
    pub store: Arc<DocumentStore>,
    validator: Option<TokenValidator>,
}

impl HandlerContext {
    /// Creates a new handler context.
    pub fn new(config: ServerConfig, store: Arc<DocumentStore>) -> Self {
        let validator = match (&config.auth_secret, config.require_auth) {
            (Some(secret), true) => Some(TokenValidator::new(
                AuthConfig::new(secret.clone()).with_expiry(config.token_expiry),
            )),
            _ => None,
        };
        Self {
            config,
            store,
            validator,
        }
    }

    /// Token validator, when auth is enabled.
    pub fn validator(&self) -> Option<&TokenValidator> {
        self.validator.as_ref()
    }

    /// Checks the bearer token. Returns the token subject, if auth is on.
    pub fn authenticate(&self, bearer: Option<&str>) -> ServerResult<Option<String>> {
        if !self.config.require_auth {
            return Ok(None);
        }
        let validator = self
            .validator
            .as_ref()
            .ok_or_else(|| ServerError::Internal("auth enabled without a secret".into()))?;
        let token = bearer.ok_or_else(|| ServerError::NotAuthorized("missing bearer token".into()))?;
        validator.validate_token(token).map(Some)
    }
}

/// Handler for sync requests.
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Handles `GET /sync/{app}/meta`.
    pub fn handle_meta(&self, app: &SyncApp) -> MetaResponse {
        match self.context.store.current(app) {
            Some(current) => MetaResponse::found(current.meta, self.context.store.available_versions(app)),
            None => MetaResponse::missing(),
        }
    }

    /// Handles `GET /sync/{app}/pull`.
    pub fn handle_pull(&self, app: &SyncApp) -> ServerResult<PullResponse> {
        let current = self
            .context
            .store
            .current(app)
            .ok_or_else(|| ServerError::NotFound(format!("no document for app {app}")))?;

        Ok(PullResponse {
            success: true,
            data: current.data,
            meta: current.meta,
            available_versions: self.context.store.available_versions(app),
        })
    }

    /// Handles `POST /sync/{app}/push`.
    pub fn handle_push(&self, app: &SyncApp, body: &[u8]) -> ServerResult<PushResult> {
        let request: PushRequest =
            decode(body).map_err(|e| ServerError::InvalidRequest(e.to_string()))?;
        if request.device_id.trim().is_empty() {
            return Err(ServerError::InvalidRequest("deviceId is required".into()));
        }

        let size = canonical_bytes(&request.data).len();
        let limit = self.context.config.max_document_bytes;
        if size > limit {
            return Err(ServerError::PayloadTooLarge { size, limit });
        }

        let device_id = request.device_id.clone();
        let result = self.context.store.push(app, request);
        match &result {
            PushResult::Stored(response) => {
                tracing::info!(app = %app, version = response.version, device_id = %device_id, size, "push accepted");
            }
            PushResult::Conflict(conflict) => {
                tracing::info!(
                    app = %app,
                    local_version = conflict.local_version,
                    server_version = conflict.server_version,
                    device_id = %device_id,
                    "push rejected: stale version"
                );
            }
        }
        Ok(result)
    }
}

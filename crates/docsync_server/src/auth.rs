//! Authentication support for the sync server.
//!
//! This module provides bearer tokens signed with HMAC-SHA256. Tokens
//! include a timestamp for expiration checking.
//!
//! ## Token Format
//!
//! `<payload hex>.<signature hex>` where the payload is:
//! - N bytes: subject (UTF-8, usually a user or device name)
//! - 8 bytes: timestamp (Unix millis, big-endian)
//!
//! and the signature is the 32-byte HMAC-SHA256 of the payload.

use crate::error::{ServerError, ServerResult};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

type HmacSha256 = Hmac<Sha256>;

const TIMESTAMP_LEN: usize = 8;

/// Authentication configuration.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Secret key for HMAC.
    pub secret: Vec<u8>,
    /// Token expiration duration.
    pub token_expiry: Duration,
}

impl AuthConfig {
    /// Creates a new auth configuration.
    pub fn new(secret: Vec<u8>) -> Self {
        Self {
            secret,
            token_expiry: Duration::from_secs(24 * 60 * 60), // 24 hours
        }
    }

    /// Sets the token expiration duration.
    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.token_expiry = expiry;
        self
    }
}

/// Issues and validates bearer tokens.
#[derive(Clone)]
pub struct TokenValidator {
    config: AuthConfig,
}

impl TokenValidator {
    /// Creates a new token validator.
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    /// Creates a token for `subject`, valid from now.
    pub fn create_token(&self, subject: &str) -> ServerResult<String> {
        self.create_token_at(subject, now_millis())
    }

    fn create_token_at(&self, subject: &str, timestamp: u64) -> ServerResult<String> {
        let mut payload = Vec::with_capacity(subject.len() + TIMESTAMP_LEN);
        payload.extend_from_slice(subject.as_bytes());
        payload.extend_from_slice(&timestamp.to_be_bytes());

        let signature = self.mac()?.chain_update(&payload).finalize().into_bytes();
        Ok(format!("{}.{}", hex::encode(&payload), hex::encode(signature)))
    }

    /// Validates a token and returns its subject.
    pub fn validate_token(&self, token: &str) -> ServerResult<String> {
        let (payload_hex, signature_hex) = token
            .split_once('.')
            .ok_or_else(|| ServerError::NotAuthorized("malformed token".into()))?;
        let payload = hex::decode(payload_hex)
            .map_err(|_| ServerError::NotAuthorized("malformed token".into()))?;
        let signature = hex::decode(signature_hex)
            .map_err(|_| ServerError::NotAuthorized("malformed token".into()))?;

        if payload.len() < TIMESTAMP_LEN {
            return Err(ServerError::NotAuthorized("invalid token length".into()));
        }

        self.mac()?
            .chain_update(&payload)
            .verify_slice(&signature)
            .map_err(|_| ServerError::NotAuthorized("invalid signature".into()))?;

        let (subject, timestamp_bytes) = payload.split_at(payload.len() - TIMESTAMP_LEN);
        let mut timestamp = [0u8; TIMESTAMP_LEN];
        timestamp.copy_from_slice(timestamp_bytes);
        let timestamp = u64::from_be_bytes(timestamp);

        let expiry_millis = self.config.token_expiry.as_millis() as u64;
        if now_millis() > timestamp.saturating_add(expiry_millis) {
            return Err(ServerError::NotAuthorized("token expired".into()));
        }

        String::from_utf8(subject.to_vec())
            .map_err(|_| ServerError::NotAuthorized("invalid subject".into()))
    }

    fn mac(&self) -> ServerResult<HmacSha256> {
        HmacSha256::new_from_slice(&self.config.secret)
            .map_err(|e| ServerError::Internal(format!("hmac key: {e}")))
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

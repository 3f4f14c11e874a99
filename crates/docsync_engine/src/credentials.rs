//! Bearer credential source.

use parking_lot::RwLock;

/// Supplies the bearer token attached to every request.
///
/// Returning `None` means the user is not signed in: the engine then makes
/// no network request at all.
pub trait CredentialProvider: Send + Sync {
    /// Returns the current bearer token, if any.
    fn bearer_token(&self) -> Option<String>;
}

/// A credential that can be swapped at runtime (sign-in / sign-out).
#[derive(Debug, Default)]
pub struct StaticCredentials {
    token: RwLock<Option<String>>,
}

impl StaticCredentials {
    /// Creates a provider holding `token`.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }

    /// Creates a signed-out provider.
    pub fn signed_out() -> Self {
        Self::default()
    }

    /// Replaces the token.
    pub fn set(&self, token: Option<String>) {
        *self.token.write() = token;
    }
}

impl CredentialProvider for StaticCredentials {
    fn bearer_token(&self) -> Option<String> {
        self.token.read().clone()
    }
}

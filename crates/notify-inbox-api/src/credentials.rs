//! Credential resolution seam.
//!
//! Authentication is owned by an external collaborator; the engine only
//! needs a bearer token per request. Keeping resolution behind one trait
//! method means the engine never grows opinions about where tokens are
//! stored or refreshed.

use std::sync::Arc;

/// Resolves the bearer credential for outgoing API calls.
///
/// Returning `None` means no session is active; the HTTP client sends the
/// request unauthenticated and the server's 401 drives engine teardown.
pub trait CredentialProvider: Send + Sync {
    fn bearer_token(&self) -> Option<String>;
}

impl<T: CredentialProvider + ?Sized> CredentialProvider for Arc<T> {
    fn bearer_token(&self) -> Option<String> {
        (**self).bearer_token()
    }
}

/// Fixed-token provider for tests and command-line tooling.
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    token: Option<String>,
}

impl StaticCredentials {
    /// Provider that always presents `token`.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    /// Provider with no active session.
    #[must_use]
    pub const fn anonymous() -> Self {
        Self { token: None }
    }
}

impl CredentialProvider for StaticCredentials {
    fn bearer_token(&self) -> Option<String> {
        self.token.clone()
    }
}

//! Error taxonomy for the remote notification API.
//!
//! Every failure a `NotificationApi` call can produce maps into one of
//! these variants. Retry policy lives entirely in the callers (scheduler
//! and mutation coordinator); this taxonomy only classifies.

use thiserror::Error;

/// Errors surfaced by the remote notification API.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// Connectivity failure: DNS, connect, reset, or mid-stream I/O error.
    #[error("network error: {detail}")]
    Network { detail: String },

    /// The client-side deadline expired before a response arrived.
    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// 401 — credential invalid or expired. Fatal to the engine: the auth
    /// collaborator owns recovery.
    #[error("authentication rejected (HTTP 401)")]
    Auth,

    /// 5xx — server-side failure. Non-fatal; the next poll reconciles.
    #[error("server error (HTTP {status}): {detail}")]
    Server { status: u16, detail: String },

    /// 404 on a mutation target — the notification no longer exists.
    #[error("notification not found: {id}")]
    NotFound { id: i64 },

    /// 400/422 — the server rejected the request shape or arguments.
    #[error("validation rejected: {detail}")]
    Validation { detail: String },

    /// The response body could not be decoded into the expected payload.
    #[error("malformed response: {detail}")]
    Decode { detail: String },

    /// The configured base URL could not be parsed.
    #[error("invalid API base URL: {detail}")]
    InvalidUrl { detail: String },
}

/// Result type alias for remote API operations.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl ApiError {
    /// Fatal errors tear the engine down; recovery belongs to the auth
    /// collaborator.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth)
    }

    /// Transient errors self-heal on the next successful poll; no
    /// immediate retry is attempted anywhere in the engine.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Network { .. } | Self::Timeout { .. } | Self::Server { .. }
        )
    }

    /// Target errors invalidate exactly one optimistic patch.
    #[must_use]
    pub const fn is_target_rejection(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Validation { .. })
    }

    /// Classify an HTTP status code from a mutation call.
    ///
    /// `id` is the mutation target, used for `NotFound`; bulk calls pass 0.
    #[must_use]
    pub fn from_status(status: u16, id: i64, detail: String) -> Self {
        match status {
            401 => Self::Auth,
            404 => Self::NotFound { id },
            400 | 422 => Self::Validation { detail },
            s if s >= 500 => Self::Server { status: s, detail },
            s => Self::Server { status: s, detail },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_predicates() {
        assert!(ApiError::Auth.is_fatal());
        assert!(!ApiError::Auth.is_transient());

        let net = ApiError::Network {
            detail: "refused".into(),
        };
        assert!(net.is_transient());
        assert!(!net.is_fatal());

        let nf = ApiError::NotFound { id: 9 };
        assert!(nf.is_target_rejection());
        assert!(!nf.is_transient());

        let timeout = ApiError::Timeout { timeout_ms: 10_000 };
        assert!(timeout.is_transient());
    }

    #[test]
    fn status_mapping() {
        assert!(matches!(
            ApiError::from_status(401, 0, String::new()),
            ApiError::Auth
        ));
        assert!(matches!(
            ApiError::from_status(404, 3, String::new()),
            ApiError::NotFound { id: 3 }
        ));
        assert!(matches!(
            ApiError::from_status(422, 0, String::new()),
            ApiError::Validation { .. }
        ));
        assert!(matches!(
            ApiError::from_status(503, 0, String::new()),
            ApiError::Server { status: 503, .. }
        ));
    }

    #[test]
    fn display_is_stable() {
        let e = ApiError::Server {
            status: 502,
            detail: "bad gateway".into(),
        };
        assert_eq!(e.to_string(), "server error (HTTP 502): bad gateway");
    }
}

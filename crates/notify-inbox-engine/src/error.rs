//! Engine-level error type.

use notify_inbox_core::ApiError;
use thiserror::Error;

/// Errors surfaced to UI surfaces calling the engine.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// The engine was torn down (logout or fatal auth failure); the call
    /// was not performed.
    #[error("engine is closed")]
    Closed,

    /// The remote API rejected or failed the underlying call. The store
    /// has already been rolled back or flagged as appropriate.
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Result type alias for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

impl EngineError {
    /// True when the underlying cause was the fatal 401 path.
    #[must_use]
    pub const fn is_auth(&self) -> bool {
        matches!(self, Self::Api(ApiError::Auth))
    }
}

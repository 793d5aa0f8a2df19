//! Error types for prepcache

use thiserror::Error;

/// Core error type for statement cache operations
#[derive(Error, Debug)]
pub enum CacheError {
    /// The cache (or runner) was closed before the operation was attempted
    #[error("Statement cache is closed")]
    Closed,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Failure reported by a statement while it was being created, reset or closed
    #[error("Statement error: {0}")]
    Statement(String),

    #[error("Task runner error: {0}")]
    Runner(String),

    /// A registry invariant was broken. Indicates a bug, never a user error.
    #[error("Internal consistency violation: {0}")]
    Internal(String),

    /// A submitted task was dropped before it produced a result
    #[error("Cancelled")]
    Cancelled,
}

impl CacheError {
    /// Check if this error signals a closed cache
    pub fn is_closed(&self) -> bool {
        matches!(self, CacheError::Closed)
    }
}

/// Result type alias for statement cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

/// Report a broken invariant.
///
/// Panics in debug builds. Release builds log at error level and hand the
/// error back so the caller can keep operating on unrelated entries.
#[track_caller]
pub fn inconsistency(message: impl Into<String>) -> CacheError {
    let message = message.into();
    tracing::error!(%message, "statement cache invariant violated");
    if cfg!(debug_assertions) {
        panic!("statement cache invariant violated: {message}");
    }
    CacheError::Internal(message)
}

use thiserror::Error;

/// Top-level error type for mintwatch.
///
/// Variants follow the failure taxonomy the pipeline reasons about:
/// transient errors are retried, permanent ones end the item, ambiguous
/// ones are never retried, fatal ones stop the poll loop.
#[derive(Debug, Error)]
pub enum MintError {
    /// Network hiccup, timeout before send, rate limit. Safe to retry.
    #[error("transient error: {0}")]
    Transient(String),

    /// The feed session is no longer valid and must be re-established.
    #[error("session expired: {0}")]
    SessionExpired(String),

    /// Input or request problem that no retry will fix.
    #[error("permanent error: {0}")]
    Permanent(String),

    /// The outcome of a side-effecting call is unknown.
    #[error("ambiguous outcome: {0}")]
    Ambiguous(String),

    /// Process-level failure (e.g. authentication exhausted).
    #[error("fatal error: {0}")]
    Fatal(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Persistence store error.
    #[error("store error: {0}")]
    Store(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MintError {
    /// Whether a retry envelope may re-run the operation.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Whether the error must halt the poll loop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }

    pub fn is_session_expired(&self) -> bool {
        matches!(self, Self::SessionExpired(_))
    }
}

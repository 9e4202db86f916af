//! Error types for the sequent concurrency toolkit.

use thiserror::Error;

/// Main error type for sequent.
///
/// Rejection reasons are cloned when a settled future fans out to several
/// subscribers, so the whole taxonomy is `Clone`. Failures raised by user
/// code travel through [`Error::Other`] without further wrapping.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A scheduled deadline elapsed before the guarded operation settled.
    #[error("timeout: {0}")]
    Timeout(String),

    /// An operation was explicitly or implicitly cancelled.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// A task was submitted to an already-closed queue.
    #[error("rejected: {0}")]
    Rejected(String),

    /// A future was asked to resolve with itself.
    #[error("type error: {0}")]
    Type(String),

    /// Generic failure raised by user code.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Error::Timeout(message.into())
    }

    /// Create a cancellation error.
    pub fn cancelled(message: impl Into<String>) -> Self {
        Error::Cancelled(message.into())
    }

    /// Create a rejection error.
    pub fn rejected(message: impl Into<String>) -> Self {
        Error::Rejected(message.into())
    }

    /// Create a type error.
    pub fn type_error(message: impl Into<String>) -> Self {
        Error::Type(message.into())
    }

    /// Create a generic error.
    pub fn other(message: impl Into<String>) -> Self {
        Error::Other(message.into())
    }

    /// Whether this error represents a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }

    /// Whether this error represents a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled(_))
    }

    /// Whether this error represents a closed-queue rejection.
    pub fn is_rejected(&self) -> bool {
        matches!(self, Error::Rejected(_))
    }
}

/// Result type alias for sequent.
pub type Result<T> = std::result::Result<T, Error>;

//! Error types for PsiCash operations.
//!
//! Every failure is either *critical* (the operation must not be retried
//! as-is) or *recoverable* (a transient transport failure that a later retry
//! may clear). Server business outcomes are not errors at all; they are
//! reported through [`crate::Status`].

use thiserror::Error;

/// Error codes for binding layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum PsiCashErrorCode {
    /// Operation called before `initialize`
    NotInitialized = 1000,
    /// Invalid caller-supplied argument
    InvalidArgument = 2000,
    /// Required tokens are missing or invalid
    MissingTokens = 3000,
    /// Transport failure that may clear on retry
    Recoverable = 4000,
    /// Transport failure that must not be retried
    Transport = 4001,
    /// Retry ceiling reached
    RetriesExhausted = 4002,
    /// Server replied with something the protocol does not allow
    UnexpectedResponse = 5000,
    /// Persisted state could not be read or written
    Storage = 6000,
    /// Encoding or decoding failed
    Serialization = 6001,
    /// Internal/unexpected error
    Internal = 9999,
}

/// Comprehensive error type for PsiCash operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PsiCashError {
    /// The session has not been initialized.
    #[error("PsiCash is not initialized")]
    NotInitialized,

    /// A caller-supplied argument was rejected.
    #[error("invalid {field}: {reason}")]
    InvalidArgument {
        /// Field or parameter name
        field: String,
        /// Reason for rejection
        reason: String,
    },

    /// The operation needs a token the installation does not hold.
    #[error("missing tokens: {0}")]
    MissingTokens(String),

    /// Transient transport failure (timeout, reset, DNS).
    #[error("recoverable transport error: {0}")]
    Recoverable(String),

    /// Transport failure the requester marked as non-retryable.
    #[error("transport error: {0}")]
    Transport(String),

    /// Every attempt failed with a recoverable error.
    #[error("request failed after {attempts} attempts: {reason}")]
    RetriesExhausted {
        /// Number of transport calls made
        attempts: u32,
        /// Last recoverable failure
        reason: String,
    },

    /// The server replied with a code or body the protocol does not allow.
    #[error("unexpected server response ({code}): {body}")]
    UnexpectedResponse {
        /// HTTP status code
        code: i32,
        /// Response body, possibly truncated
        body: String,
    },

    /// Persisted state could not be read or written.
    #[error("storage error: {0}")]
    Storage(String),

    /// Encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Internal/unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl PsiCashError {
    /// Get the error code for binding layers.
    pub fn code(&self) -> PsiCashErrorCode {
        match self {
            Self::NotInitialized => PsiCashErrorCode::NotInitialized,
            Self::InvalidArgument { .. } => PsiCashErrorCode::InvalidArgument,
            Self::MissingTokens(_) => PsiCashErrorCode::MissingTokens,
            Self::Recoverable(_) => PsiCashErrorCode::Recoverable,
            Self::Transport(_) => PsiCashErrorCode::Transport,
            Self::RetriesExhausted { .. } => PsiCashErrorCode::RetriesExhausted,
            Self::UnexpectedResponse { .. } => PsiCashErrorCode::UnexpectedResponse,
            Self::Storage(_) => PsiCashErrorCode::Storage,
            Self::Serialization(_) => PsiCashErrorCode::Serialization,
            Self::Internal(_) => PsiCashErrorCode::Internal,
        }
    }

    /// Returns true if the operation must not be retried as-is.
    pub fn is_critical(&self) -> bool {
        !matches!(self, Self::Recoverable(_))
    }

    /// Returns true if this error is potentially recoverable by retrying.
    pub fn is_retryable(&self) -> bool {
        !self.is_critical()
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an unexpected-response error, truncating long bodies.
    pub fn unexpected_response(code: i32, body: &str) -> Self {
        const MAX_BODY: usize = 256;
        let body = match body.char_indices().nth(MAX_BODY) {
            Some((idx, _)) => format!("{}...", &body[..idx]),
            None => body.to_string(),
        };
        Self::UnexpectedResponse { code, body }
    }
}

impl From<serde_json::Error> for PsiCashError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for PsiCashError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

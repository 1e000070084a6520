//! Server-decided transaction outcomes.

use serde::{Deserialize, Serialize};

/// Outcome of a request that reached the server and was decided there.
///
/// Ordinals are stable across versions: new values are appended, existing
/// ones are never renumbered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum Status {
    /// Guard value for uninitialized reads. Never returned by a well-behaved call.
    Invalid = -1,
    Success = 0,
    ExistingTransaction = 1,
    InsufficientBalance = 2,
    TransactionAmountMismatch = 3,
    TransactionTypeNotFound = 4,
    InvalidTokens = 5,
    ServerError = 6,
}

impl Status {
    /// The stable ordinal.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Map an ordinal back to a status. Unknown ordinals map to `Invalid`.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Success,
            1 => Self::ExistingTransaction,
            2 => Self::InsufficientBalance,
            3 => Self::TransactionAmountMismatch,
            4 => Self::TransactionTypeNotFound,
            5 => Self::InvalidTokens,
            6 => Self::ServerError,
            _ => Self::Invalid,
        }
    }

    /// Interpret the HTTP status of a `/transaction` reply.
    ///
    /// Returns `None` for codes the protocol does not define.
    pub fn from_transaction_http_code(code: i32) -> Option<Self> {
        match code {
            200 => Some(Self::Success),
            401 => Some(Self::InvalidTokens),
            402 => Some(Self::InsufficientBalance),
            404 => Some(Self::TransactionTypeNotFound),
            409 => Some(Self::ExistingTransaction),
            412 => Some(Self::TransactionAmountMismatch),
            500..=599 => Some(Self::ServerError),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Invalid => "Invalid",
            Self::Success => "Success",
            Self::ExistingTransaction => "ExistingTransaction",
            Self::InsufficientBalance => "InsufficientBalance",
            Self::TransactionAmountMismatch => "TransactionAmountMismatch",
            Self::TransactionTypeNotFound => "TransactionTypeNotFound",
            Self::InvalidTokens => "InvalidTokens",
            Self::ServerError => "ServerError",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

//! Marshaling seam for binding layers.
//!
//! Binding layers never hold references into the core. They receive flat,
//! owned records copied out of the core types, with enumerations expressed as
//! stable strings or ordinals and timestamps as ISO 8601 strings.

use crate::authorization::Authorization;
use crate::purchases::{Purchase, PurchasePrice};
use crate::session::NewExpiringPurchaseResponse;
use crate::status::Status;
use crate::tokens::TokenType;
use crate::{PsiCashError, Result};
use serde::Serialize;

// ============================================================================
// Errors
// ============================================================================

/// Flat error record.
///
/// `has_value == false` means "no error"; check it before reading the rest.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub critical: bool,
    pub has_value: bool,
    pub description: String,
}

impl ErrorRecord {
    /// The "no error" sentinel.
    pub fn none() -> Self {
        Self::default()
    }
}

impl From<&PsiCashError> for ErrorRecord {
    fn from(e: &PsiCashError) -> Self {
        Self {
            critical: e.is_critical(),
            has_value: true,
            description: e.to_string(),
        }
    }
}

impl From<PsiCashError> for ErrorRecord {
    fn from(e: PsiCashError) -> Self {
        Self::from(&e)
    }
}

/// Error record of a result, or [`ErrorRecord::none`] on success.
pub fn error_record<T>(result: &Result<T>) -> ErrorRecord {
    match result {
        Ok(_) => ErrorRecord::none(),
        Err(e) => ErrorRecord::from(e),
    }
}

// ============================================================================
// Entities
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchasePriceRecord {
    pub transaction_class: String,
    pub distinguisher: String,
    pub price: i64,
}

impl From<&PurchasePrice> for PurchasePriceRecord {
    fn from(p: &PurchasePrice) -> Self {
        Self {
            transaction_class: p.transaction_class.clone(),
            distinguisher: p.distinguisher.clone(),
            price: p.price,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationRecord {
    pub id: String,
    pub access_type: String,
    pub iso8601_expires: String,
    pub encoded: String,
}

impl From<&Authorization> for AuthorizationRecord {
    fn from(a: &Authorization) -> Self {
        Self {
            id: a.id.clone(),
            access_type: a.access_type.clone(),
            iso8601_expires: a.iso8601_expires(),
            encoded: a.encoded.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRecord {
    pub transaction_id: String,
    pub transaction_class: String,
    pub distinguisher: String,
    pub server_time_expiry: Option<String>,
    pub local_time_expiry: Option<String>,
    pub authorization: Option<AuthorizationRecord>,
}

impl From<&Purchase> for PurchaseRecord {
    fn from(p: &Purchase) -> Self {
        Self {
            transaction_id: p.transaction_id.clone(),
            transaction_class: p.transaction_class.clone(),
            distinguisher: p.distinguisher.clone(),
            server_time_expiry: p.iso8601_server_time_expiry(),
            local_time_expiry: p.iso8601_local_time_expiry(),
            authorization: p.authorization.as_ref().map(AuthorizationRecord::from),
        }
    }
}

pub fn purchase_records(purchases: &[Purchase]) -> Vec<PurchaseRecord> {
    purchases.iter().map(PurchaseRecord::from).collect()
}

pub fn token_type_names(types: &[TokenType]) -> Vec<String> {
    types.iter().map(|t| t.as_str().to_string()).collect()
}

// ============================================================================
// Results
// ============================================================================

/// Result of a call returning a [`Status`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResult {
    /// Ordinal of the status. `Status::Invalid` when `error` has a value.
    pub status: i32,
    pub error: ErrorRecord,
}

impl From<Result<Status>> for StatusResult {
    fn from(result: Result<Status>) -> Self {
        match result {
            Ok(status) => Self {
                status: status.code(),
                error: ErrorRecord::none(),
            },
            Err(e) => Self {
                status: Status::Invalid.code(),
                error: ErrorRecord::from(e),
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewExpiringPurchaseResult {
    pub status: i32,
    pub purchase: Option<PurchaseRecord>,
    pub error: ErrorRecord,
}

impl From<Result<NewExpiringPurchaseResponse>> for NewExpiringPurchaseResult {
    fn from(result: Result<NewExpiringPurchaseResponse>) -> Self {
        match result {
            Ok(response) => Self {
                status: response.status.code(),
                purchase: response.purchase.as_ref().map(PurchaseRecord::from),
                error: ErrorRecord::none(),
            },
            Err(e) => Self {
                status: Status::Invalid.code(),
                purchase: None,
                error: ErrorRecord::from(e),
            },
        }
    }
}

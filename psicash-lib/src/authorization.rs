//! Authorizations and the registry that indexes them.
//!
//! An authorization is a signed, time-bounded credential that the server
//! attaches to a purchase. The client never verifies the signature; it only
//! decodes enough of the payload to know the ID, access type and expiry.
//! Each authorization is owned by its purchase. The registry borrows
//! purchases and builds lookup indices over them.

use crate::purchases::Purchase;
use crate::{PsiCashError, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Decoded authorization attached to a purchase.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorization {
    pub id: String,
    pub access_type: String,
    pub expires: DateTime<Utc>,
    /// The original base64 credential, passed through untouched.
    pub encoded: String,
}

#[derive(Deserialize)]
struct SignedAuthorization {
    #[serde(rename = "Authorization")]
    authorization: AuthorizationClaims,
}

#[derive(Deserialize)]
struct AuthorizationClaims {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "AccessType")]
    access_type: String,
    #[serde(rename = "Expires")]
    expires: DateTime<Utc>,
}

impl Authorization {
    /// Decode a base64-encoded signed authorization.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` if the payload is not base64 JSON with an
    /// `Authorization` object carrying `ID`, `AccessType` and `Expires`.
    pub fn decode(encoded: &str) -> Result<Self> {
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|e| PsiCashError::Serialization(format!("authorization base64: {}", e)))?;
        let signed: SignedAuthorization = serde_json::from_slice(&bytes)?;

        if signed.authorization.id.is_empty() {
            return Err(PsiCashError::Serialization(
                "authorization has an empty ID".to_string(),
            ));
        }

        Ok(Self {
            id: signed.authorization.id,
            access_type: signed.authorization.access_type,
            expires: signed.authorization.expires,
            encoded: encoded.trim().to_string(),
        })
    }

    /// Active iff `now` is strictly before the expiry.
    ///
    /// The owning purchase is only swept once `now` passes the expiry, so
    /// for that single instant an inactive authorization may still sit on
    /// a live purchase.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now < self.expires
    }

    pub fn iso8601_expires(&self) -> String {
        self.expires.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

/// Non-owning index of the authorizations carried by a set of purchases.
pub struct AuthorizationRegistry<'a> {
    entries: Vec<&'a Purchase>,
    by_id: HashMap<&'a str, &'a Purchase>,
}

impl<'a> AuthorizationRegistry<'a> {
    /// Index every purchase that carries an authorization.
    pub fn index<I>(purchases: I) -> Self
    where
        I: IntoIterator<Item = &'a Purchase>,
    {
        let mut entries = Vec::new();
        let mut by_id = HashMap::new();
        for purchase in purchases {
            if let Some(auth) = &purchase.authorization {
                entries.push(purchase);
                by_id.insert(auth.id.as_str(), purchase);
            }
        }
        Self { entries, by_id }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All indexed authorizations, optionally only the unexpired ones.
    pub fn authorizations(&self, active_only: bool, now: DateTime<Utc>) -> Vec<Authorization> {
        self.entries
            .iter()
            .filter_map(|p| p.authorization.as_ref())
            .filter(|auth| !active_only || auth.is_active(now))
            .cloned()
            .collect()
    }

    /// Purchases owning the given authorization IDs.
    ///
    /// Unknown IDs are skipped. Each purchase appears at most once, in the
    /// order its ID was first requested.
    pub fn purchases_by_authorization_id<S: AsRef<str>>(&self, ids: &[S]) -> Vec<Purchase> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut found = Vec::new();
        for id in ids {
            if let Some(purchase) = self.by_id.get(id.as_ref()).copied() {
                if seen.insert(purchase.transaction_id.as_str()) {
                    found.push(purchase.clone());
                }
            }
        }
        found
    }
}

#[cfg(test)]
pub(crate) fn encode_for_test(id: &str, access_type: &str, expires: DateTime<Utc>) -> String {
    let json = serde_json::json!({
        "Authorization": {
            "ID": id,
            "AccessType": access_type,
            "Expires": expires.to_rfc3339_opts(SecondsFormat::Millis, true),
        },
        "SigningKeyID": "a2V5",
        "Signature": "c2ln",
    });
    BASE64.encode(json.to_string())
}

//! HTTP Sync Engine.
//!
//! Builds requests against the PsiCash API, hands them to the embedder's
//! [`HttpRequester`], retries recoverable transport failures with bounded
//! backoff and decodes replies into typed outcomes. The engine never touches
//! the stores: the session applies decoded outcomes to a snapshot copy and
//! commits it.
//!
//! Retry rules:
//! - `RECOVERABLE_ERROR` → retried up to the policy ceiling, then reported
//!   as critical `RetriesExhausted`.
//! - `CRITICAL_ERROR` → reported immediately as critical `Transport`.
//! - Any HTTP status → returned to the caller. A non-2xx reply is a server
//!   decision, not a transport failure, and is never retried here.

use crate::authorization::Authorization;
use crate::config::{RetryPolicy, ServerEndpoint, API_VERSION_PATH};
use crate::purchases::PurchasePrice;
use crate::status::Status;
use crate::tokens::{TokenStore, TokenType};
use crate::transport::{HttpParams, HttpRequester, HttpResult};
use crate::{PsiCashError, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

pub const AUTH_HEADER: &str = "X-PsiCash-Auth";
pub const METADATA_HEADER: &str = "X-PsiCash-Metadata";

/// Version tag carried in metadata and landing page payloads.
const PAYLOAD_VERSION: u32 = 1;

const TRACKER_PATH: &str = "/tracker";
const REFRESH_STATE_PATH: &str = "/refresh-state";
const TRANSACTION_PATH: &str = "/transaction";

// ============================================================================
// Wire formats
// ============================================================================

#[derive(Deserialize)]
struct RefreshStateBody {
    #[serde(rename = "TokensValid", default)]
    tokens_valid: HashMap<String, bool>,
    #[serde(rename = "IsAccount", default)]
    is_account: bool,
    #[serde(rename = "Balance")]
    balance: i64,
    #[serde(rename = "PurchasePrices", default)]
    purchase_prices: Vec<WirePrice>,
}

#[derive(Deserialize)]
struct WirePrice {
    #[serde(rename = "Class")]
    class: String,
    #[serde(rename = "Distinguisher")]
    distinguisher: String,
    #[serde(rename = "Price")]
    price: i64,
}

#[derive(Deserialize)]
struct TransactionBody {
    #[serde(rename = "TransactionID")]
    transaction_id: String,
    #[serde(rename = "ServerTimeExpiry", default)]
    server_time_expiry: Option<DateTime<Utc>>,
    #[serde(rename = "Authorization", default)]
    authorization: Option<String>,
    #[serde(rename = "Balance", default)]
    balance: Option<i64>,
}

// ============================================================================
// Decoded outcomes
// ============================================================================

/// Decoded `200` reply of `/refresh-state`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefreshReply {
    /// Validity keyed by token value.
    pub tokens_valid: HashMap<String, bool>,
    pub is_account: bool,
    pub balance: i64,
    pub prices: Vec<PurchasePrice>,
    pub server_time_diff_ms: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
    Refreshed(RefreshReply),
    InvalidTokens,
    ServerError,
}

/// Server confirmation of a purchase.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfirmedTransaction {
    pub transaction_id: String,
    pub server_time_expiry: Option<DateTime<Utc>>,
    pub authorization: Option<Authorization>,
    pub balance: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionReply {
    pub status: Status,
    /// Present iff `status` is `Success`.
    pub confirmed: Option<ConfirmedTransaction>,
    pub server_time_diff_ms: Option<i64>,
}

/// Server clock minus local clock, from an RFC 1123 `Date` value.
pub fn server_time_diff_ms(date: &str, local_now: DateTime<Utc>) -> Option<i64> {
    if date.trim().is_empty() {
        return None;
    }
    DateTime::parse_from_rfc2822(date.trim())
        .ok()
        .map(|server| (server.with_timezone(&Utc) - local_now).num_milliseconds())
}

// ============================================================================
// Engine
// ============================================================================

pub struct SyncEngine {
    requester: Arc<dyn HttpRequester>,
    endpoint: ServerEndpoint,
    user_agent: String,
    retry: RetryPolicy,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("endpoint", &self.endpoint)
            .field("user_agent", &self.user_agent)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl SyncEngine {
    pub fn new(
        requester: Arc<dyn HttpRequester>,
        endpoint: ServerEndpoint,
        user_agent: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            requester,
            endpoint,
            user_agent: user_agent.into(),
            retry,
        }
    }

    pub fn requester(&self) -> Arc<dyn HttpRequester> {
        Arc::clone(&self.requester)
    }

    /// JSON carried in the metadata header and landing page payloads.
    fn metadata_json(&self, metadata: &BTreeMap<String, String>) -> serde_json::Value {
        let mut map: serde_json::Map<String, serde_json::Value> = metadata
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        map.insert("user_agent".to_string(), self.user_agent.clone().into());
        map.insert("v".to_string(), PAYLOAD_VERSION.into());
        serde_json::Value::Object(map)
    }

    /// Build a request descriptor for an API path.
    pub fn build_request(
        &self,
        method: &str,
        path: &str,
        auth: Option<&str>,
        query: Vec<(String, String)>,
        metadata: &BTreeMap<String, String>,
    ) -> HttpParams {
        let mut headers = BTreeMap::new();
        headers.insert("User-Agent".to_string(), self.user_agent.clone());
        headers.insert(
            METADATA_HEADER.to_string(),
            self.metadata_json(metadata).to_string(),
        );
        if let Some(auth) = auth {
            headers.insert(AUTH_HEADER.to_string(), auth.to_string());
        }

        tracing::debug!(method, path, authenticated = auth.is_some(), "building request");

        HttpParams {
            scheme: self.endpoint.scheme.clone(),
            hostname: self.endpoint.hostname.clone(),
            port: self.endpoint.port,
            method: method.to_string(),
            path: format!("{}{}", API_VERSION_PATH, path),
            headers,
            query,
        }
    }

    /// Execute a request, retrying recoverable transport failures.
    pub fn execute(&self, params: &HttpParams) -> Result<HttpResult> {
        let attempts = self.retry.max_attempts();
        let mut last_error = String::new();

        for attempt in 0..attempts {
            let result = self.requester.request(params);
            match result.code {
                HttpResult::CRITICAL_ERROR => {
                    tracing::warn!(path = %params.path, error = %result.error, "critical transport error");
                    return Err(PsiCashError::Transport(result.error));
                }
                HttpResult::RECOVERABLE_ERROR => {
                    tracing::warn!(
                        path = %params.path,
                        attempt = attempt + 1,
                        max_attempts = attempts,
                        error = %result.error,
                        "recoverable transport error"
                    );
                    last_error = result.error;
                    if attempt + 1 < attempts {
                        let delay = self.retry.backoff(attempt);
                        if !delay.is_zero() {
                            std::thread::sleep(delay);
                        }
                    }
                }
                code if code < 0 => {
                    return Err(PsiCashError::Transport(format!(
                        "requester returned unknown sentinel {}: {}",
                        code, result.error
                    )));
                }
                _ => return Ok(result),
            }
        }

        Err(PsiCashError::RetriesExhausted {
            attempts,
            reason: last_error,
        })
    }

    /// Obtain a fresh set of tracker tokens.
    pub fn new_tracker(
        &self,
        metadata: &BTreeMap<String, String>,
    ) -> Result<HashMap<TokenType, String>> {
        let params = self.build_request("POST", TRACKER_PATH, None, Vec::new(), metadata);
        let result = self.execute(&params)?;

        if result.code != 200 {
            return Err(PsiCashError::unexpected_response(result.code, &result.body));
        }

        let raw: HashMap<String, String> = serde_json::from_str(&result.body)?;
        let mut tokens = HashMap::new();
        for (name, value) in raw {
            match name.parse::<TokenType>() {
                Ok(TokenType::Account) => {
                    tracing::warn!("ignoring account token in tracker reply");
                }
                Ok(token_type) if !value.is_empty() => {
                    tokens.insert(token_type, value);
                }
                Ok(token_type) => {
                    tracing::warn!(token_type = %token_type, "empty token in tracker reply");
                }
                Err(_) => tracing::debug!(name = %name, "ignoring unknown token type"),
            }
        }

        for required in [TokenType::Earner, TokenType::Spender, TokenType::Indicator] {
            if !tokens.contains_key(&required) {
                return Err(PsiCashError::unexpected_response(
                    result.code,
                    &format!("tracker reply is missing the {} token", required),
                ));
            }
        }

        tracing::info!("obtained new tracker tokens");
        Ok(tokens)
    }

    /// Fetch balance, prices for `purchase_classes` and token validity.
    pub fn refresh_state(
        &self,
        tokens: &TokenStore,
        purchase_classes: &[String],
        metadata: &BTreeMap<String, String>,
    ) -> Result<RefreshOutcome> {
        let auth = tokens
            .auth_header_value()
            .ok_or_else(|| PsiCashError::MissingTokens("no valid tokens to refresh".to_string()))?;
        let query = purchase_classes
            .iter()
            .map(|c| ("class".to_string(), c.clone()))
            .collect();

        let params = self.build_request("GET", REFRESH_STATE_PATH, Some(&auth), query, metadata);
        let result = self.execute(&params)?;

        match result.code {
            200 => {
                let body: RefreshStateBody = serde_json::from_str(&result.body)?;
                let prices = body
                    .purchase_prices
                    .into_iter()
                    .map(|p| PurchasePrice {
                        transaction_class: p.class,
                        distinguisher: p.distinguisher,
                        price: p.price,
                    })
                    .collect();
                Ok(RefreshOutcome::Refreshed(RefreshReply {
                    tokens_valid: body.tokens_valid,
                    is_account: body.is_account,
                    balance: body.balance,
                    prices,
                    server_time_diff_ms: server_time_diff_ms(&result.date, Utc::now()),
                }))
            }
            401 => Ok(RefreshOutcome::InvalidTokens),
            500..=599 => Ok(RefreshOutcome::ServerError),
            code => Err(PsiCashError::unexpected_response(code, &result.body)),
        }
    }

    /// Ask the server to sell a (class, distinguisher) at `expected_price`.
    pub fn new_transaction(
        &self,
        spender_token: &str,
        transaction_class: &str,
        distinguisher: &str,
        expected_price: i64,
        metadata: &BTreeMap<String, String>,
    ) -> Result<TransactionReply> {
        let query = vec![
            ("class".to_string(), transaction_class.to_string()),
            ("distinguisher".to_string(), distinguisher.to_string()),
            // Spending is a negative amount from the server's point of view.
            ("expectedAmount".to_string(), (-expected_price).to_string()),
        ];
        let params =
            self.build_request("POST", TRANSACTION_PATH, Some(spender_token), query, metadata);
        let result = self.execute(&params)?;

        let status = Status::from_transaction_http_code(result.code)
            .ok_or_else(|| PsiCashError::unexpected_response(result.code, &result.body))?;
        let server_time_diff_ms = server_time_diff_ms(&result.date, Utc::now());

        if status != Status::Success {
            tracing::info!(status = %status, transaction_class, distinguisher, "transaction declined");
            return Ok(TransactionReply {
                status,
                confirmed: None,
                server_time_diff_ms,
            });
        }

        let body: TransactionBody = serde_json::from_str(&result.body)?;
        if body.transaction_id.is_empty() {
            return Err(PsiCashError::unexpected_response(
                result.code,
                "transaction reply has an empty TransactionID",
            ));
        }

        // The purchase is paid for; an unreadable authorization must not lose it.
        let authorization = match body.authorization.as_deref().filter(|a| !a.is_empty()) {
            Some(encoded) => match Authorization::decode(encoded) {
                Ok(auth) => Some(auth),
                Err(e) => {
                    tracing::warn!(
                        transaction_id = %body.transaction_id,
                        error = %e,
                        "dropping undecodable authorization"
                    );
                    None
                }
            },
            None => None,
        };

        Ok(TransactionReply {
            status,
            confirmed: Some(ConfirmedTransaction {
                transaction_id: body.transaction_id,
                server_time_expiry: body.server_time_expiry,
                authorization,
                balance: body.balance,
            }),
            server_time_diff_ms,
        })
    }

    /// Grant currency on the development server.
    pub fn reward(
        &self,
        earner_token: &str,
        transaction_class: &str,
        distinguisher: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<()> {
        let query = vec![
            ("class".to_string(), transaction_class.to_string()),
            ("distinguisher".to_string(), distinguisher.to_string()),
        ];
        let params =
            self.build_request("POST", TRANSACTION_PATH, Some(earner_token), query, metadata);
        let result = self.execute(&params)?;

        // A refused reward leaves the session usable.
        if result.code != 200 {
            return Err(PsiCashError::Recoverable(format!(
                "reward refused with HTTP {}: {}",
                result.code, result.body
            )));
        }
        Ok(())
    }

    // ========================================================================
    // Landing page helpers (no round trip)
    // ========================================================================

    /// Base64 JSON blob handed to PsiCash web properties.
    pub fn landing_page_payload(
        &self,
        earner_token: Option<&str>,
        metadata: &BTreeMap<String, String>,
    ) -> String {
        let payload = serde_json::json!({
            "v": PAYLOAD_VERSION,
            "tokens": earner_token,
            "metadata": self.metadata_json(metadata),
        });
        BASE64.encode(payload.to_string())
    }

    /// Base64 JSON blob proving the earner for rewarded activities.
    pub fn rewarded_activity_payload(
        &self,
        earner_token: &str,
        metadata: &BTreeMap<String, String>,
    ) -> String {
        let payload = serde_json::json!({
            "v": PAYLOAD_VERSION,
            "tokens": earner_token,
            "metadata": self.metadata_json(metadata),
            "user_agent": self.user_agent,
        });
        BASE64.encode(payload.to_string())
    }
}

/// Add `psicash=<payload>` to a URL's query, ahead of any fragment.
pub fn append_psicash_param(url: &str, payload: &str) -> Result<String> {
    if url.trim().is_empty() {
        return Err(PsiCashError::invalid_argument("url", "must not be empty"));
    }
    if !url.contains("://") {
        return Err(PsiCashError::invalid_argument(
            "url",
            format!("'{}' is not an absolute URL", url),
        ));
    }

    let (base, fragment) = match url.split_once('#') {
        Some((base, fragment)) => (base, Some(fragment)),
        None => (url, None),
    };
    let separator = if base.contains('?') { '&' } else { '?' };

    let mut out = format!(
        "{}{}psicash={}",
        base,
        separator,
        urlencoding::encode(payload)
    );
    if let Some(fragment) = fragment {
        out.push('#');
        out.push_str(fragment);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn engine_with<F>(f: F) -> SyncEngine
    where
        F: Fn(&HttpParams) -> HttpResult + Send + Sync + 'static,
    {
        SyncEngine::new(
            Arc::new(f),
            ServerEndpoint::development(),
            "psicash-test/1.0",
            RetryPolicy::no_delay(3),
        )
    }

    fn tracker_store() -> TokenStore {
        let mut tokens = TokenStore::new();
        tokens.replace_all(
            HashMap::from([
                (TokenType::Earner, "e".to_string()),
                (TokenType::Spender, "s".to_string()),
                (TokenType::Indicator, "i".to_string()),
            ]),
            false,
        );
        tokens
    }

    #[test]
    fn test_build_request_headers() {
        let engine = engine_with(|_| HttpResult::default());
        let metadata = BTreeMap::from([("client_version".to_string(), "42".to_string())]);
        let params = engine.build_request("GET", "/refresh-state", Some("a,b"), Vec::new(), &metadata);

        assert_eq!(params.path, "/v1/refresh-state");
        assert_eq!(params.hostname, "dev-api.psi.cash");
        assert_eq!(params.headers.get(AUTH_HEADER).unwrap(), "a,b");
        assert_eq!(params.headers.get("User-Agent").unwrap(), "psicash-test/1.0");

        let meta: serde_json::Value =
            serde_json::from_str(params.headers.get(METADATA_HEADER).unwrap()).unwrap();
        assert_eq!(meta["client_version"], "42");
        assert_eq!(meta["v"], 1);
        assert_eq!(meta["user_agent"], "psicash-test/1.0");
    }

    #[test]
    fn test_retries_recoverable_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let engine = engine_with(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) < 3 {
                HttpResult::recoverable("connection reset")
            } else {
                HttpResult::new(200, "{}", "", "")
            }
        });

        let params = engine.build_request("GET", "/x", None, Vec::new(), &BTreeMap::new());
        let result = engine.execute(&params).unwrap();
        assert_eq!(result.code, 200);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_retry_ceiling_is_critical() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let engine = engine_with(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            HttpResult::recoverable("timeout")
        });

        let params = engine.build_request("GET", "/x", None, Vec::new(), &BTreeMap::new());
        let err = engine.execute(&params).unwrap_err();
        assert!(err.is_critical());
        assert_eq!(
            err,
            PsiCashError::RetriesExhausted {
                attempts: 4,
                reason: "timeout".to_string()
            }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_critical_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let engine = engine_with(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            HttpResult::critical("malformed request")
        });

        let params = engine.build_request("GET", "/x", None, Vec::new(), &BTreeMap::new());
        let err = engine.execute(&params).unwrap_err();
        assert_eq!(err, PsiCashError::Transport("malformed request".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_http_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let engine = engine_with(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            HttpResult::new(503, "busy", "", "")
        });

        let outcome = engine
            .refresh_state(&tracker_store(), &[], &BTreeMap::new())
            .unwrap();
        assert_eq!(outcome, RefreshOutcome::ServerError);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_refresh_decodes_reply() {
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let engine = engine_with(move |p| {
            *sink.lock().unwrap() = Some(p.clone());
            HttpResult::new(
                200,
                r#"{"TokensValid":{"e":true,"s":false},"IsAccount":false,"Balance":100,
                    "PurchasePrices":[{"Class":"speed-boost","Distinguisher":"1hr","Price":100}]}"#,
                "Sun, 06 Nov 1994 08:49:37 GMT",
                "",
            )
        });

        let classes = vec!["speed-boost".to_string()];
        let outcome = engine
            .refresh_state(&tracker_store(), &classes, &BTreeMap::new())
            .unwrap();
        let RefreshOutcome::Refreshed(reply) = outcome else {
            panic!("expected a refreshed outcome");
        };
        assert_eq!(reply.balance, 100);
        assert_eq!(reply.tokens_valid.get("s"), Some(&false));
        assert_eq!(reply.prices.len(), 1);
        assert!(reply.server_time_diff_ms.unwrap() < 0);

        let params = seen.lock().unwrap().clone().unwrap();
        assert_eq!(params.method, "GET");
        assert_eq!(params.query_value("class"), Some("speed-boost"));
        assert_eq!(params.headers.get(AUTH_HEADER).unwrap(), "e,s,i");
    }

    #[test]
    fn test_refresh_without_tokens_fails_locally() {
        let engine = engine_with(|_| panic!("no request expected"));
        let err = engine
            .refresh_state(&TokenStore::new(), &[], &BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err, PsiCashError::MissingTokens(_)));
    }

    #[test]
    fn test_new_tracker_requires_all_tokens() {
        let engine = engine_with(|_| HttpResult::new(200, r#"{"earner":"e","spender":"s"}"#, "", ""));
        assert!(engine.new_tracker(&BTreeMap::new()).is_err());

        let engine = engine_with(|_| {
            HttpResult::new(
                200,
                r#"{"earner":"e","spender":"s","indicator":"i","bogus":"b"}"#,
                "",
                "",
            )
        });
        let tokens = engine.new_tracker(&BTreeMap::new()).unwrap();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[&TokenType::Spender], "s");
    }

    #[test]
    fn test_transaction_status_mapping() {
        for (code, status) in [
            (402, Status::InsufficientBalance),
            (409, Status::ExistingTransaction),
            (412, Status::TransactionAmountMismatch),
            (404, Status::TransactionTypeNotFound),
            (401, Status::InvalidTokens),
            (500, Status::ServerError),
        ] {
            let engine = engine_with(move |_| HttpResult::new(code, "", "", ""));
            let reply = engine
                .new_transaction("s", "speed-boost", "1hr", 100, &BTreeMap::new())
                .unwrap();
            assert_eq!(reply.status, status);
            assert!(reply.confirmed.is_none());
        }

        let engine = engine_with(|_| HttpResult::new(418, "teapot", "", ""));
        let err = engine
            .new_transaction("s", "speed-boost", "1hr", 100, &BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err, PsiCashError::UnexpectedResponse { code: 418, .. }));
    }

    #[test]
    fn test_transaction_success_keeps_purchase_with_bad_authorization() {
        let engine = engine_with(|p| {
            assert_eq!(p.query_value("expectedAmount"), Some("-100"));
            HttpResult::new(
                200,
                r#"{"TransactionID":"tx-1","ServerTimeExpiry":"2030-01-01T00:00:00Z",
                    "Authorization":"%%%","Balance":50}"#,
                "",
                "",
            )
        });
        let reply = engine
            .new_transaction("s", "speed-boost", "1hr", 100, &BTreeMap::new())
            .unwrap();
        let confirmed = reply.confirmed.unwrap();
        assert_eq!(confirmed.transaction_id, "tx-1");
        assert_eq!(confirmed.balance, Some(50));
        assert!(confirmed.authorization.is_none());
        assert!(confirmed.server_time_expiry.is_some());
    }

    #[test]
    fn test_server_time_diff() {
        let local = DateTime::parse_from_rfc3339("2020-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            server_time_diff_ms("Wed, 01 Jan 2020 00:00:05 GMT", local),
            Some(5000)
        );
        assert_eq!(server_time_diff_ms("", local), None);
        assert_eq!(server_time_diff_ms("yesterday", local), None);
    }

    #[test]
    fn test_reward_refusal_is_not_critical() {
        let engine = engine_with(|params| {
            assert_eq!(params.path, "/v1/transaction");
            HttpResult::new(400, "bad class", "", "")
        });

        let err = engine
            .reward("e", "nonexistent", "x", &BTreeMap::new())
            .unwrap_err();
        assert!(matches!(&err, PsiCashError::Recoverable(msg) if msg.contains("400")));
        assert!(!err.is_critical());

        let ok = engine_with(|_| HttpResult::new(200, "", "", ""));
        ok.reward("e", "speed-boost", "1hr", &BTreeMap::new()).unwrap();
    }

    #[test]
    fn test_append_psicash_param() {
        assert_eq!(
            append_psicash_param("https://psi.cash/landing", "abc=").unwrap(),
            "https://psi.cash/landing?psicash=abc%3D"
        );
        assert_eq!(
            append_psicash_param("https://psi.cash/l?x=1#frag", "p").unwrap(),
            "https://psi.cash/l?x=1&psicash=p#frag"
        );
        assert!(append_psicash_param("", "p").is_err());
        assert!(append_psicash_param("psi.cash", "p").is_err());
    }

    #[test]
    fn test_landing_page_payload() {
        let engine = engine_with(|_| HttpResult::default());
        let payload = engine.landing_page_payload(None, &BTreeMap::new());
        let decoded: serde_json::Value =
            serde_json::from_slice(&BASE64.decode(payload).unwrap()).unwrap();
        assert_eq!(decoded["v"], 1);
        assert!(decoded["tokens"].is_null());
        assert_eq!(decoded["metadata"]["user_agent"], "psicash-test/1.0");
    }
}

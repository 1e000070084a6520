//! Shared helpers for integration tests.

#![allow(dead_code)]

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use psicash_lib::{Config, HttpParams, HttpRequester, HttpResult, PsiCash, RetryPolicy};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};

pub const EARNER: &str = "earner-tok";
pub const SPENDER: &str = "spender-tok";
pub const INDICATOR: &str = "indicator-tok";

/// Install a subscriber once so `RUST_LOG=psicash_lib=debug` shows logs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Scripted server: replays queued results in order and records every request.
#[derive(Default)]
pub struct MockServer {
    inner: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    replies: VecDeque<HttpResult>,
    requests: Vec<HttpParams>,
}

impl MockServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, reply: HttpResult) {
        self.inner.lock().unwrap().replies.push_back(reply);
    }

    pub fn requests(&self) -> Vec<HttpParams> {
        self.inner.lock().unwrap().requests.clone()
    }

    pub fn call_count(&self) -> usize {
        self.inner.lock().unwrap().requests.len()
    }

    pub fn pending(&self) -> usize {
        self.inner.lock().unwrap().replies.len()
    }

    pub fn last_request(&self) -> HttpParams {
        self.requests()
            .pop()
            .expect("at least one request was made")
    }
}

impl HttpRequester for MockServer {
    fn request(&self, params: &HttpParams) -> HttpResult {
        let mut state = self.inner.lock().unwrap();
        state.requests.push(params.clone());
        state
            .replies
            .pop_front()
            .unwrap_or_else(|| HttpResult::critical("no scripted reply"))
    }
}

/// Test-mode session on `dir` with immediate retries.
pub fn new_session(dir: &Path, server: &Arc<MockServer>) -> PsiCash {
    init_tracing();
    let psicash = PsiCash::new();
    let config = Config::new("psicash-tests/1.0", dir, true)
        .with_retry_policy(RetryPolicy::no_delay(3));
    psicash
        .initialize_with_config(config, server.clone())
        .expect("initialize");
    psicash
}

/// Session that already holds tracker tokens and a refreshed catalog.
pub fn refreshed_session(
    dir: &Path,
    server: &Arc<MockServer>,
    balance: i64,
    prices: &[(&str, &str, i64)],
) -> PsiCash {
    let psicash = new_session(dir, server);
    server.push(tracker_reply());
    server.push(refresh_reply(balance, prices));
    let status = psicash.refresh_state::<&str>(&[]).expect("refresh");
    assert_eq!(status, psicash_lib::Status::Success);
    psicash
}

// ============================================================================
// Reply builders
// ============================================================================

pub fn json_reply(code: i32, body: serde_json::Value) -> HttpResult {
    HttpResult::new(code, body.to_string(), "", "")
}

pub fn tracker_reply() -> HttpResult {
    json_reply(
        200,
        serde_json::json!({ "earner": EARNER, "spender": SPENDER, "indicator": INDICATOR }),
    )
}

pub fn refresh_reply(balance: i64, prices: &[(&str, &str, i64)]) -> HttpResult {
    refresh_reply_with(balance, prices, true, false)
}

pub fn refresh_reply_with(
    balance: i64,
    prices: &[(&str, &str, i64)],
    tokens_valid: bool,
    is_account: bool,
) -> HttpResult {
    let prices: Vec<serde_json::Value> = prices
        .iter()
        .map(|(class, dist, price)| {
            serde_json::json!({ "Class": class, "Distinguisher": dist, "Price": price })
        })
        .collect();
    json_reply(
        200,
        serde_json::json!({
            "TokensValid": {
                EARNER: tokens_valid,
                SPENDER: tokens_valid,
                INDICATOR: tokens_valid,
            },
            "IsAccount": is_account,
            "Balance": balance,
            "PurchasePrices": prices,
        }),
    )
}

pub fn transaction_reply(
    transaction_id: &str,
    server_expiry: Option<DateTime<Utc>>,
    authorization: Option<String>,
    balance: i64,
) -> HttpResult {
    json_reply(
        200,
        serde_json::json!({
            "TransactionID": transaction_id,
            "ServerTimeExpiry": server_expiry,
            "Authorization": authorization,
            "Balance": balance,
        }),
    )
}

/// A signed authorization as the server encodes it.
pub fn encoded_authorization(id: &str, access_type: &str, expires: DateTime<Utc>) -> String {
    let signed = serde_json::json!({
        "Authorization": { "ID": id, "AccessType": access_type, "Expires": expires },
        "SigningKeyID": "a2V5",
        "Signature": "c2ln",
    });
    BASE64.encode(signed.to_string())
}

/// Decode a base64 JSON blob handed out by the library.
pub fn decode_blob(blob: &str) -> serde_json::Value {
    let bytes = BASE64.decode(blob).expect("base64");
    serde_json::from_slice(&bytes).expect("json")
}

//! Session configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Path prefix of every API request.
pub const API_VERSION_PATH: &str = "/v1";

/// Where the PsiCash API lives.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerEndpoint {
    pub scheme: String,
    pub hostname: String,
    pub port: u16,
}

impl ServerEndpoint {
    pub fn production() -> Self {
        Self {
            scheme: "https".to_string(),
            hostname: "api.psi.cash".to_string(),
            port: 443,
        }
    }

    pub fn development() -> Self {
        Self {
            scheme: "https".to_string(),
            hostname: "dev-api.psi.cash".to_string(),
            port: 443,
        }
    }

    pub fn for_mode(test: bool) -> Self {
        if test {
            Self::development()
        } else {
            Self::production()
        }
    }
}

/// Bounded exponential backoff for recoverable transport failures.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Total calls are `max_retries + 1`.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry, in milliseconds. Doubles per retry.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound for a single delay, in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    100
}

fn default_max_backoff_ms() -> u64 {
    2000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl RetryPolicy {
    /// Retry immediately. Meant for tests.
    pub fn no_delay(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
        }
    }

    /// Delay before retry number `retry` (0-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u64.checked_shl(retry).unwrap_or(u64::MAX);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }

    /// Upper bound on transport calls for one logical request.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

pub(crate) fn datastore_suffix_for(test: bool) -> &'static str {
    if test {
        ".dev"
    } else {
        ""
    }
}

/// Configuration for a [`crate::PsiCash`] session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Sent as `User-Agent` and inside the metadata header.
    pub user_agent: String,

    /// Directory holding persisted state. Must exist.
    pub file_store_root: PathBuf,

    /// Use the development server and keep data apart from production.
    #[serde(default)]
    pub test: bool,

    /// API server. Defaults to the preset for `test`.
    #[serde(default)]
    pub endpoint: Option<ServerEndpoint>,

    #[serde(default)]
    pub retry: RetryPolicy,

    /// Base of the buy-PsiCash landing page. Defaults to the preset for `test`.
    #[serde(default)]
    pub buy_base_url: Option<String>,
}

impl Config {
    pub fn new(user_agent: impl Into<String>, file_store_root: impl Into<PathBuf>, test: bool) -> Self {
        Self {
            user_agent: user_agent.into(),
            file_store_root: file_store_root.into(),
            test,
            endpoint: None,
            retry: RetryPolicy::default(),
            buy_base_url: None,
        }
    }

    /// Override the API server.
    pub fn with_endpoint(mut self, endpoint: ServerEndpoint) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Set the retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Override the buy-PsiCash landing page base.
    pub fn with_buy_base_url(mut self, url: impl Into<String>) -> Self {
        self.buy_base_url = Some(url.into());
        self
    }

    pub fn endpoint(&self) -> ServerEndpoint {
        self.endpoint
            .clone()
            .unwrap_or_else(|| ServerEndpoint::for_mode(self.test))
    }

    pub fn buy_base_url(&self) -> String {
        self.buy_base_url.clone().unwrap_or_else(|| {
            if self.test {
                "https://dev-buy.psi.cash/".to_string()
            } else {
                "https://buy.psi.cash/".to_string()
            }
        })
    }

    /// File-name suffix separating test data from production data.
    pub fn datastore_suffix(&self) -> &'static str {
        datastore_suffix_for(self.test)
    }
}

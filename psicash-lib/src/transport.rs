//! Transport collaborator interface.
//!
//! The core never opens sockets. It hands a [`HttpParams`] descriptor to an
//! embedder-supplied [`HttpRequester`] and interprets the returned
//! [`HttpResult`]. A result code is either an HTTP status or one of the two
//! sentinels [`HttpResult::CRITICAL_ERROR`] / [`HttpResult::RECOVERABLE_ERROR`]
//! signalling a transport-layer (not application-layer) failure.
//!
//! # Feature Flags
//!
//! `http-transport` adds [`ReqwestTransport`], a blocking reqwest requester.

use std::collections::BTreeMap;

/// Outbound request descriptor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpParams {
    pub scheme: String,
    pub hostname: String,
    pub port: u16,
    pub method: String,
    pub path: String,
    pub headers: BTreeMap<String, String>,
    /// Query pairs, in order. Keys may repeat.
    pub query: Vec<(String, String)>,
}

impl HttpParams {
    /// Full URL including the query string.
    pub fn make_url(&self) -> String {
        let mut url = format!("{}://{}:{}{}", self.scheme, self.hostname, self.port, self.path);
        if !self.query.is_empty() {
            let query = self
                .query
                .iter()
                .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
                .collect::<Vec<_>>()
                .join("&");
            url.push('?');
            url.push_str(&query);
        }
        url
    }

    /// Value of the first query pair with the given key.
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Result of executing an [`HttpParams`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HttpResult {
    /// HTTP status, or one of the transport sentinels.
    pub code: i32,
    pub body: String,
    /// Value of the `Date` response header, RFC 1123.
    pub date: String,
    /// Transport error description when `code` is a sentinel.
    pub error: String,
}

impl HttpResult {
    /// The request must not be retried (malformed request, local precondition).
    pub const CRITICAL_ERROR: i32 = -2;
    /// Transient transport failure (timeout, connection reset, DNS).
    pub const RECOVERABLE_ERROR: i32 = -1;

    pub fn new(
        code: i32,
        body: impl Into<String>,
        date: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            code,
            body: body.into(),
            date: date.into(),
            error: error.into(),
        }
    }

    pub fn critical(error: impl Into<String>) -> Self {
        Self::new(Self::CRITICAL_ERROR, "", "", error)
    }

    pub fn recoverable(error: impl Into<String>) -> Self {
        Self::new(Self::RECOVERABLE_ERROR, "", "", error)
    }

    pub fn is_transport_failure(&self) -> bool {
        self.code == Self::CRITICAL_ERROR || self.code == Self::RECOVERABLE_ERROR
    }
}

/// Executes requests on behalf of the core.
///
/// # Thread Safety
///
/// Implementations must be thread-safe (Send + Sync). The core calls
/// `request` from whichever caller thread holds the session write lock.
pub trait HttpRequester: Send + Sync {
    fn request(&self, params: &HttpParams) -> HttpResult;
}

impl<F> HttpRequester for F
where
    F: Fn(&HttpParams) -> HttpResult + Send + Sync,
{
    fn request(&self, params: &HttpParams) -> HttpResult {
        self(params)
    }
}

/// Blocking reqwest implementation of [`HttpRequester`].
#[cfg(feature = "http-transport")]
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

#[cfg(feature = "http-transport")]
impl ReqwestTransport {
    /// Create a transport with the given per-request timeout.
    pub fn new(timeout: std::time::Duration) -> crate::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                crate::PsiCashError::Internal(format!("Failed to build HTTP client: {}", e))
            })?;
        Ok(Self { client })
    }

    fn map_reqwest_error(e: reqwest::Error) -> HttpResult {
        if e.is_timeout() || e.is_connect() || e.is_request() {
            HttpResult::recoverable(e.to_string())
        } else {
            HttpResult::critical(e.to_string())
        }
    }
}

#[cfg(feature = "http-transport")]
impl HttpRequester for ReqwestTransport {
    fn request(&self, params: &HttpParams) -> HttpResult {
        let method = match reqwest::Method::from_bytes(params.method.as_bytes()) {
            Ok(m) => m,
            Err(e) => return HttpResult::critical(format!("invalid method: {}", e)),
        };

        let mut builder = self.client.request(method, params.make_url());
        for (name, value) in &params.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = match builder.send() {
            Ok(r) => r,
            Err(e) => return Self::map_reqwest_error(e),
        };

        let code = i32::from(response.status().as_u16());
        let date = response
            .headers()
            .get(reqwest::header::DATE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        match response.text() {
            Ok(body) => HttpResult::new(code, body, date, ""),
            Err(e) => Self::map_reqwest_error(e),
        }
    }
}

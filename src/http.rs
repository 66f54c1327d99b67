//! Minimal HTTP client used by every component of the harness.
//!
//! All requests funnel through [`HttpClient::execute`], which folds both
//! genuine responses and failures into a single [`HttpResult`]. Callers never
//! see a transport error: an error status (>= 400), a connection failure or a
//! malformed URL all come back as `HttpResult { ok: false, .. }`.

use base64::{Engine, engine::general_purpose::STANDARD};
use log::debug;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::fmt;
use url::Url;

/// Bodies longer than this are truncated in log output.
pub const BODY_DISPLAY_LIMIT: usize = 150;

/// Status reported when no HTTP response was received at all.
pub const NO_RESPONSE_STATUS: u16 = 0;

/// Outcome of a single HTTP round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResult {
    /// Response status, or the error's status code
    pub status: u16,
    /// Response body, or the error's reason phrase
    pub body: String,
    /// Whether the request completed without a transport-level error
    pub ok: bool,
}

impl HttpResult {
    /// A successfully received response.
    pub fn success(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            ok: true,
        }
    }

    /// A failed round trip carrying the error's code and reason.
    pub fn error(status: u16, reason: impl Into<String>) -> Self {
        Self {
            status,
            body: reason.into(),
            ok: false,
        }
    }

    /// Deserialize the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_str(&self.body)
    }
}

impl fmt::Display for HttpResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.body.chars().count() > BODY_DISPLAY_LIMIT {
            let head: String = self.body.chars().take(BODY_DISPLAY_LIMIT).collect();
            write!(f, "HTTP status: {}, body: {}... (truncated)", self.status, head)
        } else {
            write!(f, "HTTP status: {}, body: {}", self.status, self.body)
        }
    }
}

/// Build the value of a basic `Authorization` header.
pub fn basic_auth_value(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
}

/// Build the value of a bearer `Authorization` header.
pub fn bearer_auth_value(access_token: &str) -> String {
    format!("Bearer {access_token}")
}

/// GET/POST client that never propagates transport errors.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    allow_plain_http: bool,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Create a client that only accepts HTTPS URLs.
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    /// Create a client around an existing reqwest client.
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            allow_plain_http: false,
        }
    }

    /// Accept `http://` URLs as well, e.g. for local mock servers.
    pub fn allow_plain_http(mut self, allow: bool) -> Self {
        self.allow_plain_http = allow;
        self
    }

    /// Perform a GET request.
    pub async fn get(
        &self,
        url: &str,
        access_token: Option<&str>,
        extra_headers: &[(&str, &str)],
    ) -> HttpResult {
        let parsed = match self.validate_url(url) {
            Ok(parsed) => parsed,
            Err(rejected) => return rejected,
        };
        let request = self.client.get(parsed);
        self.execute("GET", url, request, access_token, extra_headers).await
    }

    /// Perform a POST request with a pre-encoded body.
    pub async fn post(
        &self,
        url: &str,
        body: Option<Vec<u8>>,
        access_token: Option<&str>,
        extra_headers: &[(&str, &str)],
    ) -> HttpResult {
        let parsed = match self.validate_url(url) {
            Ok(parsed) => parsed,
            Err(rejected) => return rejected,
        };
        let mut request = self.client.post(parsed);
        if let Some(body) = body {
            request = request.body(body);
        }
        self.execute("POST", url, request, access_token, extra_headers).await
    }

    fn validate_url(&self, url: &str) -> Result<Url, HttpResult> {
        let parsed = Url::parse(url).map_err(|e| {
            HttpResult::error(NO_RESPONSE_STATUS, format!("Invalid URL '{url}': {e}"))
        })?;
        match parsed.scheme() {
            "https" => Ok(parsed),
            "http" if self.allow_plain_http => Ok(parsed),
            scheme => Err(HttpResult::error(
                NO_RESPONSE_STATUS,
                format!("Refusing '{scheme}' URL '{url}', HTTPS required"),
            )),
        }
    }

    async fn execute(
        &self,
        method: &str,
        url: &str,
        mut request: RequestBuilder,
        access_token: Option<&str>,
        extra_headers: &[(&str, &str)],
    ) -> HttpResult {
        if let Some(token) = access_token {
            debug!("adding HTTP header Authorization -> Bearer ***");
            request = request.header("Authorization", bearer_auth_value(token));
        }
        for (name, value) in extra_headers {
            debug!("adding HTTP header {name}");
            request = request.header(*name, *value);
        }

        debug!(
            "Performing {method} request to {url}{}",
            if access_token.is_some() {
                " using access token"
            } else {
                ""
            }
        );

        let result = match request.send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_client_error() || status.is_server_error() {
                    let reason = status.canonical_reason().unwrap_or("Unknown Status");
                    HttpResult::error(status.as_u16(), reason)
                } else {
                    match response.text().await {
                        Ok(body) => HttpResult::success(status.as_u16(), body),
                        Err(e) => HttpResult::error(status.as_u16(), e.to_string()),
                    }
                }
            }
            Err(e) => HttpResult::error(
                e.status().map_or(NO_RESPONSE_STATUS, |s| s.as_u16()),
                e.to_string(),
            ),
        };

        debug!("Response: {result}");
        result
    }
}

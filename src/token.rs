//! OAuth2 token endpoint client.
//!
//! Supports the grant types the identity service exposes to the harness:
//! resource-owner password, client credentials and refresh token, plus a raw
//! pass-through for any other `grant_type` the endpoint accepts.

use crate::http::{HttpClient, HttpResult};
use log::{debug, error};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Path of the token endpoint relative to the issuer URL.
pub const TOKEN_ENDPOINT_PATH: &str = "/oauth/token";

/// Credentials exchanged for a token, one variant per grant type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grant {
    /// Resource-owner password credentials
    Password { username: String, password: String },
    /// Client credentials only
    ClientCredentials,
    /// A refresh token issued by an earlier password grant
    RefreshToken(String),
    /// Any other grant type with optional user fields passed through verbatim
    Raw {
        grant_type: String,
        username: Option<String>,
        password: Option<String>,
    },
}

impl Grant {
    /// Password grant for the given user.
    pub fn password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Password {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Refresh-token grant.
    pub fn refresh(refresh_token: impl Into<String>) -> Self {
        Self::RefreshToken(refresh_token.into())
    }

    /// Wire value of the `grant_type` parameter.
    pub fn grant_type(&self) -> &str {
        match self {
            Self::Password { .. } => "password",
            Self::ClientCredentials => "client_credentials",
            Self::RefreshToken(_) => "refresh_token",
            Self::Raw { grant_type, .. } => grant_type,
        }
    }

    fn form_fields(&self) -> Vec<(&'static str, &str)> {
        match self {
            Self::Password { username, password } => {
                vec![("username", username.as_str()), ("password", password.as_str())]
            }
            Self::ClientCredentials => Vec::new(),
            Self::RefreshToken(token) => vec![("refresh_token", token.as_str())],
            Self::Raw {
                username, password, ..
            } => {
                let mut fields = Vec::new();
                if let Some(username) = username {
                    fields.push(("username", username.as_str()));
                }
                if let Some(password) = password {
                    fields.push(("password", password.as_str()));
                }
                fields
            }
        }
    }
}

/// Token endpoint response.
///
/// Only `access_token` is required. The well-known fields are decoded into
/// typed accessors and the whole response stays available through
/// [`get`](Self::get).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: Option<String>,
    pub expires_in: Option<u64>,
    pub scope: Option<String>,
    raw: Map<String, Value>,
}

impl TokenResponse {
    /// Look up any field of the response by name.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.raw.get(field)
    }
}

impl TryFrom<Map<String, Value>> for TokenResponse {
    type Error = String;

    fn try_from(raw: Map<String, Value>) -> Result<Self, Self::Error> {
        let text = |field: &str| raw.get(field).and_then(Value::as_str).map(str::to_string);
        let access_token = text("access_token")
            .ok_or_else(|| "token response has no access_token".to_string())?;
        Ok(Self {
            access_token,
            refresh_token: text("refresh_token"),
            token_type: text("token_type"),
            expires_in: raw.get("expires_in").and_then(Value::as_u64),
            scope: text("scope"),
            raw,
        })
    }
}

/// Requests tokens from the identity service.
///
/// A fresh token is requested on every call; nothing is cached.
#[derive(Debug, Clone)]
pub struct TokenService {
    http: HttpClient,
}

impl TokenService {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    /// Request a token from `{issuer_url}/oauth/token`.
    ///
    /// Returns `None` (after logging) when the endpoint call fails or its
    /// body is not a token response.
    pub async fn acquire(
        &self,
        issuer_url: &str,
        client_id: &str,
        client_secret: &str,
        grant: &Grant,
    ) -> Option<TokenResponse> {
        let body = match token_request_body(client_id, client_secret, grant) {
            Ok(body) => body,
            Err(e) => {
                error!("Could not encode token request: {e}");
                return None;
            }
        };
        let url = format!("{}{}", issuer_url.trim_end_matches('/'), TOKEN_ENDPOINT_PATH);
        debug!("Requesting {} token from {url}", grant.grant_type());

        let response = self
            .http
            .post(
                &url,
                Some(body.into_bytes()),
                None,
                &[("Content-Type", "application/x-www-form-urlencoded")],
            )
            .await;
        parse_token_response(&response)
    }
}

/// Form-encode the token request parameters.
pub fn token_request_body(
    client_id: &str,
    client_secret: &str,
    grant: &Grant,
) -> Result<String, serde_urlencoded::ser::Error> {
    let mut params = vec![
        ("client_id", client_id),
        ("client_secret", client_secret),
        ("grant_type", grant.grant_type()),
        ("response_type", "token"),
    ];
    params.extend(grant.form_fields());
    serde_urlencoded::to_string(params)
}

fn parse_token_response(response: &HttpResult) -> Option<TokenResponse> {
    if !response.ok {
        error!("Could not retrieve access token: {response}");
        return None;
    }
    match response.json::<TokenResponse>() {
        Ok(token) => Some(token),
        Err(e) => {
            error!("Could not parse token response: {e}");
            None
        }
    }
}

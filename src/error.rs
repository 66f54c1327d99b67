//! Error types for harness operations.
//!
//! Transport failures never show up here: the HTTP client folds them into
//! [`HttpResult`](crate::http::HttpResult). What remains are missing
//! prerequisites (which abort the run), failed assertions (which fail a
//! single test case) and local setup problems.

use std::fmt;

/// Kind of prerequisite a verification flow could not find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prerequisite {
    /// Deployed application in the targeted space
    Application,
    /// Identity-service user record
    User,
    /// OAuth2 access token
    AccessToken,
    /// Identity-service binding in the application environment
    ServiceBinding,
    /// Credentials of a service key
    ServiceKey,
}

impl fmt::Display for Prerequisite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Application => write!(f, "application"),
            Self::User => write!(f, "user"),
            Self::AccessToken => write!(f, "access token"),
            Self::ServiceBinding => write!(f, "service binding"),
            Self::ServiceKey => write!(f, "service key"),
        }
    }
}

/// Main error type for harness operations.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// A resource the flow depends on does not exist
    #[error("Could not find {kind}: {name}")]
    PrerequisiteNotFound { kind: Prerequisite, name: String },

    /// A probe did not produce the expected outcome
    #[error("Assertion failed: {message}")]
    AssertionFailed { message: String },

    /// An upstream call returned something we cannot work with
    #[error("Unexpected response from {context}: {message}")]
    UnexpectedResponse { context: String, message: String },

    /// Invalid or incomplete configuration
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// A test body panicked
    #[error("Test case panicked: {message}")]
    Panicked { message: String },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// vars file parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Process spawning and terminal I/O
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// URL construction errors
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl HarnessError {
    /// Create a missing-prerequisite error
    pub fn not_found(kind: Prerequisite, name: impl Into<String>) -> Self {
        Self::PrerequisiteNotFound {
            kind,
            name: name.into(),
        }
    }

    /// Create an assertion failure
    pub fn assertion(message: impl Into<String>) -> Self {
        Self::AssertionFailed {
            message: message.into(),
        }
    }

    /// Create an unexpected-response error
    pub fn unexpected(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UnexpectedResponse {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Whether this error must stop the whole run rather than a single case.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::PrerequisiteNotFound { .. }
                | Self::UnexpectedResponse { .. }
                | Self::Config { .. }
        )
    }
}

/// Result type for harness operations
pub type HarnessResult<T> = Result<T, HarnessError>;

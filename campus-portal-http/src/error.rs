//! Client error types.

use thiserror::Error;

/// Errors returned by [`AuthenticatedClient`](crate::AuthenticatedClient).
#[derive(Debug, Error)]
pub enum ClientError {
    /// Non-2xx response that is not a recoverable authorization failure.
    #[error("HTTP error {status}: {body}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// Credentials could not be refreshed, or were rejected after a refresh.
    #[error("Session expired")]
    AuthExpired,

    /// The request (or the refresh it waited on) timed out.
    #[error("Timeout")]
    Timeout,

    /// Transport-level failure.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The caller cancelled the request.
    #[error("Request cancelled")]
    Cancelled,

    /// The request path could not be joined onto the base URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The success body did not match the expected shape.
    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Other error.
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl ClientError {
    /// Create an HTTP error.
    pub fn http(status: u16, body: impl Into<String>) -> Self {
        Self::Http {
            status,
            body: body.into(),
        }
    }

    /// Get the HTTP status if this is an HTTP error.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Check if the session is gone and the caller should log in again.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::AuthExpired)
    }

    /// Check if this is a transport-level failure.
    ///
    /// Network errors are never retried here; callers decide.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Timeout | Self::Connection(_))
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout
        } else if err.is_connect() || err.is_request() {
            ClientError::Connection(err.to_string())
        } else if err.is_decode() {
            ClientError::Other(anyhow::anyhow!("failed to read response body: {err}"))
        } else {
            ClientError::Other(err.into())
        }
    }
}

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Reasons a refresh cycle failed.
///
/// Every variant is terminal for the cycle: queued callers are rejected with
/// [`ClientError::AuthExpired`].
#[derive(Debug, Error)]
pub enum RefreshError {
    /// The refresh endpoint answered with a non-2xx status.
    #[error("refresh rejected with HTTP {status}: {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// The refresh call did not complete in time.
    #[error("refresh timed out")]
    Timeout,

    /// Transport-level failure while refreshing.
    #[error("refresh transport error: {0}")]
    Transport(String),

    /// No refresh token is stored.
    #[error("no refresh token available")]
    MissingRefreshToken,

    /// Rotation is required but the endpoint returned no new refresh token.
    #[error("refresh response did not rotate the refresh token")]
    MissingRotation,

    /// The refresh response body could not be decoded.
    #[error("invalid refresh response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for RefreshError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RefreshError::Timeout
        } else if err.is_decode() {
            RefreshError::Decode(err.to_string())
        } else {
            RefreshError::Transport(err.to_string())
        }
    }
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is not set.
    #[error("missing environment variable {0}")]
    MissingVar(&'static str),

    /// An environment variable holds an unusable value.
    #[error("invalid value for {name}: {value}")]
    InvalidVar {
        /// Variable name.
        name: &'static str,
        /// Offending value.
        value: String,
    },

    /// The base URL does not parse.
    #[error("invalid base URL: {0}")]
    BaseUrl(#[from] url::ParseError),
}

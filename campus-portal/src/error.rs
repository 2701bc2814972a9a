//! Error types for portal services.

use campus_portal_http::{ClientError, ConfigError};
use thiserror::Error;

/// Errors returned by the portal services.
#[derive(Debug, Error)]
pub enum PortalError {
    /// Transport, HTTP or session error from the underlying client.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// The client could not be configured.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The backend answered 2xx but reported a failure in its envelope.
    #[error("API error: {message}")]
    Api {
        /// Message reported by the backend.
        message: String,
    },
}

impl PortalError {
    /// Create an API error.
    pub fn api(message: impl Into<String>) -> Self {
        Self::Api {
            message: message.into(),
        }
    }

    /// Check if the user has to log in again.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::Client(e) if e.is_auth_expired())
    }

    /// Get the HTTP status if the backend answered with a non-2xx status.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Client(e) => e.status(),
            Self::Config(_) | Self::Api { .. } => None,
        }
    }
}

/// Result type for portal services.
pub type PortalResult<T> = Result<T, PortalError>;

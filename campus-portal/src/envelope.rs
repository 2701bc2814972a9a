//! The backend's response envelope.

use crate::error::{PortalError, PortalResult};
use serde::Deserialize;

/// `{ "success": bool, "data": T, "message": string }` as returned by the
/// portal backend.
///
/// `success` defaults to `true` so that endpoints returning only `data`
/// decode too.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    /// Whether the backend considers the call successful.
    #[serde(default = "default_success")]
    pub success: bool,
    /// Payload.
    pub data: Option<T>,
    /// Human-readable message.
    #[serde(default)]
    pub message: Option<String>,
}

fn default_success() -> bool {
    true
}

impl<T> ApiEnvelope<T> {
    /// Unwrap a payload that must be present.
    pub fn into_result(self) -> PortalResult<T> {
        match self.into_option()? {
            Some(data) => Ok(data),
            None => Err(PortalError::api("response carried no data")),
        }
    }

    /// Unwrap a payload that may legitimately be `null`.
    pub fn into_option(self) -> PortalResult<Option<T>> {
        if !self.success {
            return Err(PortalError::api(
                self.message.unwrap_or_else(|| "request failed".to_string()),
            ));
        }
        Ok(self.data)
    }
}

//! Exchanging a refresh token for a new access token.

use crate::config::ClientConfig;
use crate::error::RefreshError;
use crate::session::TokenPair;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Mints new credentials from a refresh token.
///
/// Implementations only talk to the token endpoint; storing the result is the
/// client's job.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Exchange `refresh_token` for a new pair.
    ///
    /// The returned pair's `refresh_token` is `None` when the endpoint did
    /// not issue a new one.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, RefreshError>;
}

/// Body sent to the refresh endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest<'a> {
    /// The stored refresh token.
    pub refresh_token: &'a str,
}

/// Tokens returned by the refresh endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    /// New access token.
    pub access_token: String,
    /// New refresh token, if rotated.
    #[serde(default)]
    pub refresh_token: Option<String>,
}

// Accepts both the bare payload and the portal's `{ "data": ... }` envelope.
#[derive(Deserialize)]
#[serde(untagged)]
enum RefreshBody {
    Bare(RefreshResponse),
    Wrapped { data: RefreshResponse },
}

impl From<RefreshResponse> for TokenPair {
    fn from(resp: RefreshResponse) -> Self {
        TokenPair {
            access_token: resp.access_token,
            refresh_token: resp.refresh_token,
        }
    }
}

/// Refresher that POSTs `{ "refreshToken": ... }` to the refresh endpoint.
#[derive(Debug, Clone)]
pub struct HttpTokenRefresher {
    client: Client,
    url: Url,
    timeout: Duration,
}

impl HttpTokenRefresher {
    /// Create a refresher for the given endpoint.
    pub fn new(client: Client, url: Url, timeout: Duration) -> Self {
        Self {
            client,
            url,
            timeout,
        }
    }

    /// Create a refresher for the endpoint named in `config`.
    pub fn from_config(client: Client, config: &ClientConfig) -> Result<Self, url::ParseError> {
        let url = config.endpoint(&config.refresh_path)?;
        Ok(Self::new(client, url, config.refresh_timeout))
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, RefreshError> {
        debug!(url = %self.url, "Calling refresh endpoint");

        let response = self
            .client
            .post(self.url.clone())
            .timeout(self.timeout)
            .json(&RefreshRequest { refresh_token })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RefreshError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        let body: RefreshBody =
            serde_json::from_slice(&bytes).map_err(|e| RefreshError::Decode(e.to_string()))?;

        let tokens = match body {
            RefreshBody::Bare(resp) | RefreshBody::Wrapped { data: resp } => resp,
        };
        if tokens.access_token.is_empty() {
            return Err(RefreshError::Decode("empty access token".into()));
        }

        Ok(tokens.into())
    }
}

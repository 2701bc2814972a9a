//! Client configuration.

use crate::error::ConfigError;
use std::time::Duration;
use url::Url;

/// What to do when a refresh response carries no new refresh token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RefreshTokenPolicy {
    /// Keep using the stored refresh token.
    #[default]
    KeepExisting,
    /// Treat the refresh as failed. Use with backends that rotate refresh tokens.
    RequireRotation,
}

/// Configuration for [`AuthenticatedClient`](crate::AuthenticatedClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL every request path is joined onto.
    pub base_url: Url,
    /// Path of the refresh endpoint, relative to `base_url`.
    pub refresh_path: String,
    /// Timeout applied to every outbound request unless overridden per call.
    pub request_timeout: Duration,
    /// Timeout applied to the refresh call.
    pub refresh_timeout: Duration,
    /// Refresh-token rotation policy.
    pub refresh_token_policy: RefreshTokenPolicy,
    /// Capacity of the session event channel.
    pub event_capacity: usize,
}

impl ClientConfig {
    /// Default refresh endpoint path.
    pub const DEFAULT_REFRESH_PATH: &'static str = "/user/auth/refresh";
    /// Default per-request timeout.
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
    /// Default refresh timeout.
    pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(10);

    /// Create a config for the given base URL with default settings.
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            refresh_path: Self::DEFAULT_REFRESH_PATH.to_string(),
            request_timeout: Self::DEFAULT_REQUEST_TIMEOUT,
            refresh_timeout: Self::DEFAULT_REFRESH_TIMEOUT,
            refresh_token_policy: RefreshTokenPolicy::default(),
            event_capacity: 16,
        }
    }

    /// Parse the base URL and create a config.
    pub fn parse(base_url: &str) -> Result<Self, ConfigError> {
        Ok(Self::new(Url::parse(base_url)?))
    }

    /// Create from environment variables.
    ///
    /// - `PORTAL_API_URL` (required)
    /// - `PORTAL_REFRESH_PATH`
    /// - `PORTAL_REQUEST_TIMEOUT_SECS`
    /// - `PORTAL_REFRESH_TIMEOUT_SECS`
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url =
            std::env::var("PORTAL_API_URL").map_err(|_| ConfigError::MissingVar("PORTAL_API_URL"))?;
        let mut config = Self::parse(&base_url)?;

        if let Ok(path) = std::env::var("PORTAL_REFRESH_PATH") {
            config = config.with_refresh_path(path);
        }
        if let Some(secs) = secs_from_env("PORTAL_REQUEST_TIMEOUT_SECS")? {
            config = config.with_request_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = secs_from_env("PORTAL_REFRESH_TIMEOUT_SECS")? {
            config = config.with_refresh_timeout(Duration::from_secs(secs));
        }

        Ok(config)
    }

    /// Set the refresh endpoint path.
    pub fn with_refresh_path(mut self, path: impl Into<String>) -> Self {
        self.refresh_path = path.into();
        self
    }

    /// Set the default request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the refresh timeout.
    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    /// Set the refresh-token policy.
    pub fn with_refresh_token_policy(mut self, policy: RefreshTokenPolicy) -> Self {
        self.refresh_token_policy = policy;
        self
    }

    /// Set the session event channel capacity.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Join a request path onto the base URL.
    ///
    /// Leading slashes are ignored so that `/user/me` stays under a base URL
    /// that carries its own path prefix (e.g. `https://host/api/`).
    pub fn endpoint(&self, path: &str) -> Result<Url, url::ParseError> {
        let mut base = self.base_url.clone();
        if !base.path().ends_with('/') {
            let with_slash = format!("{}/", base.path());
            base.set_path(&with_slash);
        }
        base.join(path.trim_start_matches('/'))
    }
}

fn secs_from_env(name: &'static str) -> Result<Option<u64>, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidVar { name, value }),
        Err(_) => Ok(None),
    }
}

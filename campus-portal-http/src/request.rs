//! Request descriptors.

use reqwest::Method;
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Per-call options.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Deadline for the whole call, including any wait on a refresh.
    pub timeout: Option<Duration>,
    /// Token that aborts the call when cancelled.
    pub cancel: Option<CancellationToken>,
    /// Extra headers sent with the request.
    pub headers: Vec<(String, String)>,
    /// Send without credentials and report a 401 like any other status.
    pub public: bool,
}

impl RequestOptions {
    /// Create empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a deadline for the call.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Abort the call when `token` is cancelled.
    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Send without credentials (login and similar endpoints).
    pub fn public(mut self) -> Self {
        self.public = true;
        self
    }

    /// Add a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// An immutable description of one logical request.
///
/// The post-refresh retry is a new descriptor produced by
/// [`retried`](Self::retried); the original is never mutated.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    /// HTTP method.
    pub method: Method,
    /// Path relative to the base URL.
    pub path: String,
    /// JSON body.
    pub body: Option<Value>,
    /// Per-call options.
    pub options: RequestOptions,
    /// 0 for the first send, 1 for the single retry after a refresh.
    pub attempt: u32,
}

impl RequestDescriptor {
    /// Create a first-attempt descriptor.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            options: RequestOptions::default(),
            attempt: 0,
        }
    }

    /// Attach a JSON body.
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Set per-call options.
    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    /// Check if this is the post-refresh retry.
    pub fn is_retry(&self) -> bool {
        self.attempt > 0
    }

    /// Descriptor for the retry after a refresh.
    pub fn retried(&self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self.clone()
        }
    }
}

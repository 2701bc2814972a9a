//! # campus-portal-http
//!
//! Authenticated HTTP client for the campus portal backend.
//!
//! Every request carries the stored access token. When the backend answers
//! 401, the client refreshes the credentials once, shares that single refresh
//! with every other request failing at the same time, and retries each of
//! them once with the new token. If the refresh fails, every waiting caller
//! gets [`ClientError::AuthExpired`], the stored credentials are cleared and
//! a [`SessionEvent::Terminated`] is broadcast.
//!
//! ## Core Concepts
//!
//! - **[`AuthenticatedClient`]**: Issues requests and recovers from expired tokens
//! - **[`SessionStore`]**: Where the access/refresh tokens live
//! - **[`TokenRefresher`]**: Exchanges a refresh token for new credentials
//! - **[`RefreshCoordinator`]**: Ensures one refresh per expiry event
//! - **[`ClientConfig`]**: Base URL, timeouts and refresh policy
//!
//! ## Example
//!
//! ```ignore
//! use campus_portal_http::prelude::*;
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemorySessionStore::with_tokens(TokenPair::new("at", "rt")));
//! let client = AuthenticatedClient::new(ClientConfig::from_env()?, store)?;
//!
//! let grades: serde_json::Value = client.get_json("/enrollment/grades/123").await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod client;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod queue;
pub mod refresh;
pub mod request;
pub mod session;

// Re-exports
pub use client::{AuthenticatedClient, AuthenticatedClientBuilder, SessionEvent};
pub use config::{ClientConfig, RefreshTokenPolicy};
pub use coordinator::{Join, RefreshCoordinator, RefreshCycle, Ticket};
pub use error::{ClientError, ClientResult, ConfigError, RefreshError};
pub use queue::{PendingQueue, RefreshOutcome, Resumed, Turn, Waiter};
pub use refresh::{HttpTokenRefresher, RefreshRequest, RefreshResponse, TokenRefresher};
pub use request::{RequestDescriptor, RequestOptions};
pub use session::{FileSessionStore, MemorySessionStore, SessionStore, TokenPair};

/// Prelude for common imports.
pub mod prelude {
    pub use crate::{
        AuthenticatedClient, ClientConfig, ClientError, ClientResult, MemorySessionStore,
        RequestOptions, SessionEvent, SessionStore, TokenPair,
    };
}

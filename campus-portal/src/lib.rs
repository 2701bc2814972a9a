//! # campus-portal
//!
//! Typed client for the campus portal REST API.
//!
//! Requests go through a shared [`AuthenticatedClient`] that attaches the
//! session's access token and, when the token expires, refreshes it once for
//! every request that noticed. Callers only see an error when the session is
//! truly gone ([`PortalError::is_auth_expired`]); that is the cue to send the
//! user back to the login screen.
//!
//! ## Quick Start
//!
//! ```ignore
//! use campus_portal::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), PortalError> {
//!     let portal = Portal::from_env(Arc::new(MemorySessionStore::new()))?;
//!
//!     let user = portal.session().login("rafi@uni.edu", "hunter2").await?;
//!     let access = portal.academic().chat_access(&user, "b-2024").await?;
//!     if access.can_pin {
//!         println!("{} may pin messages", user.id);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Session Teardown
//!
//! ```ignore
//! let mut events = portal.client().subscribe();
//! while let Ok(event) = events.recv().await {
//!     if event == SessionEvent::Terminated {
//!         // redirect to login
//!     }
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`campus_portal_http`] - Authenticated client and refresh coordination
//! - [`services`] - One wrapper per backend domain
//! - [`chat`] - Batch chat permissions

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// ============================================================================
// Modules
// ============================================================================

pub mod chat;
pub mod envelope;
pub mod error;
pub mod models;
pub mod services;

// ============================================================================
// Re-exports
// ============================================================================

/// Authenticated HTTP client.
pub use campus_portal_http as http;

pub use campus_portal_http::{
    AuthenticatedClient, ClientConfig, ClientError, FileSessionStore, MemorySessionStore,
    RefreshTokenPolicy, RequestOptions, SessionEvent, SessionStore, TokenPair,
};
pub use chat::ChatAccess;
pub use envelope::ApiEnvelope;
pub use error::{PortalError, PortalResult};
pub use models::{ClassRepresentative, CurrentUser, Grade, Role};
pub use services::{AcademicService, EnrollmentService, Portal, SessionService};

// ============================================================================
// Prelude
// ============================================================================

/// Prelude for common imports.
pub mod prelude {
    pub use crate::{
        AuthenticatedClient, ChatAccess, ClientConfig, CurrentUser, MemorySessionStore, Portal,
        PortalError, PortalResult, Role, SessionEvent, SessionStore, TokenPair,
    };
}

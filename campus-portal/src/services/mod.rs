//! Typed wrappers over the portal's REST domains.
//!
//! Each service borrows nothing: it holds a clone of the shared
//! [`AuthenticatedClient`], so token refresh is coordinated across all of
//! them.

mod academic;
mod enrollment;
mod session;

pub use academic::AcademicService;
pub use enrollment::EnrollmentService;
pub use session::SessionService;

use crate::error::PortalResult;
use campus_portal_http::{AuthenticatedClient, ClientConfig, SessionStore};
use std::sync::Arc;

/// Entry point bundling every service over one client.
#[derive(Debug, Clone)]
pub struct Portal {
    client: AuthenticatedClient,
}

impl Portal {
    /// Create from an existing client.
    pub fn new(client: AuthenticatedClient) -> Self {
        Self { client }
    }

    /// Create from `PORTAL_*` environment variables with the given store.
    pub fn from_env(store: Arc<dyn SessionStore>) -> PortalResult<Self> {
        let config = ClientConfig::from_env()?;
        Ok(Self::new(AuthenticatedClient::new(config, store)?))
    }

    /// The underlying client.
    pub fn client(&self) -> &AuthenticatedClient {
        &self.client
    }

    /// Login, logout and profile.
    pub fn session(&self) -> SessionService {
        SessionService::new(self.client.clone())
    }

    /// Batches and class representatives.
    pub fn academic(&self) -> AcademicService {
        AcademicService::new(self.client.clone())
    }

    /// Grades and enrollments.
    pub fn enrollment(&self) -> EnrollmentService {
        EnrollmentService::new(self.client.clone())
    }
}

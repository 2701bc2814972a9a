use crate::chat::ChatAccess;
use crate::envelope::ApiEnvelope;
use crate::error::{PortalError, PortalResult};
use crate::models::{ClassRepresentative, CurrentUser};
use campus_portal_http::AuthenticatedClient;
use tracing::debug;

/// Batches and their class representatives.
#[derive(Debug, Clone)]
pub struct AcademicService {
    client: AuthenticatedClient,
}

impl AcademicService {
    /// Create a new service.
    pub fn new(client: AuthenticatedClient) -> Self {
        Self { client }
    }

    /// The batch's current class representative, if one is appointed.
    pub async fn class_representative(
        &self,
        batch_id: &str,
    ) -> PortalResult<Option<ClassRepresentative>> {
        let path = format!("/academic/batches/{batch_id}/class-representative");
        match self.client.get_json::<ApiEnvelope<ClassRepresentative>>(&path).await {
            Ok(envelope) => envelope.into_option(),
            // The backend answers 404 when no representative is appointed.
            Err(e) if e.status() == Some(404) => Ok(None),
            Err(e) => Err(PortalError::from(e)),
        }
    }

    /// Resolve what `user` may do in the batch chat.
    pub async fn chat_access(&self, user: &CurrentUser, batch_id: &str) -> PortalResult<ChatAccess> {
        let representative = self.class_representative(batch_id).await?;
        let access = ChatAccess::resolve(user, representative.as_ref());
        debug!(
            batch = batch_id,
            user = %user.id,
            can_pin = access.can_pin,
            "Resolved chat access"
        );
        Ok(access)
    }
}

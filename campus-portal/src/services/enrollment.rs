use crate::envelope::ApiEnvelope;
use crate::error::PortalResult;
use crate::models::Grade;
use campus_portal_http::AuthenticatedClient;

/// Grades and enrollments.
#[derive(Debug, Clone)]
pub struct EnrollmentService {
    client: AuthenticatedClient,
}

impl EnrollmentService {
    /// Create a new service.
    pub fn new(client: AuthenticatedClient) -> Self {
        Self { client }
    }

    /// All grades recorded for a student.
    pub async fn grades(&self, student_id: &str) -> PortalResult<Vec<Grade>> {
        let path = format!("/enrollment/grades/{student_id}");
        let envelope: ApiEnvelope<Vec<Grade>> = self.client.get_json(&path).await?;
        Ok(envelope.into_option()?.unwrap_or_default())
    }
}

//! Payload types exchanged with the portal backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Portal role of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Administrator.
    Admin,
    /// Moderator.
    Moderator,
    /// Teaching staff.
    Teacher,
    /// Non-teaching staff (librarians).
    Staff,
    /// Student.
    Student,
}

/// The logged-in user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    /// User id.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Email address.
    #[serde(default)]
    pub email: Option<String>,
    /// Role.
    pub role: Role,
    /// Student record id, for students.
    #[serde(default)]
    pub student_id: Option<String>,
}

/// Credentials posted to the login endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    /// Email address.
    pub email: &'a str,
    /// Password.
    pub password: &'a str,
}

/// Login response payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    /// Access token.
    pub access_token: String,
    /// Refresh token.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// The user that logged in.
    pub user: CurrentUser,
}

/// A batch's current class representative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRepresentative {
    /// User id of the representative.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Student record id of the representative.
    #[serde(default)]
    pub student_id: Option<String>,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// When the representative was appointed.
    #[serde(default)]
    pub assigned_at: Option<DateTime<Utc>>,
}

impl ClassRepresentative {
    /// Check if `user` is this representative.
    ///
    /// Compares user ids when the record has one, student ids otherwise.
    pub fn represents(&self, user: &CurrentUser) -> bool {
        match (&self.user_id, &self.student_id) {
            (Some(user_id), _) => *user_id == user.id,
            (None, Some(student_id)) => user.student_id.as_deref() == Some(student_id.as_str()),
            (None, None) => false,
        }
    }
}

/// One course grade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grade {
    /// Course code, e.g. `CSE101`.
    pub course_code: String,
    /// Course title.
    #[serde(default)]
    pub course_title: Option<String>,
    /// Letter grade.
    pub grade: String,
    /// Grade point.
    #[serde(default)]
    pub grade_point: Option<f32>,
    /// Credit hours.
    #[serde(default)]
    pub credits: Option<f32>,
    /// Semester label.
    #[serde(default)]
    pub semester: Option<String>,
}

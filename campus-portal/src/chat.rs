//! Batch chat permissions.

use crate::models::{ClassRepresentative, CurrentUser, Role};

/// What a user may do in a batch chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatAccess {
    /// May read messages.
    pub can_read: bool,
    /// May post messages.
    pub can_post: bool,
    /// May pin messages.
    pub can_pin: bool,
    /// The user is the batch's class representative.
    pub is_class_representative: bool,
}

impl ChatAccess {
    /// Resolve access for `user` given the batch's current representative.
    ///
    /// Pinning is reserved for the class representative and for admins,
    /// moderators and teachers.
    pub fn resolve(user: &CurrentUser, representative: Option<&ClassRepresentative>) -> Self {
        let is_class_representative = representative.is_some_and(|cr| cr.represents(user));
        let elevated = matches!(user.role, Role::Admin | Role::Moderator | Role::Teacher);

        Self {
            can_read: true,
            can_post: true,
            can_pin: is_class_representative || elevated,
            is_class_representative,
        }
    }
}

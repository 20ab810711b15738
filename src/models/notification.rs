//! Notification requests handed to the `Notifier` sink.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    OwnerValidationRequest,
    VariableApproved,
    OwnerRejected,
    InvolvementCreated,
    InvolvementDateSet,
    InvolvementCompleted,
    InvolvementOverdue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationPriority {
    Low,
    Normal,
    High,
    Urgent,
}

/// A message for a collaborator. Delivery is best-effort: failures are logged
/// and never abort the transition that produced them.
#[derive(Debug, Clone)]
pub struct NotificationRequest {
    pub collaborator_id: i64,
    pub kind: NotificationType,
    pub priority: NotificationPriority,
    pub title: String,
    pub message: String,
    pub action_url: Option<String>,
    pub case_id: Option<i64>,
    pub variable_id: Option<i64>,
}

//! Notification sink.
//!
//! Workflow transitions notify owners and requesters. Delivery is best-effort
//! and must never abort the caller's write path: `notify_best_effort` logs
//! failures and returns.

use async_trait::async_trait;
use sqlx::SqlitePool;
use thiserror::Error;

use crate::models::NotificationRequest;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, request: NotificationRequest) -> Result<(), NotifyError>;
}

/// Persists notifications to the `notifications` table, where the web layer
/// (out of scope here) picks them up.
pub struct DbNotifier {
    pool: SqlitePool,
}

impl DbNotifier {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Notifier for DbNotifier {
    async fn send(&self, request: NotificationRequest) -> Result<(), NotifyError> {
        sqlx::query(
            r#"INSERT INTO notifications
               (collaborator_id, type, priority, title, message, action_url, case_id, variable_id)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(request.collaborator_id)
        .bind(request.kind)
        .bind(request.priority)
        .bind(&request.title)
        .bind(&request.message)
        .bind(&request.action_url)
        .bind(request.case_id)
        .bind(request.variable_id)
        .execute(&self.pool)
        .await
        .map_err(|e| NotifyError::Delivery(e.to_string()))?;

        Ok(())
    }
}

/// Send a notification, logging failures instead of propagating them.
pub async fn notify_best_effort(notifier: &dyn Notifier, request: NotificationRequest) {
    let collaborator = request.collaborator_id;
    if let Err(e) = notifier.send(request).await {
        tracing::warn!("notification to collaborator {} dropped: {}", collaborator, e);
    }
}

//! Durable feedback entries driving the historical scorer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeedbackOutcome {
    Approved,
    Rejected,
    Modified,
}

impl FeedbackOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Modified => "MODIFIED",
        }
    }
}

/// One recorded decision. Append-only; aggregates are derived per
/// `(concept_hash, table_id)` and cached with a TTL.
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct DecisionRecord {
    pub id: i64,
    pub request_id: String,
    /// 16-hex digest of the salient intent fields.
    pub concept_hash: String,
    pub domain_id: Option<String>,
    pub owner_id: Option<i64>,
    pub table_id: i64,
    pub outcome: FeedbackOutcome,
    /// Required (and distinct from `table_id`) when outcome is MODIFIED.
    pub actual_table_id: Option<i64>,
    pub confidence_at_decision: f64,
    pub use_case: String,
    pub created_at: DateTime<Utc>,
}

/// Input for `FeedbackStore::record_decision`.
#[derive(Debug, Clone)]
pub struct NewDecisionRecord {
    pub request_id: String,
    pub concept_hash: String,
    pub domain_id: Option<String>,
    pub owner_id: Option<i64>,
    pub table_id: i64,
    pub outcome: FeedbackOutcome,
    pub actual_table_id: Option<i64>,
    pub confidence_at_decision: f64,
    pub use_case: String,
}

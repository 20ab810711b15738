//! Data-creation requests ("envolvimentos").
//!
//! Raised when an owner confirms ownership but states the data does not exist
//! yet. Coupled to an external ticket; the scheduler nags the owner once per
//! day after the expected date passes.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvolvementStatus {
    /// Waiting for owner to set expected date
    Pending,
    /// Date set, work in progress
    InProgress,
    /// Owner informed created table/concept
    Completed,
    /// Past expected date, pending completion
    Overdue,
}

#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct Involvement {
    pub id: i64,
    pub case_variable_id: i64,
    pub external_request_number: String,
    pub external_system: Option<String>,
    pub requester_id: i64,
    pub owner_id: i64,
    pub expected_completion_date: Option<NaiveDate>,
    pub actual_completion_date: Option<NaiveDate>,
    pub created_table_name: Option<String>,
    pub created_concept: Option<String>,
    pub status: InvolvementStatus,
    pub notes: Option<String>,
    pub last_reminder_at: Option<DateTime<Utc>>,
    pub reminder_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Involvement {
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        match self.expected_completion_date {
            Some(expected) if self.status != InvolvementStatus::Completed => today > expected,
            _ => false,
        }
    }

    /// Days past the expected date (0 when not overdue).
    pub fn days_overdue(&self, today: NaiveDate) -> i64 {
        if !self.is_overdue(today) {
            return 0;
        }
        let expected = self.expected_completion_date.expect("overdue requires a date");
        (today - expected).num_days()
    }
}

/// Aggregated involvement counts for the stats endpoint.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct InvolvementStats {
    pub total: i64,
    pub pending: i64,
    pub in_progress: i64,
    pub overdue: i64,
    pub completed: i64,
    pub avg_completion_slip_days: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn involvement(status: InvolvementStatus, expected: Option<NaiveDate>) -> Involvement {
        Involvement {
            id: 1,
            case_variable_id: 1,
            external_request_number: "REQ-123".into(),
            external_system: Some("ServiceNow".into()),
            requester_id: 1,
            owner_id: 2,
            expected_completion_date: expected,
            actual_completion_date: None,
            created_table_name: None,
            created_concept: None,
            status,
            notes: None,
            last_reminder_at: None,
            reminder_count: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn overdue_requires_a_past_expected_date() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 15).unwrap();
        let past = NaiveDate::from_ymd_opt(2025, 6, 10).unwrap();
        let future = NaiveDate::from_ymd_opt(2025, 6, 20).unwrap();

        assert!(involvement(InvolvementStatus::InProgress, Some(past)).is_overdue(today));
        assert!(!involvement(InvolvementStatus::InProgress, Some(future)).is_overdue(today));
        assert!(!involvement(InvolvementStatus::InProgress, None).is_overdue(today));
        assert!(!involvement(InvolvementStatus::Completed, Some(past)).is_overdue(today));
        assert_eq!(involvement(InvolvementStatus::Overdue, Some(past)).days_overdue(today), 5);
    }
}

//! Involvement subflow tests.

use chrono::{Duration, Utc};

use super::common::*;
use crate::models::{InvolvementStatus, VariableStatus};
use crate::services::involvement_service::{
    CompleteInvolvementInput, CreateInvolvementInput, InvolvementFilter, SetExpectedDateInput,
};
use crate::utils::ApiError;

fn create_input(fixture: &WorkflowFixture) -> CreateInvolvementInput {
    CreateInvolvementInput {
        case_variable_id: fixture.variable_id,
        external_request_number: "REQ-4711".to_string(),
        external_system: Some("ServiceNow".to_string()),
        owner_id: fixture.owner_id,
        notes: None,
    }
}

#[tokio::test]
async fn creation_moves_the_variable_to_pending_involvement() {
    let fixture = workflow_fixture().await;

    let involvement = fixture
        .involvements
        .create(create_input(&fixture), fixture.requester_id)
        .await
        .expect("creation succeeds");

    assert_eq!(involvement.status, InvolvementStatus::Pending);
    assert_eq!(involvement.external_request_number, "REQ-4711");

    let status: VariableStatus =
        sqlx::query_scalar("SELECT search_status FROM case_variables WHERE id = ?")
            .bind(fixture.variable_id)
            .fetch_one(&fixture.pool)
            .await
            .unwrap();
    assert_eq!(status, VariableStatus::PendingInvolvement);

    // Owner is asked to set an expected date.
    assert_eq!(notification_count_for(&fixture.pool, fixture.owner_id).await, 1);
}

#[tokio::test]
async fn at_most_one_active_involvement_per_variable() {
    let fixture = workflow_fixture().await;

    fixture
        .involvements
        .create(create_input(&fixture), fixture.requester_id)
        .await
        .unwrap();

    let err = fixture
        .involvements
        .create(create_input(&fixture), fixture.requester_id)
        .await
        .expect_err("duplicate rejected");
    assert!(matches!(err, ApiError::Conflict(_)));
}

#[tokio::test]
async fn owner_sets_the_expected_date() {
    let fixture = workflow_fixture().await;
    let involvement = fixture
        .involvements
        .create(create_input(&fixture), fixture.requester_id)
        .await
        .unwrap();

    let expected = (Utc::now() + Duration::days(15)).date_naive();

    // Only the owner may set the date.
    let err = fixture
        .involvements
        .set_expected_date(
            involvement.id,
            SetExpectedDateInput { expected_completion_date: expected, notes: None },
            fixture.requester_id,
        )
        .await
        .expect_err("requester cannot set the date");
    assert!(matches!(err, ApiError::Validation(_)));

    let updated = fixture
        .involvements
        .set_expected_date(
            involvement.id,
            SetExpectedDateInput {
                expected_completion_date: expected,
                notes: Some("Fonte entra no lake na próxima sprint".to_string()),
            },
            fixture.owner_id,
        )
        .await
        .expect("owner sets the date");

    assert_eq!(updated.status, InvolvementStatus::InProgress);
    assert_eq!(updated.expected_completion_date, Some(expected));
    assert!(updated.notes.as_deref().unwrap().contains("próxima sprint"));
}

#[tokio::test]
async fn completion_returns_the_variable_to_matched() {
    let fixture = workflow_fixture().await;
    let involvement = fixture
        .involvements
        .create(create_input(&fixture), fixture.requester_id)
        .await
        .unwrap();

    let updated = fixture
        .involvements
        .complete(
            involvement.id,
            CompleteInvolvementInput {
                created_table_name: "tb_vendas_diaria_spec".to_string(),
                created_concept: "Vendas diárias por contrato".to_string(),
                notes: None,
            },
            fixture.owner_id,
        )
        .await
        .expect("completion succeeds");

    assert_eq!(updated.status, InvolvementStatus::Completed);
    assert_eq!(updated.created_table_name.as_deref(), Some("tb_vendas_diaria_spec"));
    assert!(updated.actual_completion_date.is_some());

    let status: VariableStatus =
        sqlx::query_scalar("SELECT search_status FROM case_variables WHERE id = ?")
            .bind(fixture.variable_id)
            .fetch_one(&fixture.pool)
            .await
            .unwrap();
    assert_eq!(status, VariableStatus::Matched);

    // Completing twice is a conflict.
    let err = fixture
        .involvements
        .complete(
            involvement.id,
            CompleteInvolvementInput {
                created_table_name: "tb_outra".to_string(),
                created_concept: "outro".to_string(),
                notes: None,
            },
            fixture.owner_id,
        )
        .await
        .expect_err("double completion rejected");
    assert!(matches!(err, ApiError::Conflict(_)));
}

#[tokio::test]
async fn completion_requires_table_name_and_concept() {
    let fixture = workflow_fixture().await;
    let involvement = fixture
        .involvements
        .create(create_input(&fixture), fixture.requester_id)
        .await
        .unwrap();

    let err = fixture
        .involvements
        .complete(
            involvement.id,
            CompleteInvolvementInput {
                created_table_name: "  ".to_string(),
                created_concept: "conceito".to_string(),
                notes: None,
            },
            fixture.owner_id,
        )
        .await
        .expect_err("blank table name rejected");
    assert!(matches!(err, ApiError::Validation(_)));
}

#[tokio::test]
async fn overdue_sweep_marks_and_reminds_once_per_day() {
    let fixture = workflow_fixture().await;
    let involvement = fixture
        .involvements
        .create(create_input(&fixture), fixture.requester_id)
        .await
        .unwrap();

    // Expected date in the past.
    let past = (Utc::now() - Duration::days(3)).date_naive();
    fixture
        .involvements
        .set_expected_date(
            involvement.id,
            SetExpectedDateInput { expected_completion_date: past, notes: None },
            fixture.owner_id,
        )
        .await
        .unwrap();

    let sent = fixture.involvements.send_overdue_reminders().await.unwrap();
    assert_eq!(sent, 1);

    let after_first = fixture.involvements.get(involvement.id).await.unwrap();
    assert_eq!(after_first.status, InvolvementStatus::Overdue);
    assert_eq!(after_first.reminder_count, 1);
    assert!(after_first.last_reminder_at.is_some());

    // Same day: the sweep does not nag again.
    let sent_again = fixture.involvements.send_overdue_reminders().await.unwrap();
    assert_eq!(sent_again, 0);
    let after_second = fixture.involvements.get(involvement.id).await.unwrap();
    assert_eq!(after_second.reminder_count, 1);
}

#[tokio::test]
async fn stats_count_per_status() {
    let fixture = workflow_fixture().await;
    fixture
        .involvements
        .create(create_input(&fixture), fixture.requester_id)
        .await
        .unwrap();

    let stats = fixture.involvements.stats(None).await.unwrap();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.pending, 1);
    assert_eq!(stats.completed, 0);

    let filtered = fixture.involvements.stats(Some(fixture.owner_id)).await.unwrap();
    assert_eq!(filtered.total, 1);

    let listing = fixture
        .involvements
        .list(&InvolvementFilter { owner_id: Some(fixture.owner_id), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(listing.len(), 1);
}

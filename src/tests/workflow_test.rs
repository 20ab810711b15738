//! Workflow state machine tests.

use super::common::*;
use crate::models::{
    MatchStatus, OwnerResponseType, RequesterResponseType, VariableStatus,
};
use crate::services::workflow_service::{OwnerResponseInput, RequesterResponseInput};
use crate::utils::ApiError;

async fn select(fixture: &WorkflowFixture) {
    fixture
        .workflow
        .select_match(fixture.variable_id, fixture.match_id, fixture.requester_id)
        .await
        .expect("selection succeeds");
}

async fn confirm(fixture: &WorkflowFixture) {
    fixture
        .workflow
        .owner_respond(
            fixture.match_id,
            fixture.owner_id,
            OwnerResponseType::ConfirmMatch,
            OwnerResponseInput {
                usage_criteria: Some("Usar apenas dados fechados do mês".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("confirm succeeds");
}

async fn variable_status(fixture: &WorkflowFixture) -> VariableStatus {
    sqlx::query_scalar("SELECT search_status FROM case_variables WHERE id = ?")
        .bind(fixture.variable_id)
        .fetch_one(&fixture.pool)
        .await
        .unwrap()
}

async fn match_status(fixture: &WorkflowFixture, match_id: i64) -> MatchStatus {
    sqlx::query_scalar("SELECT status FROM variable_matches WHERE id = ?")
        .bind(match_id)
        .fetch_one(&fixture.pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn selection_moves_match_to_owner_review() {
    let fixture = workflow_fixture().await;
    select(&fixture).await;

    assert_eq!(match_status(&fixture, fixture.match_id).await, MatchStatus::PendingOwner);
    assert_eq!(variable_status(&fixture).await, VariableStatus::OwnerReview);

    // Table owner was notified, and exactly one history row exists.
    assert_eq!(notification_count_for(&fixture.pool, fixture.owner_id).await, 1);
    let history = history_rows_for(&fixture.pool, fixture.variable_id).await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].0, "MATCH_SELECTED");
}

#[tokio::test]
async fn selecting_twice_is_a_conflict_without_state_change() {
    let fixture = workflow_fixture().await;
    select(&fixture).await;

    let err = fixture
        .workflow
        .select_match(fixture.variable_id, fixture.match_id, fixture.requester_id)
        .await
        .expect_err("second selection rejected");
    assert!(matches!(err, ApiError::Conflict(_)));

    assert_eq!(match_status(&fixture, fixture.match_id).await, MatchStatus::PendingOwner);
    assert_eq!(history_rows_for(&fixture.pool, fixture.variable_id).await.len(), 1);
}

#[tokio::test]
async fn owner_confirm_hands_over_to_requester() {
    let fixture = workflow_fixture().await;
    select(&fixture).await;
    confirm(&fixture).await;

    assert_eq!(match_status(&fixture, fixture.match_id).await, MatchStatus::PendingRequester);
    assert_eq!(variable_status(&fixture).await, VariableStatus::RequesterReview);
    // Requester got the confirmation request.
    assert!(notification_count_for(&fixture.pool, fixture.requester_id).await >= 1);
}

#[tokio::test]
async fn confirm_without_usage_criteria_is_rejected() {
    let fixture = workflow_fixture().await;
    select(&fixture).await;

    let err = fixture
        .workflow
        .owner_respond(
            fixture.match_id,
            fixture.owner_id,
            OwnerResponseType::ConfirmMatch,
            OwnerResponseInput::default(),
        )
        .await
        .expect_err("missing usage criteria");
    assert!(matches!(err, ApiError::Validation(_)));

    // No state change, no response row, no extra history.
    assert_eq!(match_status(&fixture, fixture.match_id).await, MatchStatus::PendingOwner);
    let responses: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM owner_responses WHERE variable_match_id = ?")
            .bind(fixture.match_id)
            .fetch_one(&fixture.pool)
            .await
            .unwrap();
    assert_eq!(responses, 0);
}

#[tokio::test]
async fn owner_data_not_exist_routes_to_involvement() {
    let fixture = workflow_fixture().await;
    select(&fixture).await;

    fixture
        .workflow
        .owner_respond(
            fixture.match_id,
            fixture.owner_id,
            OwnerResponseType::DataNotExist,
            OwnerResponseInput {
                notes: Some("Ainda não ingerimos essa fonte".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("data-not-exist succeeds");

    assert_eq!(match_status(&fixture, fixture.match_id).await, MatchStatus::Rejected);
    assert_eq!(variable_status(&fixture).await, VariableStatus::PendingInvolvement);

    // Case creator was told to open the involvement.
    assert!(notification_count_for(&fixture.pool, fixture.requester_id).await >= 1);

    let history = history_rows_for(&fixture.pool, fixture.variable_id).await;
    let last = history.last().unwrap();
    assert_eq!(last.0, "OWNER_DATA_NOT_EXIST");
    assert_eq!(last.1, "NEGATIVE");
}

#[tokio::test]
async fn owner_correct_table_redirects_to_the_new_owner() {
    let fixture = workflow_fixture().await;
    select(&fixture).await;

    let other_owner = insert_collaborator(&fixture.pool, "Paula Dona").await;
    let correct_table = insert_table(&fixture.pool, "tb_vendas_sot", other_owner).await;

    fixture
        .workflow
        .owner_respond(
            fixture.match_id,
            fixture.owner_id,
            OwnerResponseType::CorrectTable,
            OwnerResponseInput {
                suggested_table_id: Some(correct_table),
                ..Default::default()
            },
        )
        .await
        .expect("correct-table succeeds");

    assert_eq!(match_status(&fixture, fixture.match_id).await, MatchStatus::Redirected);
    assert_eq!(variable_status(&fixture).await, VariableStatus::OwnerReview);

    // A new selected match exists for the corrected table, pending its owner.
    let (new_match_id, new_status, is_selected): (i64, MatchStatus, bool) = sqlx::query_as(
        "SELECT id, status, is_selected FROM variable_matches WHERE case_variable_id = ? AND data_table_id = ?",
    )
    .bind(fixture.variable_id)
    .bind(correct_table)
    .fetch_one(&fixture.pool)
    .await
    .unwrap();
    assert_eq!(new_status, MatchStatus::PendingOwner);
    assert!(is_selected);
    assert_ne!(new_match_id, fixture.match_id);

    // Single-selection invariant holds after the redirect.
    let selected: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM variable_matches WHERE case_variable_id = ? AND is_selected = TRUE",
    )
    .bind(fixture.variable_id)
    .fetch_one(&fixture.pool)
    .await
    .unwrap();
    assert_eq!(selected, 1);

    // The new owner was notified.
    assert_eq!(notification_count_for(&fixture.pool, other_owner).await, 1);
}

#[tokio::test]
async fn owner_correct_table_requires_an_active_table() {
    let fixture = workflow_fixture().await;
    select(&fixture).await;

    let err = fixture
        .workflow
        .owner_respond(
            fixture.match_id,
            fixture.owner_id,
            OwnerResponseType::CorrectTable,
            OwnerResponseInput { suggested_table_id: Some(9999), ..Default::default() },
        )
        .await
        .expect_err("unknown table rejected");
    assert!(matches!(err, ApiError::Validation(_)));
    assert_eq!(match_status(&fixture, fixture.match_id).await, MatchStatus::PendingOwner);
}

#[tokio::test]
async fn owner_delegate_person_keeps_the_match_pending_under_the_new_owner() {
    let fixture = workflow_fixture().await;
    select(&fixture).await;

    let delegate = insert_collaborator(&fixture.pool, "Marcos Delegado").await;

    fixture
        .workflow
        .owner_respond(
            fixture.match_id,
            fixture.owner_id,
            OwnerResponseType::DelegatePerson,
            OwnerResponseInput { delegate_to_id: Some(delegate), ..Default::default() },
        )
        .await
        .expect("delegation succeeds");

    let (status, owner_id): (MatchStatus, Option<i64>) =
        sqlx::query_as("SELECT status, owner_id FROM variable_matches WHERE id = ?")
            .bind(fixture.match_id)
            .fetch_one(&fixture.pool)
            .await
            .unwrap();
    assert_eq!(status, MatchStatus::PendingOwner);
    assert_eq!(owner_id, Some(delegate));
    assert_eq!(notification_count_for(&fixture.pool, delegate).await, 1);
}

#[tokio::test]
async fn owner_delegate_area_clears_the_selection() {
    let fixture = workflow_fixture().await;
    select(&fixture).await;

    fixture
        .workflow
        .owner_respond(
            fixture.match_id,
            fixture.owner_id,
            OwnerResponseType::DelegateArea,
            OwnerResponseInput {
                delegate_area_name: Some("Dados Corporativos".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("area delegation succeeds");

    assert_eq!(match_status(&fixture, fixture.match_id).await, MatchStatus::Redirected);
    assert_eq!(variable_status(&fixture).await, VariableStatus::Matched);

    let selected_match: Option<i64> =
        sqlx::query_scalar("SELECT selected_match_id FROM case_variables WHERE id = ?")
            .bind(fixture.variable_id)
            .fetch_one(&fixture.pool)
            .await
            .unwrap();
    assert!(selected_match.is_none());
}

#[tokio::test]
async fn requester_approval_finalizes_and_feeds_the_learning_store() {
    let fixture = workflow_fixture().await;
    select(&fixture).await;
    confirm(&fixture).await;

    fixture
        .workflow
        .requester_respond(
            fixture.match_id,
            fixture.requester_id,
            RequesterResponseType::Approve,
            RequesterResponseInput::default(),
        )
        .await
        .expect("approval succeeds");

    assert_eq!(match_status(&fixture, fixture.match_id).await, MatchStatus::Approved);
    assert_eq!(variable_status(&fixture).await, VariableStatus::Approved);

    // The approval landed in the feedback store.
    let records = fixture
        .feedback
        .records_for_request(&format!("wf-match-{}", fixture.match_id))
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].table_id, fixture.table_id);
}

#[tokio::test]
async fn requester_rejection_needs_a_reason_and_loops_back() {
    let fixture = workflow_fixture().await;
    select(&fixture).await;
    confirm(&fixture).await;

    // Too-short reason: validation error, no state change.
    let err = fixture
        .workflow
        .requester_respond(
            fixture.match_id,
            fixture.requester_id,
            RequesterResponseType::RejectWrongData,
            RequesterResponseInput {
                rejection_reason: Some("curto".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect_err("short reason rejected");
    assert!(matches!(err, ApiError::Validation(_)));
    assert_eq!(match_status(&fixture, fixture.match_id).await, MatchStatus::PendingRequester);

    // Proper rejection loops back to the owner.
    fixture
        .workflow
        .requester_respond(
            fixture.match_id,
            fixture.requester_id,
            RequesterResponseType::RejectWrongGranularity,
            RequesterResponseInput {
                rejection_reason: Some("Preciso de granularidade diária, não mensal".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("rejection succeeds");

    assert_eq!(match_status(&fixture, fixture.match_id).await, MatchStatus::PendingOwner);
    assert_eq!(variable_status(&fixture).await, VariableStatus::OwnerReview);

    let loop_count: i64 = sqlx::query_scalar(
        "SELECT MAX(loop_count) FROM requester_responses WHERE variable_match_id = ?",
    )
    .bind(fixture.match_id)
    .fetch_one(&fixture.pool)
    .await
    .unwrap();
    assert_eq!(loop_count, 1);

    // Second round: confirm again, reject again, loop count grows.
    confirm(&fixture).await;
    fixture
        .workflow
        .requester_respond(
            fixture.match_id,
            fixture.requester_id,
            RequesterResponseType::RejectIncomplete,
            RequesterResponseInput {
                rejection_reason: Some("Faltam os campos de canal e carteira".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("second rejection succeeds");

    let loop_count: i64 = sqlx::query_scalar(
        "SELECT MAX(loop_count) FROM requester_responses WHERE variable_match_id = ?",
    )
    .bind(fixture.match_id)
    .fetch_one(&fixture.pool)
    .await
    .unwrap();
    assert_eq!(loop_count, 2);
}

#[tokio::test]
async fn requester_respond_in_wrong_state_is_a_conflict() {
    let fixture = workflow_fixture().await;
    select(&fixture).await;

    let err = fixture
        .workflow
        .requester_respond(
            fixture.match_id,
            fixture.requester_id,
            RequesterResponseType::Approve,
            RequesterResponseInput::default(),
        )
        .await
        .expect_err("not pending requester");
    assert!(matches!(err, ApiError::Conflict(_)));
}

#[tokio::test]
async fn only_the_case_creator_marks_a_variable_in_use() {
    let fixture = workflow_fixture().await;
    select(&fixture).await;
    confirm(&fixture).await;
    fixture
        .workflow
        .requester_respond(
            fixture.match_id,
            fixture.requester_id,
            RequesterResponseType::Approve,
            RequesterResponseInput::default(),
        )
        .await
        .unwrap();

    let stranger = insert_collaborator(&fixture.pool, "Zé Alheio").await;
    let err = fixture
        .workflow
        .mark_in_use(fixture.variable_id, stranger)
        .await
        .expect_err("stranger cannot mark in use");
    assert!(matches!(err, ApiError::Validation(_)));

    let variable = fixture
        .workflow
        .mark_in_use(fixture.variable_id, fixture.requester_id)
        .await
        .expect("creator marks in use");
    assert_eq!(variable.search_status, VariableStatus::InUse);
    assert!(variable.in_use_at.is_some());
}

#[tokio::test]
async fn every_transition_appends_exactly_one_history_row() {
    let fixture = workflow_fixture().await;

    select(&fixture).await;
    assert_eq!(history_rows_for(&fixture.pool, fixture.variable_id).await.len(), 1);

    confirm(&fixture).await;
    assert_eq!(history_rows_for(&fixture.pool, fixture.variable_id).await.len(), 2);

    fixture
        .workflow
        .requester_respond(
            fixture.match_id,
            fixture.requester_id,
            RequesterResponseType::Approve,
            RequesterResponseInput::default(),
        )
        .await
        .unwrap();
    assert_eq!(history_rows_for(&fixture.pool, fixture.variable_id).await.len(), 3);

    fixture
        .workflow
        .mark_in_use(fixture.variable_id, fixture.requester_id)
        .await
        .unwrap();
    assert_eq!(history_rows_for(&fixture.pool, fixture.variable_id).await.len(), 4);
}

#[tokio::test]
async fn pending_owner_work_list_reflects_ownership() {
    let fixture = workflow_fixture().await;
    select(&fixture).await;

    let pending = fixture.workflow.pending_for_owner(fixture.owner_id).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].match_id, fixture.match_id);
    assert_eq!(pending[0].variable_name, "vl_vendas_mensal");

    let other = insert_collaborator(&fixture.pool, "Sem Pendências").await;
    let empty = fixture.workflow.pending_for_owner(other).await.unwrap();
    assert!(empty.is_empty());
}

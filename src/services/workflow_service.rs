//! Workflow state machine for match validation.
//!
//! Drives a selected match through owner review, requester confirmation and
//! the data-creation detour. Transitions are serialized per match id, every
//! transition appends exactly one decision-history row, and notifications are
//! best-effort (never abort the write path).
//!
//! ```text
//! SUGGESTED ──select──▶ PENDING_OWNER ──CONFIRM_MATCH──▶ PENDING_REQUESTER ──APPROVE──▶ APPROVED
//!                        │      ▲                                │
//!                        │      └────────── REJECT_* ◀───────────┘
//!                        ├─ CORRECT_TABLE ──▶ REDIRECTED (+ new PENDING_OWNER match)
//!                        ├─ DATA_NOT_EXIST ──▶ REJECTED (variable → PENDING_INVOLVEMENT)
//!                        ├─ DELEGATE_PERSON ─▶ PENDING_OWNER (new owner)
//!                        └─ DELEGATE_AREA ───▶ REDIRECTED (variable → MATCHED)
//! ```

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::sync::Arc;
use utoipa::ToSchema;

use super::feedback_store::{FeedbackStore, concept_hash_for_variable};
use super::notifier::{Notifier, notify_best_effort};
use crate::models::{
    CaseRow, CaseVariable, Collaborator, DataTableRow, DecisionOutcome, DecisionType, MatchStatus,
    NewDecisionRecord, NotificationPriority, NotificationRequest, NotificationType,
    OwnerResponseRow, OwnerResponseType, RequesterResponseRow, RequesterResponseType,
    VariableStatus, FeedbackOutcome, WorkflowMatch,
};
use crate::utils::{ApiError, ApiResult};

/// Owner response payload (one variant per response type; unrelated fields
/// are ignored).
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct OwnerResponseInput {
    pub suggested_table_id: Option<i64>,
    pub delegate_to_id: Option<i64>,
    /// Employee identifier or name fragment, resolved against collaborators.
    pub delegate_to_funcional: Option<String>,
    pub delegate_area_id: Option<i64>,
    pub delegate_area_name: Option<String>,
    pub usage_criteria: Option<String>,
    pub attention_points: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct RequesterResponseInput {
    pub rejection_reason: Option<String>,
    pub expected_data_description: Option<String>,
    pub improvement_suggestions: Option<String>,
}

/// Work-list entry for the pending-owner view.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PendingOwnerItem {
    pub match_id: i64,
    pub variable_id: i64,
    pub variable_name: String,
    pub case_id: i64,
    pub case_title: String,
    pub table_id: i64,
    pub table_name: String,
    pub table_display_name: String,
    pub match_score: f64,
    pub created_at: chrono::DateTime<Utc>,
}

pub struct WorkflowService {
    pool: SqlitePool,
    notifier: Arc<dyn Notifier>,
    feedback: Arc<FeedbackStore>,
    match_locks: DashMap<i64, Arc<tokio::sync::Mutex<()>>>,
}

impl WorkflowService {
    pub fn new(pool: SqlitePool, notifier: Arc<dyn Notifier>, feedback: Arc<FeedbackStore>) -> Self {
        Self { pool, notifier, feedback, match_locks: DashMap::new() }
    }

    /// Two concurrent transitions on the same match must be ordered: the
    /// second observes the first's outcome.
    fn lock_for(&self, match_id: i64) -> Arc<tokio::sync::Mutex<()>> {
        self.match_locks
            .entry(match_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    // ========================================================================
    // Selection
    // ========================================================================

    /// Requester picks a match: the match goes to owner review, siblings are
    /// deselected, the table owner is notified.
    pub async fn select_match(
        &self,
        variable_id: i64,
        match_id: i64,
        selected_by: i64,
    ) -> ApiResult<WorkflowMatch> {
        let lock = self.lock_for(match_id);
        let _guard = lock.lock().await;

        let mut tx = self.pool.begin().await?;

        let m = fetch_match(&mut tx, match_id).await?;
        if m.case_variable_id != variable_id {
            return Err(ApiError::not_found("Match not found for this variable"));
        }
        if !matches!(m.status, MatchStatus::Suggested) {
            return Err(ApiError::conflict(format!(
                "Match is not selectable (current: {:?})",
                m.status
            )));
        }

        let variable = fetch_variable(&mut tx, variable_id).await?;
        if variable.is_cancelled {
            return Err(ApiError::conflict("Variable is cancelled"));
        }

        let now = Utc::now();
        sqlx::query(
            r#"UPDATE variable_matches
               SET status = ?, is_selected = TRUE, selected_at = ?, selected_by_id = ?
               WHERE id = ?"#,
        )
        .bind(MatchStatus::PendingOwner)
        .bind(now)
        .bind(selected_by)
        .bind(match_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE variable_matches SET is_selected = FALSE WHERE case_variable_id = ? AND id != ?",
        )
        .bind(variable_id)
        .bind(match_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE case_variables SET search_status = ?, selected_match_id = ? WHERE id = ?",
        )
        .bind(VariableStatus::OwnerReview)
        .bind(match_id)
        .bind(variable_id)
        .execute(&mut *tx)
        .await?;

        self.assert_single_selection(&mut tx, variable_id).await?;

        let table = fetch_table(&mut tx, m.data_table_id).await?;

        record_history(
            &mut tx,
            HistoryEntry {
                case_id: variable.case_id,
                variable_id,
                match_id: Some(match_id),
                decision_type: DecisionType::MatchSelected,
                outcome: DecisionOutcome::Positive,
                actor_id: selected_by,
                actor_role: "REQUESTER",
                variable: &variable,
                table: Some(&table),
                match_score: m.score,
                match_reason: m.match_reason.as_deref(),
                decision_reason: Some("Match selecionado pelo solicitante"),
                decision_details: None,
                owner_response_id: None,
                requester_response_id: None,
                previous_status: "SUGGESTED",
                new_status: "PENDING_OWNER",
                loop_count: 0,
            },
        )
        .await?;

        tx.commit().await?;

        if let Some(owner_id) = table.owner_id {
            notify_best_effort(
                self.notifier.as_ref(),
                NotificationRequest {
                    collaborator_id: owner_id,
                    kind: NotificationType::OwnerValidationRequest,
                    priority: NotificationPriority::High,
                    title: "Solicitação de Validação de Dados".to_string(),
                    message: format!(
                        "A variável '{}' foi associada à tabela '{}'. Valide se esta associação é apropriada.",
                        variable.variable_name, table.display_name
                    ),
                    action_url: None,
                    case_id: Some(variable.case_id),
                    variable_id: Some(variable_id),
                },
            )
            .await;
        }

        Ok(fetch_match_pool(&self.pool, match_id).await?)
    }

    // ========================================================================
    // Owner response
    // ========================================================================

    pub async fn owner_respond(
        &self,
        match_id: i64,
        responder_id: i64,
        response_type: OwnerResponseType,
        input: OwnerResponseInput,
    ) -> ApiResult<(WorkflowMatch, OwnerResponseRow)> {
        let lock = self.lock_for(match_id);
        let _guard = lock.lock().await;

        let mut tx = self.pool.begin().await?;

        let m = fetch_match(&mut tx, match_id).await?;
        if !matches!(m.status, MatchStatus::PendingOwner) {
            return Err(ApiError::conflict(format!(
                "Match is not pending owner approval (current: {:?})",
                m.status
            )));
        }

        let variable = fetch_variable(&mut tx, m.case_variable_id).await?;
        let table = fetch_table(&mut tx, m.data_table_id).await?;
        let case = fetch_case(&mut tx, variable.case_id).await?;

        // Validation happens before any state change.
        let validation_result =
            validate_owner_response(&mut tx, response_type, &input).await?;

        let now = Utc::now();
        let response_id: i64 = sqlx::query_scalar(
            r#"INSERT INTO owner_responses
               (variable_match_id, response_type, responder_id, suggested_table_id,
                delegate_to_id, delegate_area_id, delegate_area_name, usage_criteria,
                attention_points, notes, validation_result, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               RETURNING id"#,
        )
        .bind(match_id)
        .bind(response_type)
        .bind(responder_id)
        .bind(input.suggested_table_id)
        .bind(input.delegate_to_id)
        .bind(input.delegate_area_id)
        .bind(&input.delegate_area_name)
        .bind(&input.usage_criteria)
        .bind(&input.attention_points)
        .bind(&input.notes)
        .bind(&validation_result)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let (previous_status, new_status, outcome) = match response_type {
            OwnerResponseType::ConfirmMatch => {
                self.handle_confirm_match(&mut tx, &m, &variable, responder_id).await?
            },
            OwnerResponseType::CorrectTable => {
                self.handle_correct_table(&mut tx, &m, &variable, responder_id, &input).await?
            },
            OwnerResponseType::DataNotExist => {
                self.handle_data_not_exist(&mut tx, &m, &variable, responder_id).await?
            },
            OwnerResponseType::DelegatePerson => {
                self.handle_delegate_person(&mut tx, &m, responder_id, &input).await?
            },
            OwnerResponseType::DelegateArea => {
                self.handle_delegate_area(&mut tx, &m, &variable, responder_id, &input).await?
            },
        };

        record_history(
            &mut tx,
            HistoryEntry {
                case_id: variable.case_id,
                variable_id: variable.id,
                match_id: Some(match_id),
                decision_type: DecisionType::from_owner_response(response_type),
                outcome,
                actor_id: responder_id,
                actor_role: "OWNER",
                variable: &variable,
                table: Some(&table),
                match_score: m.score,
                match_reason: m.match_reason.as_deref(),
                decision_reason: input.notes.as_deref().or(input.usage_criteria.as_deref()),
                decision_details: Some(json!({
                    "validation_result": validation_result,
                    "suggested_table_id": input.suggested_table_id,
                    "delegate_to_id": input.delegate_to_id,
                    "delegate_area_name": input.delegate_area_name,
                })),
                owner_response_id: Some(response_id),
                requester_response_id: None,
                previous_status,
                new_status,
                loop_count: 0,
            },
        )
        .await?;

        tx.commit().await?;

        // Negative signal for the historical scorer; recorded outside the
        // transaction, idempotent per match. Best-effort like notifications:
        // a failed write must not abort the transition.
        if response_type == OwnerResponseType::DataNotExist
            && let Err(e) = self
                .feedback
                .record_decision(NewDecisionRecord {
                    request_id: format!("wf-match-{}", m.id),
                    concept_hash: concept_hash_for_variable(
                        &variable.variable_name,
                        &variable.variable_type,
                    ),
                    domain_id: None,
                    owner_id: Some(responder_id),
                    table_id: m.data_table_id,
                    outcome: FeedbackOutcome::Rejected,
                    actual_table_id: None,
                    confidence_at_decision: m.score,
                    use_case: "workflow".to_string(),
                })
                .await
        {
            tracing::warn!(
                "rejection feedback for match {} dropped: {}",
                m.id,
                e
            );
        }

        self.notify_after_owner_response(response_type, &m, &variable, &table, &case, &input)
            .await;

        let updated = fetch_match_pool(&self.pool, match_id).await?;
        let response = fetch_owner_response(&self.pool, response_id).await?;
        Ok((updated, response))
    }

    async fn handle_confirm_match(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        m: &WorkflowMatch,
        variable: &CaseVariable,
        responder_id: i64,
    ) -> ApiResult<(&'static str, &'static str, DecisionOutcome)> {
        sqlx::query(
            "UPDATE variable_matches SET status = ?, owner_validated_at = ?, owner_id = ? WHERE id = ?",
        )
        .bind(MatchStatus::PendingRequester)
        .bind(Utc::now())
        .bind(responder_id)
        .bind(m.id)
        .execute(&mut **tx)
        .await?;

        sqlx::query("UPDATE case_variables SET search_status = ? WHERE id = ?")
            .bind(VariableStatus::RequesterReview)
            .bind(variable.id)
            .execute(&mut **tx)
            .await?;

        Ok(("PENDING_OWNER", "PENDING_REQUESTER", DecisionOutcome::Positive))
    }

    async fn handle_correct_table(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        m: &WorkflowMatch,
        variable: &CaseVariable,
        responder_id: i64,
        input: &OwnerResponseInput,
    ) -> ApiResult<(&'static str, &'static str, DecisionOutcome)> {
        let suggested_table_id = input
            .suggested_table_id
            .expect("validated: suggested_table_id present");

        sqlx::query(
            r#"UPDATE variable_matches
               SET status = ?, owner_validated_at = ?, owner_id = ?, is_selected = FALSE,
                   rejection_reason = ?
               WHERE id = ?"#,
        )
        .bind(MatchStatus::Redirected)
        .bind(Utc::now())
        .bind(responder_id)
        .bind(format!("Tabela correta: ID {}", suggested_table_id))
        .bind(m.id)
        .execute(&mut **tx)
        .await?;

        // Find or create the match for the corrected table, already selected
        // and pending the new owner's review.
        let existing: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM variable_matches WHERE case_variable_id = ? AND data_table_id = ?",
        )
        .bind(variable.id)
        .bind(suggested_table_id)
        .fetch_optional(&mut **tx)
        .await?;

        let now = Utc::now();
        let correct_match_id = match existing {
            Some(id) => {
                sqlx::query(
                    r#"UPDATE variable_matches
                       SET status = ?, is_selected = TRUE, selected_at = ?, selected_by_id = ?
                       WHERE id = ?"#,
                )
                .bind(MatchStatus::PendingOwner)
                .bind(now)
                .bind(responder_id)
                .bind(id)
                .execute(&mut **tx)
                .await?;
                id
            },
            None => {
                sqlx::query_scalar(
                    r#"INSERT INTO variable_matches
                       (case_variable_id, data_table_id, score, match_reason, status,
                        is_selected, selected_at, selected_by_id, created_at)
                       VALUES (?, ?, 1.0, 'Sugerido pelo dono dos dados originais', ?,
                               TRUE, ?, ?, ?)
                       RETURNING id"#,
                )
                .bind(variable.id)
                .bind(suggested_table_id)
                .bind(MatchStatus::PendingOwner)
                .bind(now)
                .bind(responder_id)
                .bind(now)
                .fetch_one(&mut **tx)
                .await?
            },
        };

        sqlx::query(
            "UPDATE case_variables SET search_status = ?, selected_match_id = ? WHERE id = ?",
        )
        .bind(VariableStatus::OwnerReview)
        .bind(correct_match_id)
        .bind(variable.id)
        .execute(&mut **tx)
        .await?;

        self.assert_single_selection(tx, variable.id).await?;

        Ok(("PENDING_OWNER", "REDIRECTED", DecisionOutcome::Negative))
    }

    async fn handle_data_not_exist(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        m: &WorkflowMatch,
        variable: &CaseVariable,
        responder_id: i64,
    ) -> ApiResult<(&'static str, &'static str, DecisionOutcome)> {
        sqlx::query(
            r#"UPDATE variable_matches
               SET status = ?, owner_validated_at = ?, owner_id = ?, is_selected = FALSE,
                   rejection_reason = 'Dados não existem - necessário envolvimento'
               WHERE id = ?"#,
        )
        .bind(MatchStatus::Rejected)
        .bind(Utc::now())
        .bind(responder_id)
        .bind(m.id)
        .execute(&mut **tx)
        .await?;

        sqlx::query(
            "UPDATE case_variables SET search_status = ?, selected_match_id = NULL WHERE id = ?",
        )
        .bind(VariableStatus::PendingInvolvement)
        .bind(variable.id)
        .execute(&mut **tx)
        .await?;

        Ok(("PENDING_OWNER", "REJECTED", DecisionOutcome::Negative))
    }

    async fn handle_delegate_person(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        m: &WorkflowMatch,
        _responder_id: i64,
        input: &OwnerResponseInput,
    ) -> ApiResult<(&'static str, &'static str, DecisionOutcome)> {
        let delegate = resolve_collaborator(tx, input.delegate_to_id, input.delegate_to_funcional.as_deref())
            .await?
            .expect("validated: delegate resolves");

        sqlx::query(
            r#"UPDATE variable_matches
               SET status = ?, owner_validated_at = ?, owner_id = ?,
                   rejection_reason = ?
               WHERE id = ?"#,
        )
        .bind(MatchStatus::PendingOwner)
        .bind(Utc::now())
        .bind(delegate.id)
        .bind(format!("Delegado para: {}", delegate.name))
        .bind(m.id)
        .execute(&mut **tx)
        .await?;

        Ok(("PENDING_OWNER", "PENDING_OWNER", DecisionOutcome::Neutral))
    }

    async fn handle_delegate_area(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        m: &WorkflowMatch,
        variable: &CaseVariable,
        responder_id: i64,
        input: &OwnerResponseInput,
    ) -> ApiResult<(&'static str, &'static str, DecisionOutcome)> {
        let area = input
            .delegate_area_name
            .clone()
            .or_else(|| input.delegate_area_id.map(|id| format!("área {}", id)))
            .expect("validated: area present");

        sqlx::query(
            r#"UPDATE variable_matches
               SET status = ?, owner_validated_at = ?, owner_id = ?, is_selected = FALSE,
                   rejection_reason = ?
               WHERE id = ?"#,
        )
        .bind(MatchStatus::Redirected)
        .bind(Utc::now())
        .bind(responder_id)
        .bind(format!("Redirecionado para área: {}", area))
        .bind(m.id)
        .execute(&mut **tx)
        .await?;

        sqlx::query(
            "UPDATE case_variables SET search_status = ?, selected_match_id = NULL WHERE id = ?",
        )
        .bind(VariableStatus::Matched)
        .bind(variable.id)
        .execute(&mut **tx)
        .await?;

        Ok(("PENDING_OWNER", "REDIRECTED", DecisionOutcome::Neutral))
    }

    async fn notify_after_owner_response(
        &self,
        response_type: OwnerResponseType,
        m: &WorkflowMatch,
        variable: &CaseVariable,
        table: &DataTableRow,
        case: &CaseRow,
        input: &OwnerResponseInput,
    ) {
        let notification = match response_type {
            OwnerResponseType::ConfirmMatch => Some(NotificationRequest {
                collaborator_id: case.created_by,
                kind: NotificationType::VariableApproved,
                priority: NotificationPriority::High,
                title: "Confirme a Indicação do Owner".to_string(),
                message: format!(
                    "O dono dos dados confirmou a tabela '{}' para a variável '{}'. Verifique se atende sua necessidade.",
                    table.display_name, variable.variable_name
                ),
                action_url: None,
                case_id: Some(case.id),
                variable_id: Some(variable.id),
            }),
            OwnerResponseType::DataNotExist => Some(NotificationRequest {
                collaborator_id: case.created_by,
                kind: NotificationType::OwnerRejected,
                priority: NotificationPriority::High,
                title: "Dados não existem - Envolvimento Necessário".to_string(),
                message: format!(
                    "O responsável informou que a variável '{}' precisa de um envolvimento para criação dos dados. Por favor, abra uma requisição no sistema externo e registre o número.",
                    variable.variable_name
                ),
                action_url: Some(format!(
                    "/cases/{}?tab=variables&action=create_involvement&variable={}",
                    case.id, variable.id
                )),
                case_id: Some(case.id),
                variable_id: Some(variable.id),
            }),
            OwnerResponseType::CorrectTable => {
                let new_owner =
                    table_owner(&self.pool, input.suggested_table_id.unwrap_or_default()).await;
                new_owner.map(|owner_id| NotificationRequest {
                    collaborator_id: owner_id,
                    kind: NotificationType::OwnerValidationRequest,
                    priority: NotificationPriority::High,
                    title: "Solicitação de Validação - Redirecionado".to_string(),
                    message: format!(
                        "A variável '{}' foi redirecionada para sua tabela. Valide se esta associação é apropriada.",
                        variable.variable_name
                    ),
                    action_url: None,
                    case_id: Some(case.id),
                    variable_id: Some(variable.id),
                })
            },
            OwnerResponseType::DelegatePerson => {
                let delegate_id = match fetch_match_pool(&self.pool, m.id).await {
                    Ok(updated) => updated.owner_id,
                    Err(_) => None,
                };
                delegate_id.map(|delegate| NotificationRequest {
                    collaborator_id: delegate,
                    kind: NotificationType::OwnerValidationRequest,
                    priority: NotificationPriority::High,
                    title: "Solicitação de Validação - Delegada".to_string(),
                    message: format!(
                        "A responsabilidade pela validação da variável '{}' foi delegada para você.",
                        variable.variable_name
                    ),
                    action_url: None,
                    case_id: Some(case.id),
                    variable_id: Some(variable.id),
                })
            },
            OwnerResponseType::DelegateArea => Some(NotificationRequest {
                collaborator_id: case.created_by,
                kind: NotificationType::OwnerRejected,
                priority: NotificationPriority::Normal,
                title: "Responsabilidade Redirecionada".to_string(),
                message: format!(
                    "A variável '{}' foi redirecionada para a área '{}'. Uma nova busca será necessária para encontrar o responsável correto.",
                    variable.variable_name,
                    input.delegate_area_name.as_deref().unwrap_or("informada")
                ),
                action_url: None,
                case_id: Some(case.id),
                variable_id: Some(variable.id),
            }),
        };

        if let Some(notification) = notification {
            notify_best_effort(self.notifier.as_ref(), notification).await;
        }
    }

    // ========================================================================
    // Requester response
    // ========================================================================

    pub async fn requester_respond(
        &self,
        match_id: i64,
        responder_id: i64,
        response_type: RequesterResponseType,
        input: RequesterResponseInput,
    ) -> ApiResult<(WorkflowMatch, RequesterResponseRow)> {
        let lock = self.lock_for(match_id);
        let _guard = lock.lock().await;

        let mut tx = self.pool.begin().await?;

        let m = fetch_match(&mut tx, match_id).await?;
        if !matches!(m.status, MatchStatus::PendingRequester) {
            return Err(ApiError::conflict(format!(
                "Match is not pending requester confirmation (current: {:?})",
                m.status
            )));
        }

        let variable = fetch_variable(&mut tx, m.case_variable_id).await?;
        let table = fetch_table(&mut tx, m.data_table_id).await?;

        if response_type.is_rejection() {
            let reason = input.rejection_reason.as_deref().unwrap_or("").trim();
            if reason.chars().count() < 10 {
                return Err(ApiError::validation(
                    "Motivo da rejeição é obrigatório (mínimo 10 caracteres)",
                ));
            }
        }

        let owner_response_id: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM owner_responses WHERE variable_match_id = ? ORDER BY created_at DESC, id DESC LIMIT 1",
        )
        .bind(match_id)
        .fetch_optional(&mut *tx)
        .await?;

        let previous_loops: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM requester_responses WHERE variable_match_id = ?",
        )
        .bind(match_id)
        .fetch_one(&mut *tx)
        .await?;
        let loop_count = previous_loops + 1;

        let response_id: i64 = sqlx::query_scalar(
            r#"INSERT INTO requester_responses
               (variable_match_id, owner_response_id, response_type, responder_id,
                rejection_reason, expected_data_description, improvement_suggestions,
                loop_count, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
               RETURNING id"#,
        )
        .bind(match_id)
        .bind(owner_response_id)
        .bind(response_type)
        .bind(responder_id)
        .bind(&input.rejection_reason)
        .bind(&input.expected_data_description)
        .bind(&input.improvement_suggestions)
        .bind(loop_count)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        let (new_status, outcome) = if response_type == RequesterResponseType::Approve {
            sqlx::query("UPDATE variable_matches SET status = ? WHERE id = ?")
                .bind(MatchStatus::Approved)
                .bind(match_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("UPDATE case_variables SET search_status = ? WHERE id = ?")
                .bind(VariableStatus::Approved)
                .bind(variable.id)
                .execute(&mut *tx)
                .await?;
            ("APPROVED", DecisionOutcome::Positive)
        } else {
            // Loop back to the owner with the requester's feedback.
            sqlx::query("UPDATE variable_matches SET status = ? WHERE id = ?")
                .bind(MatchStatus::PendingOwner)
                .bind(match_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("UPDATE case_variables SET search_status = ? WHERE id = ?")
                .bind(VariableStatus::OwnerReview)
                .bind(variable.id)
                .execute(&mut *tx)
                .await?;
            ("PENDING_OWNER", DecisionOutcome::Negative)
        };

        record_history(
            &mut tx,
            HistoryEntry {
                case_id: variable.case_id,
                variable_id: variable.id,
                match_id: Some(match_id),
                decision_type: DecisionType::from_requester_response(response_type),
                outcome,
                actor_id: responder_id,
                actor_role: "REQUESTER",
                variable: &variable,
                table: Some(&table),
                match_score: m.score,
                match_reason: m.match_reason.as_deref(),
                decision_reason: input.rejection_reason.as_deref(),
                decision_details: Some(json!({
                    "expected_data_description": input.expected_data_description,
                    "improvement_suggestions": input.improvement_suggestions,
                })),
                owner_response_id,
                requester_response_id: Some(response_id),
                previous_status: "PENDING_REQUESTER",
                new_status,
                loop_count,
            },
        )
        .await?;

        tx.commit().await?;

        if response_type == RequesterResponseType::Approve {
            // Aggregate approval history for future rankings. Best-effort:
            // a failed write must not abort the approval.
            if let Err(e) = self
                .feedback
                .record_decision(NewDecisionRecord {
                    request_id: format!("wf-match-{}", match_id),
                    concept_hash: concept_hash_for_variable(
                        &variable.variable_name,
                        &variable.variable_type,
                    ),
                    domain_id: None,
                    owner_id: m.owner_id,
                    table_id: m.data_table_id,
                    outcome: FeedbackOutcome::Approved,
                    actual_table_id: None,
                    confidence_at_decision: m.score,
                    use_case: "workflow".to_string(),
                })
                .await
            {
                tracing::warn!(
                    "approval feedback for match {} dropped: {}",
                    match_id,
                    e
                );
            }

            if let Some(owner_id) = m.owner_id {
                notify_best_effort(
                    self.notifier.as_ref(),
                    NotificationRequest {
                        collaborator_id: owner_id,
                        kind: NotificationType::VariableApproved,
                        priority: NotificationPriority::Normal,
                        title: "Solicitante Confirmou Match".to_string(),
                        message: format!(
                            "O solicitante confirmou que a tabela atende sua necessidade para a variável '{}'.",
                            variable.variable_name
                        ),
                        action_url: None,
                        case_id: Some(variable.case_id),
                        variable_id: Some(variable.id),
                    },
                )
                .await;
            }
        } else if let Some(owner_id) = m.owner_id {
            notify_best_effort(
                self.notifier.as_ref(),
                NotificationRequest {
                    collaborator_id: owner_id,
                    kind: NotificationType::OwnerValidationRequest,
                    priority: NotificationPriority::High,
                    title: "Solicitante Rejeitou Match - Nova Ação Necessária".to_string(),
                    message: format!(
                        "O solicitante rejeitou a indicação para '{}'. Motivo: {}. Avalie o feedback e escolha uma nova ação.",
                        variable.variable_name,
                        response_type.label()
                    ),
                    action_url: None,
                    case_id: Some(variable.case_id),
                    variable_id: Some(variable.id),
                },
            )
            .await;
        }

        let updated = fetch_match_pool(&self.pool, match_id).await?;
        let response = fetch_requester_response(&self.pool, response_id).await?;
        Ok((updated, response))
    }

    // ========================================================================
    // In use
    // ========================================================================

    /// Only the case creator may mark an approved variable as in use.
    pub async fn mark_in_use(&self, variable_id: i64, user_id: i64) -> ApiResult<CaseVariable> {
        let mut tx = self.pool.begin().await?;

        let variable = fetch_variable(&mut tx, variable_id).await?;
        if variable.search_status != VariableStatus::Approved {
            return Err(ApiError::conflict(format!(
                "Variável deve estar aprovada para marcar como 'Em Uso'. Status atual: {:?}",
                variable.search_status
            )));
        }

        let case = fetch_case(&mut tx, variable.case_id).await?;
        if case.created_by != user_id {
            return Err(ApiError::validation(
                "Apenas o solicitante pode marcar a variável como 'Em Uso'",
            ));
        }

        sqlx::query("UPDATE case_variables SET search_status = ?, in_use_at = ? WHERE id = ?")
            .bind(VariableStatus::InUse)
            .bind(Utc::now())
            .bind(variable_id)
            .execute(&mut *tx)
            .await?;

        record_history(
            &mut tx,
            HistoryEntry {
                case_id: variable.case_id,
                variable_id,
                match_id: variable.selected_match_id,
                decision_type: DecisionType::VariableInUse,
                outcome: DecisionOutcome::Neutral,
                actor_id: user_id,
                actor_role: "REQUESTER",
                variable: &variable,
                table: None,
                match_score: 0.0,
                match_reason: None,
                decision_reason: Some("Variável marcada como em uso"),
                decision_details: None,
                owner_response_id: None,
                requester_response_id: None,
                previous_status: "APPROVED",
                new_status: "IN_USE",
                loop_count: 0,
            },
        )
        .await?;

        tx.commit().await?;

        Ok(fetch_variable_pool(&self.pool, variable_id).await?)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn matches_for_variable(&self, variable_id: i64) -> ApiResult<Vec<WorkflowMatch>> {
        // 404 on unknown variable rather than an empty list.
        fetch_variable_pool(&self.pool, variable_id).await?;

        let matches = sqlx::query_as::<_, WorkflowMatch>(
            "SELECT * FROM variable_matches WHERE case_variable_id = ? ORDER BY score DESC, id ASC",
        )
        .bind(variable_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(matches)
    }

    pub async fn pending_for_owner(&self, owner_id: i64) -> ApiResult<Vec<PendingOwnerItem>> {
        let items = sqlx::query_as::<_, PendingOwnerRow>(
            r#"SELECT vm.id AS match_id, cv.id AS variable_id, cv.variable_name,
                      c.id AS case_id, c.title AS case_title,
                      dt.id AS table_id, dt.name AS table_name,
                      dt.display_name AS table_display_name,
                      vm.score AS match_score, vm.created_at
               FROM variable_matches vm
               JOIN data_tables dt ON vm.data_table_id = dt.id
               JOIN case_variables cv ON vm.case_variable_id = cv.id
               JOIN cases c ON cv.case_id = c.id
               WHERE vm.status = 'PENDING_OWNER'
                 AND COALESCE(vm.owner_id, dt.owner_id) = ?
                 AND cv.is_cancelled = FALSE
               ORDER BY vm.created_at DESC"#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items
            .into_iter()
            .map(|row| PendingOwnerItem {
                match_id: row.match_id,
                variable_id: row.variable_id,
                variable_name: row.variable_name,
                case_id: row.case_id,
                case_title: row.case_title,
                table_id: row.table_id,
                table_name: row.table_name,
                table_display_name: row.table_display_name,
                match_score: row.match_score,
                created_at: row.created_at,
            })
            .collect())
    }

    /// Invariant: no two matches for one variable hold `is_selected` at once.
    async fn assert_single_selection(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        variable_id: i64,
    ) -> ApiResult<()> {
        let selected: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM variable_matches WHERE case_variable_id = ? AND is_selected = TRUE",
        )
        .bind(variable_id)
        .fetch_one(&mut **tx)
        .await?;

        if selected > 1 {
            return Err(ApiError::Integrity(format!(
                "variable {} has {} selected matches",
                variable_id, selected
            )));
        }
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct PendingOwnerRow {
    match_id: i64,
    variable_id: i64,
    variable_name: String,
    case_id: i64,
    case_title: String,
    table_id: i64,
    table_name: String,
    table_display_name: String,
    match_score: f64,
    created_at: chrono::DateTime<Utc>,
}

// ============================================================================
// Validation & lookups
// ============================================================================

async fn validate_owner_response(
    tx: &mut Transaction<'_, Sqlite>,
    response_type: OwnerResponseType,
    input: &OwnerResponseInput,
) -> ApiResult<String> {
    match response_type {
        OwnerResponseType::CorrectTable => {
            let Some(table_id) = input.suggested_table_id else {
                return Err(ApiError::validation("Tabela sugerida é obrigatória"));
            };
            let table: Option<DataTableRow> = sqlx::query_as(
                "SELECT * FROM data_tables WHERE id = ? AND is_active = TRUE",
            )
            .bind(table_id)
            .fetch_optional(&mut **tx)
            .await?;
            match table {
                Some(table) => Ok(format!("Tabela válida: {}", table.display_name)),
                None => Err(ApiError::validation(format!(
                    "Tabela com ID {} não encontrada ou inativa",
                    table_id
                ))),
            }
        },
        OwnerResponseType::DataNotExist => Ok("Confirmado: dados não existem".to_string()),
        OwnerResponseType::DelegatePerson => {
            if input.delegate_to_id.is_none() && input.delegate_to_funcional.is_none() {
                return Err(ApiError::validation("Funcional ou ID do colaborador é obrigatório"));
            }
            match resolve_collaborator(tx, input.delegate_to_id, input.delegate_to_funcional.as_deref())
                .await?
            {
                Some(collaborator) => Ok(format!("Delegado para: {}", collaborator.name)),
                None => Err(ApiError::validation(format!(
                    "Colaborador '{}' não encontrado",
                    input
                        .delegate_to_funcional
                        .clone()
                        .or_else(|| input.delegate_to_id.map(|id| id.to_string()))
                        .unwrap_or_default()
                ))),
            }
        },
        OwnerResponseType::DelegateArea => {
            if input.delegate_area_id.is_none()
                && input
                    .delegate_area_name
                    .as_deref()
                    .is_none_or(|n| n.trim().is_empty())
            {
                return Err(ApiError::validation("ID ou nome da área é obrigatório"));
            }
            Ok(format!(
                "Área informada: {}",
                input
                    .delegate_area_name
                    .clone()
                    .or_else(|| input.delegate_area_id.map(|id| id.to_string()))
                    .unwrap_or_default()
            ))
        },
        OwnerResponseType::ConfirmMatch => {
            if input
                .usage_criteria
                .as_deref()
                .is_none_or(|c| c.trim().is_empty())
            {
                return Err(ApiError::validation("Critérios de uso são obrigatórios"));
            }
            Ok("Match confirmado com critérios".to_string())
        },
    }
}

async fn resolve_collaborator(
    tx: &mut Transaction<'_, Sqlite>,
    id: Option<i64>,
    funcional: Option<&str>,
) -> Result<Option<Collaborator>, sqlx::Error> {
    if let Some(id) = id {
        return sqlx::query_as("SELECT * FROM collaborators WHERE id = ? AND active = TRUE")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await;
    }
    if let Some(funcional) = funcional {
        let pattern = format!("%{}%", funcional);
        return sqlx::query_as(
            r#"SELECT * FROM collaborators
               WHERE active = TRUE AND (email LIKE ? OR name LIKE ?)
               ORDER BY id LIMIT 1"#,
        )
        .bind(&pattern)
        .bind(&pattern)
        .fetch_optional(&mut **tx)
        .await;
    }
    Ok(None)
}

struct HistoryEntry<'a> {
    case_id: i64,
    variable_id: i64,
    match_id: Option<i64>,
    decision_type: DecisionType,
    outcome: DecisionOutcome,
    actor_id: i64,
    actor_role: &'static str,
    variable: &'a CaseVariable,
    table: Option<&'a DataTableRow>,
    match_score: f64,
    match_reason: Option<&'a str>,
    decision_reason: Option<&'a str>,
    decision_details: Option<serde_json::Value>,
    owner_response_id: Option<i64>,
    requester_response_id: Option<i64>,
    previous_status: &'static str,
    new_status: &'static str,
    loop_count: i64,
}

/// Append one decision-history row. The contexts are full JSON snapshots at
/// decision time; they are never updated afterwards.
async fn record_history(
    tx: &mut Transaction<'_, Sqlite>,
    entry: HistoryEntry<'_>,
) -> Result<(), sqlx::Error> {
    let variable_context = json!({
        "variable_name": entry.variable.variable_name,
        "variable_type": entry.variable.variable_type,
        "concept": entry.variable.concept,
        "search_status": entry.variable.search_status,
    });

    let table_context = entry.table.map(|t| {
        json!({
            "table_id": t.id,
            "name": t.name,
            "display_name": t.display_name,
            "domain": t.domain,
            "owner_id": t.owner_id,
        })
    });

    let match_context = entry.match_id.map(|id| {
        json!({
            "match_id": id,
            "score": entry.match_score,
            "match_reason": entry.match_reason,
        })
    });

    sqlx::query(
        r#"INSERT INTO decision_history
           (case_id, variable_id, match_id, decision_type, outcome, actor_id, actor_role,
            variable_context, table_context, match_context, decision_reason, decision_details,
            owner_response_id, requester_response_id, previous_status, new_status, loop_count,
            created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(entry.case_id)
    .bind(entry.variable_id)
    .bind(entry.match_id)
    .bind(entry.decision_type)
    .bind(entry.outcome)
    .bind(entry.actor_id)
    .bind(entry.actor_role)
    .bind(variable_context.to_string())
    .bind(table_context.map(|c| c.to_string()))
    .bind(match_context.map(|c| c.to_string()))
    .bind(entry.decision_reason)
    .bind(entry.decision_details.map(|d| d.to_string()))
    .bind(entry.owner_response_id)
    .bind(entry.requester_response_id)
    .bind(entry.previous_status)
    .bind(entry.new_status)
    .bind(entry.loop_count)
    .bind(Utc::now())
    .execute(&mut **tx)
    .await?;

    Ok(())
}

async fn fetch_match(
    tx: &mut Transaction<'_, Sqlite>,
    match_id: i64,
) -> ApiResult<WorkflowMatch> {
    sqlx::query_as::<_, WorkflowMatch>("SELECT * FROM variable_matches WHERE id = ?")
        .bind(match_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| ApiError::not_found("Match not found"))
}

async fn fetch_match_pool(pool: &SqlitePool, match_id: i64) -> ApiResult<WorkflowMatch> {
    sqlx::query_as::<_, WorkflowMatch>("SELECT * FROM variable_matches WHERE id = ?")
        .bind(match_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Match not found"))
}

async fn fetch_variable(
    tx: &mut Transaction<'_, Sqlite>,
    variable_id: i64,
) -> ApiResult<CaseVariable> {
    sqlx::query_as::<_, CaseVariable>("SELECT * FROM case_variables WHERE id = ?")
        .bind(variable_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| ApiError::not_found("Variable not found"))
}

async fn fetch_variable_pool(pool: &SqlitePool, variable_id: i64) -> ApiResult<CaseVariable> {
    sqlx::query_as::<_, CaseVariable>("SELECT * FROM case_variables WHERE id = ?")
        .bind(variable_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Variable not found"))
}

async fn fetch_table(
    tx: &mut Transaction<'_, Sqlite>,
    table_id: i64,
) -> ApiResult<DataTableRow> {
    sqlx::query_as::<_, DataTableRow>("SELECT * FROM data_tables WHERE id = ?")
        .bind(table_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| ApiError::not_found("Table not found"))
}

async fn fetch_case(tx: &mut Transaction<'_, Sqlite>, case_id: i64) -> ApiResult<CaseRow> {
    sqlx::query_as::<_, CaseRow>("SELECT * FROM cases WHERE id = ?")
        .bind(case_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| ApiError::not_found("Case not found"))
}

async fn fetch_owner_response(pool: &SqlitePool, id: i64) -> ApiResult<OwnerResponseRow> {
    sqlx::query_as::<_, OwnerResponseRow>("SELECT * FROM owner_responses WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Owner response not found"))
}

async fn fetch_requester_response(pool: &SqlitePool, id: i64) -> ApiResult<RequesterResponseRow> {
    sqlx::query_as::<_, RequesterResponseRow>("SELECT * FROM requester_responses WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Requester response not found"))
}

async fn table_owner(pool: &SqlitePool, table_id: i64) -> Option<i64> {
    sqlx::query_scalar::<_, Option<i64>>("SELECT owner_id FROM data_tables WHERE id = ?")
        .bind(table_id)
        .fetch_optional(pool)
        .await
        .ok()
        .flatten()
        .flatten()
}

//! Involvement Service
//!
//! Data-creation requests raised when an owner states the data does not
//! exist. Covers creation, the expected-date and completion transitions, and
//! the daily sweep that marks overdue involvements and nags the owner.

use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use sqlx::SqlitePool;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use utoipa::ToSchema;

use super::notifier::{Notifier, notify_best_effort};
use crate::models::{
    CaseVariable, Involvement, InvolvementStats, InvolvementStatus, NotificationPriority,
    NotificationRequest, NotificationType, VariableStatus,
};
use crate::utils::{ApiError, ApiResult, ScheduledTask};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateInvolvementInput {
    pub case_variable_id: i64,
    pub external_request_number: String,
    pub external_system: Option<String>,
    pub owner_id: i64,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SetExpectedDateInput {
    pub expected_completion_date: NaiveDate,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CompleteInvolvementInput {
    pub created_table_name: String,
    pub created_concept: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct InvolvementFilter {
    pub owner_id: Option<i64>,
    pub requester_id: Option<i64>,
    pub status: Option<InvolvementStatus>,
    #[serde(default)]
    pub include_completed: bool,
}

pub struct InvolvementService {
    pool: SqlitePool,
    notifier: Arc<dyn Notifier>,
}

impl InvolvementService {
    pub fn new(pool: SqlitePool, notifier: Arc<dyn Notifier>) -> Self {
        Self { pool, notifier }
    }

    /// Create an involvement for a variable pending data creation.
    /// At most one non-completed involvement may exist per variable.
    pub async fn create(
        &self,
        input: CreateInvolvementInput,
        requester_id: i64,
    ) -> ApiResult<Involvement> {
        if input.external_request_number.trim().is_empty() {
            return Err(ApiError::validation("Número da requisição externa é obrigatório"));
        }

        let mut tx = self.pool.begin().await?;

        let variable: Option<CaseVariable> =
            sqlx::query_as("SELECT * FROM case_variables WHERE id = ?")
                .bind(input.case_variable_id)
                .fetch_optional(&mut *tx)
                .await?;
        let variable = variable.ok_or_else(|| ApiError::not_found("Variable not found"))?;

        let active: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM involvements WHERE case_variable_id = ? AND status != 'COMPLETED'",
        )
        .bind(input.case_variable_id)
        .fetch_one(&mut *tx)
        .await?;
        if active > 0 {
            return Err(ApiError::conflict(
                "An active involvement already exists for this variable",
            ));
        }

        let now = Utc::now();
        let id: i64 = sqlx::query_scalar(
            r#"INSERT INTO involvements
               (case_variable_id, external_request_number, external_system, requester_id,
                owner_id, status, notes, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, 'PENDING', ?, ?, ?)
               RETURNING id"#,
        )
        .bind(input.case_variable_id)
        .bind(input.external_request_number.trim())
        .bind(&input.external_system)
        .bind(requester_id)
        .bind(input.owner_id)
        .bind(&input.notes)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE case_variables SET search_status = ? WHERE id = ?")
            .bind(VariableStatus::PendingInvolvement)
            .bind(input.case_variable_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        notify_best_effort(
            self.notifier.as_ref(),
            NotificationRequest {
                collaborator_id: input.owner_id,
                kind: NotificationType::InvolvementCreated,
                priority: NotificationPriority::High,
                title: "Novo Envolvimento de Criação de Dados".to_string(),
                message: format!(
                    "Um envolvimento foi criado para a variável '{}'. Número da requisição externa: {}. Por favor, defina uma data esperada para conclusão.",
                    variable.variable_name,
                    input.external_request_number.trim()
                ),
                action_url: Some(format!(
                    "/cases/{}?tab=variables&variable={}",
                    variable.case_id, variable.id
                )),
                case_id: Some(variable.case_id),
                variable_id: Some(variable.id),
            },
        )
        .await;

        self.get(id).await
    }

    /// Owner sets the expected completion date: PENDING → IN_PROGRESS.
    pub async fn set_expected_date(
        &self,
        involvement_id: i64,
        input: SetExpectedDateInput,
        owner_id: i64,
    ) -> ApiResult<Involvement> {
        let involvement = self.get(involvement_id).await?;

        if involvement.owner_id != owner_id {
            return Err(ApiError::validation("Only the owner can set the expected date"));
        }
        if involvement.status == InvolvementStatus::Completed {
            return Err(ApiError::conflict("Involvement is already completed"));
        }

        let now = Utc::now();
        let notes = append_dated_note(involvement.notes.as_deref(), input.notes.as_deref(), "");

        sqlx::query(
            r#"UPDATE involvements
               SET expected_completion_date = ?, status = 'IN_PROGRESS', notes = ?, updated_at = ?
               WHERE id = ?"#,
        )
        .bind(input.expected_completion_date)
        .bind(&notes)
        .bind(now)
        .bind(involvement_id)
        .execute(&self.pool)
        .await?;

        let variable = self.variable_of(&involvement).await?;
        notify_best_effort(
            self.notifier.as_ref(),
            NotificationRequest {
                collaborator_id: involvement.requester_id,
                kind: NotificationType::InvolvementDateSet,
                priority: NotificationPriority::Normal,
                title: "Data de Conclusão Definida".to_string(),
                message: format!(
                    "O responsável definiu a data esperada para {} para a criação de dados da variável '{}'.",
                    input.expected_completion_date.format("%d/%m/%Y"),
                    variable.variable_name
                ),
                action_url: Some(format!("/cases/{}?tab=variables", variable.case_id)),
                case_id: Some(variable.case_id),
                variable_id: Some(variable.id),
            },
        )
        .await;

        self.get(involvement_id).await
    }

    /// Owner completes the involvement; the variable returns to MATCHED so
    /// the requester can select a match against the created table.
    pub async fn complete(
        &self,
        involvement_id: i64,
        input: CompleteInvolvementInput,
        owner_id: i64,
    ) -> ApiResult<Involvement> {
        if input.created_table_name.trim().is_empty() {
            return Err(ApiError::validation("Nome da tabela criada é obrigatório"));
        }
        if input.created_concept.trim().is_empty() {
            return Err(ApiError::validation("Conceito criado é obrigatório"));
        }

        let involvement = self.get(involvement_id).await?;
        if involvement.owner_id != owner_id {
            return Err(ApiError::validation("Only the owner can complete the involvement"));
        }
        if involvement.status == InvolvementStatus::Completed {
            return Err(ApiError::conflict("Involvement is already completed"));
        }

        let now = Utc::now();
        let today = now.date_naive();
        let notes =
            append_dated_note(involvement.notes.as_deref(), input.notes.as_deref(), "Conclusão: ");

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"UPDATE involvements
               SET created_table_name = ?, created_concept = ?, actual_completion_date = ?,
                   status = 'COMPLETED', notes = ?, updated_at = ?
               WHERE id = ?"#,
        )
        .bind(input.created_table_name.trim())
        .bind(input.created_concept.trim())
        .bind(today)
        .bind(&notes)
        .bind(now)
        .bind(involvement_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE case_variables SET search_status = ? WHERE id = ?")
            .bind(VariableStatus::Matched)
            .bind(involvement.case_variable_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let variable = self.variable_of(&involvement).await?;
        notify_best_effort(
            self.notifier.as_ref(),
            NotificationRequest {
                collaborator_id: involvement.requester_id,
                kind: NotificationType::InvolvementCompleted,
                priority: NotificationPriority::High,
                title: "Envolvimento Concluído - Dados Criados!".to_string(),
                message: format!(
                    "A criação de dados para a variável '{}' foi concluída. Tabela criada: {}. Você pode agora prosseguir com a seleção de match.",
                    variable.variable_name,
                    input.created_table_name.trim()
                ),
                action_url: Some(format!("/cases/{}?tab=variables", variable.case_id)),
                case_id: Some(variable.case_id),
                variable_id: Some(variable.id),
            },
        )
        .await;

        self.get(involvement_id).await
    }

    pub async fn get(&self, involvement_id: i64) -> ApiResult<Involvement> {
        sqlx::query_as::<_, Involvement>("SELECT * FROM involvements WHERE id = ?")
            .bind(involvement_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::not_found("Involvement not found"))
    }

    pub async fn list(&self, filter: &InvolvementFilter) -> ApiResult<Vec<Involvement>> {
        let mut sql = String::from("SELECT * FROM involvements WHERE 1=1");
        if filter.owner_id.is_some() {
            sql.push_str(" AND owner_id = ?");
        }
        if filter.requester_id.is_some() {
            sql.push_str(" AND requester_id = ?");
        }
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        if !filter.include_completed {
            sql.push_str(" AND status != 'COMPLETED'");
        }
        sql.push_str(" ORDER BY created_at DESC, id DESC");

        let mut query = sqlx::query_as::<_, Involvement>(&sql);
        if let Some(owner_id) = filter.owner_id {
            query = query.bind(owner_id);
        }
        if let Some(requester_id) = filter.requester_id {
            query = query.bind(requester_id);
        }
        if let Some(status) = filter.status {
            query = query.bind(status);
        }

        Ok(query.fetch_all(&self.pool).await?)
    }

    pub async fn stats(&self, owner_id: Option<i64>) -> ApiResult<InvolvementStats> {
        let rows: Vec<(InvolvementStatus, i64)> = match owner_id {
            Some(owner_id) => {
                sqlx::query_as(
                    "SELECT status, COUNT(*) FROM involvements WHERE owner_id = ? GROUP BY status",
                )
                .bind(owner_id)
                .fetch_all(&self.pool)
                .await?
            },
            None => {
                sqlx::query_as("SELECT status, COUNT(*) FROM involvements GROUP BY status")
                    .fetch_all(&self.pool)
                    .await?
            },
        };

        let count_of = |status: InvolvementStatus| {
            rows.iter()
                .find(|(s, _)| *s == status)
                .map(|(_, c)| *c)
                .unwrap_or(0)
        };

        let avg_slip: Option<f64> = sqlx::query_scalar(
            r#"SELECT AVG(julianday(actual_completion_date) - julianday(expected_completion_date))
               FROM involvements
               WHERE status = 'COMPLETED'
                 AND actual_completion_date IS NOT NULL
                 AND expected_completion_date IS NOT NULL"#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(InvolvementStats {
            total: rows.iter().map(|(_, c)| c).sum(),
            pending: count_of(InvolvementStatus::Pending),
            in_progress: count_of(InvolvementStatus::InProgress),
            overdue: count_of(InvolvementStatus::Overdue),
            completed: count_of(InvolvementStatus::Completed),
            avg_completion_slip_days: avg_slip,
        })
    }

    /// Daily sweep: mark overdue involvements and send at most one reminder
    /// per involvement per calendar day. Returns the number of reminders sent.
    pub async fn send_overdue_reminders(&self) -> ApiResult<u32> {
        let today = Utc::now().date_naive();

        let overdue: Vec<Involvement> = sqlx::query_as(
            r#"SELECT * FROM involvements
               WHERE status IN ('IN_PROGRESS', 'OVERDUE')
                 AND expected_completion_date IS NOT NULL
                 AND expected_completion_date < ?"#,
        )
        .bind(today)
        .fetch_all(&self.pool)
        .await?;

        let mut reminders_sent = 0u32;
        for involvement in overdue {
            let already_reminded_today = involvement
                .last_reminder_at
                .is_some_and(|at| at.date_naive() == today);
            if already_reminded_today {
                continue;
            }

            let now = Utc::now();
            sqlx::query(
                r#"UPDATE involvements
                   SET status = 'OVERDUE', last_reminder_at = ?,
                       reminder_count = reminder_count + 1, updated_at = ?
                   WHERE id = ?"#,
            )
            .bind(now)
            .bind(now)
            .bind(involvement.id)
            .execute(&self.pool)
            .await?;

            let days_overdue = involvement.days_overdue(today);
            let variable = self.variable_of(&involvement).await?;
            let expected = involvement
                .expected_completion_date
                .map(|d| d.format("%d/%m/%Y").to_string())
                .unwrap_or_default();

            notify_best_effort(
                self.notifier.as_ref(),
                NotificationRequest {
                    collaborator_id: involvement.owner_id,
                    kind: NotificationType::InvolvementOverdue,
                    priority: NotificationPriority::Urgent,
                    title: format!("⚠️ Envolvimento Vencido - {} dia(s) de atraso", days_overdue),
                    message: format!(
                        "O envolvimento para a variável '{}' está vencido há {} dia(s). Data prevista: {}. Número da requisição: {}. Por favor, conclua a criação do dado ou atualize a data prevista.",
                        variable.variable_name,
                        days_overdue,
                        expected,
                        involvement.external_request_number
                    ),
                    action_url: Some(format!(
                        "/cases/{}?tab=variables&involvement={}",
                        variable.case_id, involvement.id
                    )),
                    case_id: Some(variable.case_id),
                    variable_id: Some(variable.id),
                },
            )
            .await;

            reminders_sent += 1;
        }

        Ok(reminders_sent)
    }

    async fn variable_of(&self, involvement: &Involvement) -> ApiResult<CaseVariable> {
        sqlx::query_as::<_, CaseVariable>("SELECT * FROM case_variables WHERE id = ?")
            .bind(involvement.case_variable_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::not_found("Variable not found"))
    }
}

fn append_dated_note(existing: Option<&str>, incoming: Option<&str>, prefix: &str) -> Option<String> {
    let Some(incoming) = incoming.filter(|n| !n.trim().is_empty()) else {
        return existing.map(str::to_string);
    };
    let stamped = format!("[{}] {}{}", Utc::now().format("%Y-%m-%d"), prefix, incoming.trim());
    match existing {
        Some(existing) if !existing.is_empty() => Some(format!("{}\n{}", existing, stamped)),
        _ => Some(stamped),
    }
}

/// Daily reminder/expiry sweep over pending involvements.
pub struct InvolvementSweepTask {
    service: Arc<InvolvementService>,
}

impl InvolvementSweepTask {
    pub fn new(service: Arc<InvolvementService>) -> Self {
        Self { service }
    }
}

impl ScheduledTask for InvolvementSweepTask {
    fn run(&self) -> Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send + '_>> {
        Box::pin(async move {
            let sent = self
                .service
                .send_overdue_reminders()
                .await
                .map_err(|e| anyhow::anyhow!("involvement sweep failed: {}", e))?;
            if sent > 0 {
                tracing::info!("Involvement sweep sent {} reminder(s)", sent);
            }
            Ok(())
        })
    }
}

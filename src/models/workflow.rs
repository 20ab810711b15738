//! Workflow state machine types: matches, owner/requester responses and the
//! decision history log.
//!
//! State lives in SQLite; the enums encode as TEXT so the stored values stay
//! readable and stable across releases.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// State of a variable ↔ table match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    Suggested,
    Selected,
    PendingOwner,
    PendingRequester,
    PendingValidation,
    Approved,
    Rejected,
    RejectedByRequester,
    Redirected,
}

/// Search/validation state of a requested variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VariableStatus {
    Pending,
    AiSearching,
    Searching,
    Matched,
    NoMatch,
    OwnerReview,
    RequesterReview,
    Approved,
    InUse,
    Cancelled,
    PendingInvolvement,
}

/// Structured owner responses to a table suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OwnerResponseType {
    /// Owner suggests a different table
    CorrectTable,
    /// Data doesn't exist yet → involvement flow
    DataNotExist,
    /// Delegate to another person
    DelegatePerson,
    /// Delegate to another organizational area
    DelegateArea,
    /// Approve with usage criteria
    ConfirmMatch,
}

/// Requester responses after the owner has validated a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequesterResponseType {
    Approve,
    RejectWrongData,
    RejectIncomplete,
    RejectWrongGranularity,
    RejectWrongPeriod,
    RejectOther,
}

impl RequesterResponseType {
    pub fn is_rejection(&self) -> bool {
        !matches!(self, Self::Approve)
    }

    /// Human label used in owner notifications.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Approve => "Aprovado",
            Self::RejectWrongData => "Dados não correspondem ao solicitado",
            Self::RejectIncomplete => "Dados incompletos/faltando campos",
            Self::RejectWrongGranularity => "Granularidade incorreta",
            Self::RejectWrongPeriod => "Período/frequência incorreta",
            Self::RejectOther => "Outro motivo",
        }
    }
}

/// Classification of a decision-history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionType {
    MatchSuggested,
    MatchSelected,
    OwnerConfirm,
    OwnerCorrectTable,
    OwnerDataNotExist,
    OwnerDelegatePerson,
    OwnerDelegateArea,
    RequesterApprove,
    RequesterRejectWrongData,
    RequesterRejectIncomplete,
    RequesterRejectWrongGranularity,
    RequesterRejectWrongPeriod,
    RequesterRejectOther,
    VariableInUse,
    VariableCancelled,
}

impl DecisionType {
    pub fn from_requester_response(kind: RequesterResponseType) -> Self {
        match kind {
            RequesterResponseType::Approve => Self::RequesterApprove,
            RequesterResponseType::RejectWrongData => Self::RequesterRejectWrongData,
            RequesterResponseType::RejectIncomplete => Self::RequesterRejectIncomplete,
            RequesterResponseType::RejectWrongGranularity => Self::RequesterRejectWrongGranularity,
            RequesterResponseType::RejectWrongPeriod => Self::RequesterRejectWrongPeriod,
            RequesterResponseType::RejectOther => Self::RequesterRejectOther,
        }
    }

    pub fn from_owner_response(kind: OwnerResponseType) -> Self {
        match kind {
            OwnerResponseType::ConfirmMatch => Self::OwnerConfirm,
            OwnerResponseType::CorrectTable => Self::OwnerCorrectTable,
            OwnerResponseType::DataNotExist => Self::OwnerDataNotExist,
            OwnerResponseType::DelegatePerson => Self::OwnerDelegatePerson,
            OwnerResponseType::DelegateArea => Self::OwnerDelegateArea,
        }
    }
}

/// Whether a decision advanced the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionOutcome {
    Positive,
    Negative,
    Neutral,
}

// ============================================================================
// Persistent rows
// ============================================================================

#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct Collaborator {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub active: bool,
}

#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct CaseRow {
    pub id: i64,
    pub title: String,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct CaseVariable {
    pub id: i64,
    pub case_id: i64,
    pub variable_name: String,
    pub variable_type: String,
    pub concept: Option<String>,
    pub search_status: VariableStatus,
    pub selected_match_id: Option<i64>,
    pub is_cancelled: bool,
    pub in_use_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Catalog table as persisted for the workflow (a projection of the indexed
/// snapshot, kept in SQLite so matches/history can reference it).
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct DataTableRow {
    pub id: i64,
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
    pub domain: Option<String>,
    pub owner_id: Option<i64>,
    /// JSON array of keywords
    pub keywords: Option<String>,
    pub data_layer: Option<String>,
    pub is_golden_source: bool,
    pub is_visao_cliente: bool,
    pub update_frequency: Option<String>,
    pub inferred_product: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Runtime coupling between a requested variable and a candidate table.
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct WorkflowMatch {
    pub id: i64,
    pub case_variable_id: i64,
    pub data_table_id: i64,
    pub score: f64,
    pub match_reason: Option<String>,
    pub status: MatchStatus,
    pub is_selected: bool,
    pub selected_at: Option<DateTime<Utc>>,
    pub selected_by_id: Option<i64>,
    pub owner_id: Option<i64>,
    pub owner_validated_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct OwnerResponseRow {
    pub id: i64,
    pub variable_match_id: i64,
    pub response_type: OwnerResponseType,
    pub responder_id: i64,
    pub suggested_table_id: Option<i64>,
    pub delegate_to_id: Option<i64>,
    pub delegate_area_id: Option<i64>,
    pub delegate_area_name: Option<String>,
    pub usage_criteria: Option<String>,
    pub attention_points: Option<String>,
    pub notes: Option<String>,
    pub validation_result: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct RequesterResponseRow {
    pub id: i64,
    pub variable_match_id: i64,
    pub owner_response_id: Option<i64>,
    pub response_type: RequesterResponseType,
    pub responder_id: i64,
    pub rejection_reason: Option<String>,
    pub expected_data_description: Option<String>,
    pub improvement_suggestions: Option<String>,
    pub loop_count: i64,
    pub created_at: DateTime<Utc>,
}

/// Append-only decision log entry. The JSON context columns are the training
/// corpus for future learners; the core only ever writes them.
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct DecisionHistoryRow {
    pub id: i64,
    pub case_id: i64,
    pub variable_id: i64,
    pub match_id: Option<i64>,
    pub decision_type: DecisionType,
    pub outcome: DecisionOutcome,
    pub actor_id: i64,
    pub actor_role: Option<String>,
    pub variable_context: Option<String>,
    pub table_context: Option<String>,
    pub match_context: Option<String>,
    pub decision_reason: Option<String>,
    pub decision_details: Option<String>,
    pub owner_response_id: Option<i64>,
    pub requester_response_id: Option<i64>,
    pub previous_status: Option<String>,
    pub new_status: Option<String>,
    pub loop_count: i64,
    pub created_at: DateTime<Utc>,
}

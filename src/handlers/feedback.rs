//! Feedback API handlers.

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use validator::Validate;

use crate::AppState;
use crate::models::{FeedbackOutcome, NewDecisionRecord};
use crate::services::feedback_store::concept_hash_from_parts;
use crate::utils::{ApiError, ApiResult};

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct FeedbackRequest {
    #[validate(length(min = 1))]
    pub request_id: String,
    pub table_id: i64,
    pub outcome: FeedbackOutcome,
    pub actual_table_id: Option<i64>,
    #[serde(default)]
    pub confidence_at_decision: f64,
    #[serde(default = "default_use_case")]
    pub use_case: String,

    // Intent fields for the concept hash
    #[validate(length(min = 1))]
    pub data_need: String,
    pub target_entity: Option<String>,
    pub target_product: Option<String>,
    pub target_segment: Option<String>,
    pub granularity: Option<String>,

    pub domain_id: Option<String>,
    pub owner_id: Option<i64>,
}

fn default_use_case() -> String {
    "default".to_string()
}

impl FeedbackRequest {
    fn concept_hash(&self) -> String {
        concept_hash_from_parts(&[
            Some(self.data_need.as_str()),
            self.target_entity.as_deref(),
            self.target_product.as_deref(),
            self.target_segment.as_deref(),
            self.granularity.as_deref(),
        ])
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FeedbackResponse {
    pub record_id: i64,
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct FeedbackCheckRequest {
    pub table_id: i64,
    pub data_need: String,
    pub target_entity: Option<String>,
    pub target_product: Option<String>,
    pub target_segment: Option<String>,
    pub granularity: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FeedbackCheckResponse {
    pub approval_rate: f64,
    pub sample_count: i64,
    pub is_reliable: bool,
}

/// Record feedback on a recommendation
#[utoipa::path(
    post,
    path = "/api/feedback",
    request_body = FeedbackRequest,
    responses(
        (status = 200, description = "Feedback recorded", body = FeedbackResponse),
        (status = 400, description = "Invalid request")
    ),
    tag = "Feedback"
)]
pub async fn record_feedback(
    State(state): State<Arc<AppState>>,
    Json(request): Json<FeedbackRequest>,
) -> ApiResult<Json<FeedbackResponse>> {
    request.validate()?;

    if request.outcome == FeedbackOutcome::Modified {
        match request.actual_table_id {
            Some(actual) if actual != request.table_id => {},
            _ => {
                return Err(ApiError::validation(
                    "MODIFIED feedback requires a distinct actual_table_id",
                ));
            },
        }
    }

    let concept_hash = request.concept_hash();

    let record_id = state
        .feedback_store
        .record_decision(NewDecisionRecord {
            request_id: request.request_id.clone(),
            concept_hash: concept_hash.clone(),
            domain_id: request.domain_id.clone(),
            owner_id: request.owner_id,
            table_id: request.table_id,
            outcome: request.outcome,
            actual_table_id: request.actual_table_id,
            confidence_at_decision: request.confidence_at_decision,
            use_case: request.use_case.clone(),
        })
        .await?;

    // A correction also teaches the store which table was right.
    if request.outcome == FeedbackOutcome::Modified
        && let Some(actual_table_id) = request.actual_table_id
    {
        state
            .feedback_store
            .record_decision(NewDecisionRecord {
                request_id: request.request_id.clone(),
                concept_hash,
                domain_id: request.domain_id.clone(),
                owner_id: request.owner_id,
                table_id: actual_table_id,
                outcome: FeedbackOutcome::Approved,
                actual_table_id: None,
                confidence_at_decision: request.confidence_at_decision,
                use_case: request.use_case.clone(),
            })
            .await?;
    }

    state.metrics.record_feedback(
        request.outcome.as_str(),
        request.table_id,
        request.confidence_at_decision,
    );

    Ok(Json(FeedbackResponse {
        record_id,
        success: true,
        message: format!("Feedback recorded: {}", request.outcome.as_str()),
    }))
}

/// Check the historical approval rate for an intent + table pair
#[utoipa::path(
    post,
    path = "/api/feedback/check",
    request_body = FeedbackCheckRequest,
    responses(
        (status = 200, description = "Historical approval data", body = FeedbackCheckResponse)
    ),
    tag = "Feedback"
)]
pub async fn check_feedback(
    State(state): State<Arc<AppState>>,
    Json(request): Json<FeedbackCheckRequest>,
) -> ApiResult<Json<FeedbackCheckResponse>> {
    let concept_hash = concept_hash_from_parts(&[
        Some(request.data_need.as_str()),
        request.target_entity.as_deref(),
        request.target_product.as_deref(),
        request.target_segment.as_deref(),
        request.granularity.as_deref(),
    ]);

    let min_samples = state.feedback_store.min_samples;
    let (approval_rate, sample_count) = state
        .feedback_store
        .historical_score(&concept_hash, request.table_id, min_samples)
        .await?;

    Ok(Json(FeedbackCheckResponse {
        approval_rate,
        sample_count,
        is_reliable: sample_count >= min_samples || sample_count == -1,
    }))
}

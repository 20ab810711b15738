//! Workflow API handlers: match selection, owner and requester responses.
//!
//! The caller's collaborator identity comes from the `X-Collaborator-Id`
//! header (authentication itself lives outside this service).

use axum::Json;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::AppState;
use crate::models::{
    CaseVariable, OwnerResponseRow, OwnerResponseType, RequesterResponseRow,
    RequesterResponseType, WorkflowMatch,
};
use crate::services::workflow_service::{
    OwnerResponseInput, PendingOwnerItem, RequesterResponseInput,
};
use crate::utils::{ApiError, ApiResult};

pub fn collaborator_id(headers: &HeaderMap) -> ApiResult<i64> {
    headers
        .get("x-collaborator-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| ApiError::validation("X-Collaborator-Id header is required"))
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SelectMatchRequest {
    pub match_id: i64,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct OwnerRespondRequest {
    pub response_type: OwnerResponseType,
    #[serde(flatten)]
    pub input: OwnerResponseInput,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RequesterRespondRequest {
    pub response_type: RequesterResponseType,
    #[serde(flatten)]
    pub input: RequesterResponseInput,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OwnerRespondResponse {
    #[serde(rename = "match")]
    pub workflow_match: WorkflowMatch,
    pub response: OwnerResponseRow,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RequesterRespondResponse {
    #[serde(rename = "match")]
    pub workflow_match: WorkflowMatch,
    pub response: RequesterResponseRow,
}

/// Select a candidate match for a variable
#[utoipa::path(
    post,
    path = "/api/variables/{id}/select",
    params(("id" = i64, Path, description = "Variable ID")),
    request_body = SelectMatchRequest,
    responses(
        (status = 200, description = "Match selected, owner notified", body = WorkflowMatch),
        (status = 404, description = "Variable or match not found"),
        (status = 409, description = "Match not selectable in its current state")
    ),
    tag = "Workflow"
)]
pub async fn select_match(
    State(state): State<Arc<AppState>>,
    Path(variable_id): Path<i64>,
    headers: HeaderMap,
    Json(request): Json<SelectMatchRequest>,
) -> ApiResult<Json<WorkflowMatch>> {
    let selected_by = collaborator_id(&headers)?;
    let updated = state
        .workflow
        .select_match(variable_id, request.match_id, selected_by)
        .await?;
    Ok(Json(updated))
}

/// Structured owner response to a pending match
#[utoipa::path(
    post,
    path = "/api/matches/{id}/owner-respond",
    params(("id" = i64, Path, description = "Match ID")),
    request_body = OwnerRespondRequest,
    responses(
        (status = 200, description = "Response applied", body = OwnerRespondResponse),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "Match is not pending owner approval")
    ),
    tag = "Workflow"
)]
pub async fn owner_respond(
    State(state): State<Arc<AppState>>,
    Path(match_id): Path<i64>,
    headers: HeaderMap,
    Json(request): Json<OwnerRespondRequest>,
) -> ApiResult<Json<OwnerRespondResponse>> {
    let responder_id = collaborator_id(&headers)?;
    let (workflow_match, response) = state
        .workflow
        .owner_respond(match_id, responder_id, request.response_type, request.input)
        .await?;
    Ok(Json(OwnerRespondResponse { workflow_match, response }))
}

/// Requester confirmation or rejection after owner validation
#[utoipa::path(
    post,
    path = "/api/matches/{id}/requester-respond",
    params(("id" = i64, Path, description = "Match ID")),
    request_body = RequesterRespondRequest,
    responses(
        (status = 200, description = "Response applied", body = RequesterRespondResponse),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "Match is not pending requester confirmation")
    ),
    tag = "Workflow"
)]
pub async fn requester_respond(
    State(state): State<Arc<AppState>>,
    Path(match_id): Path<i64>,
    headers: HeaderMap,
    Json(request): Json<RequesterRespondRequest>,
) -> ApiResult<Json<RequesterRespondResponse>> {
    let responder_id = collaborator_id(&headers)?;
    let (workflow_match, response) = state
        .workflow
        .requester_respond(match_id, responder_id, request.response_type, request.input)
        .await?;
    Ok(Json(RequesterRespondResponse { workflow_match, response }))
}

/// Mark an approved variable as in use (case creator only)
#[utoipa::path(
    post,
    path = "/api/variables/{id}/in-use",
    params(("id" = i64, Path, description = "Variable ID")),
    responses(
        (status = 200, description = "Variable marked as in use", body = CaseVariable),
        (status = 409, description = "Variable is not approved")
    ),
    tag = "Workflow"
)]
pub async fn mark_in_use(
    State(state): State<Arc<AppState>>,
    Path(variable_id): Path<i64>,
    headers: HeaderMap,
) -> ApiResult<Json<CaseVariable>> {
    let user_id = collaborator_id(&headers)?;
    let variable = state.workflow.mark_in_use(variable_id, user_id).await?;
    Ok(Json(variable))
}

/// List all matches for a variable, best first
#[utoipa::path(
    get,
    path = "/api/variables/{id}/matches",
    params(("id" = i64, Path, description = "Variable ID")),
    responses(
        (status = 200, description = "Matches for the variable", body = Vec<WorkflowMatch>),
        (status = 404, description = "Variable not found")
    ),
    tag = "Workflow"
)]
pub async fn list_matches(
    State(state): State<Arc<AppState>>,
    Path(variable_id): Path<i64>,
) -> ApiResult<Json<Vec<WorkflowMatch>>> {
    let matches = state.workflow.matches_for_variable(variable_id).await?;
    Ok(Json(matches))
}

/// Matches pending the calling owner's review
#[utoipa::path(
    get,
    path = "/api/matches/pending",
    responses(
        (status = 200, description = "Pending validations for the caller", body = Vec<PendingOwnerItem>)
    ),
    tag = "Workflow"
)]
pub async fn pending_for_owner(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<PendingOwnerItem>>> {
    let owner_id = collaborator_id(&headers)?;
    let items = state.workflow.pending_for_owner(owner_id).await?;
    Ok(Json(items))
}

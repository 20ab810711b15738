//! Involvement API handlers.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use std::sync::Arc;

use super::workflow::collaborator_id;
use crate::AppState;
use crate::models::{Involvement, InvolvementStats};
use crate::services::involvement_service::{
    CompleteInvolvementInput, CreateInvolvementInput, InvolvementFilter, SetExpectedDateInput,
};
use crate::utils::ApiResult;

/// Open an involvement for a variable whose data must be created
#[utoipa::path(
    post,
    path = "/api/involvements",
    request_body = CreateInvolvementInput,
    responses(
        (status = 200, description = "Involvement created", body = Involvement),
        (status = 409, description = "Active involvement already exists")
    ),
    tag = "Involvements"
)]
pub async fn create_involvement(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(input): Json<CreateInvolvementInput>,
) -> ApiResult<Json<Involvement>> {
    let requester_id = collaborator_id(&headers)?;
    let involvement = state.involvements.create(input, requester_id).await?;
    Ok(Json(involvement))
}

/// List involvements with optional filters
#[utoipa::path(
    get,
    path = "/api/involvements",
    responses(
        (status = 200, description = "Involvements", body = Vec<Involvement>)
    ),
    tag = "Involvements"
)]
pub async fn list_involvements(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<InvolvementFilter>,
) -> ApiResult<Json<Vec<Involvement>>> {
    let involvements = state.involvements.list(&filter).await?;
    Ok(Json(involvements))
}

/// Involvement counts per status plus average completion slip
#[utoipa::path(
    get,
    path = "/api/involvements/stats",
    responses(
        (status = 200, description = "Involvement statistics", body = InvolvementStats)
    ),
    tag = "Involvements"
)]
pub async fn involvement_stats(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<InvolvementFilter>,
) -> ApiResult<Json<InvolvementStats>> {
    let stats = state.involvements.stats(filter.owner_id).await?;
    Ok(Json(stats))
}

/// Owner sets the expected completion date
#[utoipa::path(
    put,
    path = "/api/involvements/{id}/date",
    params(("id" = i64, Path, description = "Involvement ID")),
    request_body = SetExpectedDateInput,
    responses(
        (status = 200, description = "Date set", body = Involvement),
        (status = 409, description = "Involvement already completed")
    ),
    tag = "Involvements"
)]
pub async fn set_expected_date(
    State(state): State<Arc<AppState>>,
    Path(involvement_id): Path<i64>,
    headers: HeaderMap,
    Json(input): Json<SetExpectedDateInput>,
) -> ApiResult<Json<Involvement>> {
    let owner_id = collaborator_id(&headers)?;
    let involvement = state
        .involvements
        .set_expected_date(involvement_id, input, owner_id)
        .await?;
    Ok(Json(involvement))
}

/// Owner completes the involvement with the created table and concept
#[utoipa::path(
    put,
    path = "/api/involvements/{id}/complete",
    params(("id" = i64, Path, description = "Involvement ID")),
    request_body = CompleteInvolvementInput,
    responses(
        (status = 200, description = "Involvement completed", body = Involvement),
        (status = 409, description = "Involvement already completed")
    ),
    tag = "Involvements"
)]
pub async fn complete_involvement(
    State(state): State<Arc<AppState>>,
    Path(involvement_id): Path<i64>,
    headers: HeaderMap,
    Json(input): Json<CompleteInvolvementInput>,
) -> ApiResult<Json<Involvement>> {
    let owner_id = collaborator_id(&headers)?;
    let involvement = state
        .involvements
        .complete(involvement_id, input, owner_id)
        .await?;
    Ok(Json(involvement))
}

//! Administrative handlers: catalog synchronization from the source system.

use axum::Json;
use axum::extract::State;
use std::sync::Arc;

use crate::AppState;
use crate::services::{CatalogSyncRequest, CatalogSyncResponse};
use crate::utils::ApiResult;

/// Ingest catalog metadata, re-index the retriever and swap the snapshot
#[utoipa::path(
    post,
    path = "/api/admin/catalog/sync",
    request_body = CatalogSyncRequest,
    responses(
        (status = 200, description = "Catalog synced", body = CatalogSyncResponse),
        (status = 500, description = "Snapshot integrity violation")
    ),
    tag = "Admin"
)]
pub async fn sync_catalog(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CatalogSyncRequest>,
) -> ApiResult<Json<CatalogSyncResponse>> {
    let response = state.catalog_service.sync(request).await?;
    Ok(Json(response))
}

//! Monitoring API handlers: metrics, health, dashboard and forced syncs.

use axum::Json;
use axum::extract::State;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::AppState;
use crate::services::exporter::ExporterStatus;
use crate::services::feedback_store::FeedbackStoreStats;
use crate::services::intent_cache::IntentCacheStats;
use crate::services::metrics_collector::{AggregatedMetrics, CurrentStats};
use crate::services::quality::{QualityCacheStats, SyncResult};
use crate::services::ServiceHealth;
use crate::utils::{ApiError, ApiResult};

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MetricsResponse {
    pub current: CurrentStats,
    pub intent_cache: IntentCacheStats,
    pub quality_cache: QualityCacheStats,
    pub feedback_store: FeedbackStoreStats,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DashboardResponse {
    pub health: ServiceHealth,
    pub metrics: CurrentStats,
    pub hourly: AggregatedMetrics,
    pub daily: AggregatedMetrics,
    pub exporter: ExporterStatus,
    pub quality_cache: QualityCacheStats,
    pub intent_cache: IntentCacheStats,
}

/// Current service metrics
#[utoipa::path(
    get,
    path = "/api/monitoring/metrics",
    responses((status = 200, description = "Current metrics", body = MetricsResponse)),
    tag = "Monitoring"
)]
pub async fn get_metrics(State(state): State<Arc<AppState>>) -> ApiResult<Json<MetricsResponse>> {
    Ok(Json(MetricsResponse {
        current: state.metrics.current_stats(),
        intent_cache: state.intent_cache.stats(),
        quality_cache: state.quality_cache.stats(),
        feedback_store: state.feedback_store.stats().await?,
    }))
}

/// Metrics aggregated over the last hour
#[utoipa::path(
    get,
    path = "/api/monitoring/metrics/hourly",
    responses((status = 200, description = "Hourly aggregate", body = AggregatedMetrics)),
    tag = "Monitoring"
)]
pub async fn get_hourly_metrics(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<AggregatedMetrics>> {
    Ok(Json(state.metrics.aggregate_hourly()))
}

/// Component health aggregation
#[utoipa::path(
    get,
    path = "/api/monitoring/health",
    responses((status = 200, description = "Service health", body = ServiceHealth)),
    tag = "Monitoring"
)]
pub async fn get_health(State(state): State<Arc<AppState>>) -> ApiResult<Json<ServiceHealth>> {
    Ok(Json(state.health.check_all().await))
}

/// Combined dashboard view
#[utoipa::path(
    get,
    path = "/api/monitoring/dashboard",
    responses((status = 200, description = "Dashboard payload", body = DashboardResponse)),
    tag = "Monitoring"
)]
pub async fn get_dashboard(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<DashboardResponse>> {
    Ok(Json(DashboardResponse {
        health: state.health.check_all().await,
        metrics: state.metrics.current_stats(),
        hourly: state.metrics.aggregate_hourly(),
        daily: state.metrics.aggregate_daily(),
        exporter: state.exporter.status(),
        quality_cache: state.quality_cache.stats(),
        intent_cache: state.intent_cache.stats(),
    }))
}

/// Force an immediate metrics export
#[utoipa::path(
    post,
    path = "/api/monitoring/export/now",
    responses((status = 200, description = "Export triggered", body = ExporterStatus)),
    tag = "Monitoring"
)]
pub async fn export_now(State(state): State<Arc<AppState>>) -> ApiResult<Json<ExporterStatus>> {
    Ok(Json(state.exporter.export_now().await))
}

/// Force a full quality sync, bypassing the daily guard
#[utoipa::path(
    post,
    path = "/api/monitoring/quality/sync",
    responses(
        (status = 200, description = "Sync executed", body = SyncResult),
        (status = 503, description = "Quality source unavailable")
    ),
    tag = "Monitoring"
)]
pub async fn force_quality_sync(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<SyncResult>> {
    let result = state
        .quality_sync
        .force_sync()
        .await
        .map_err(|e| ApiError::DependencyUnavailable(e.to_string()))?;
    Ok(Json(result))
}

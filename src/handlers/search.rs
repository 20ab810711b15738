//! Search API handlers.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::AppState;
use crate::models::{AmbiguityResult, DomainMatch, OwnerMatch, TableMatch};
use crate::services::search::{SearchInput, SearchMode, SearchOutcome};
use crate::utils::ApiResult;

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SearchRequest {
    pub raw_query: Option<String>,
    pub variable_name: Option<String>,
    pub variable_type: Option<String>,

    // Context
    pub produto: Option<String>,
    pub segmento: Option<String>,
    pub publico: Option<String>,
    pub granularidade: Option<String>,
    #[serde(default = "default_use_case")]
    pub use_case: String,

    // Search options
    #[serde(default)]
    pub search_mode: SearchMode,
    #[serde(default = "default_true")]
    pub enable_rerank: bool,
}

fn default_use_case() -> String {
    "default".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ScoreBreakdown {
    pub total: f64,
    pub semantic: f64,
    pub historical: f64,
    pub certification: f64,
    pub freshness: f64,
    pub quality: f64,
    pub context: f64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TableResponse {
    pub id: i64,
    pub name: String,
    pub display_name: String,
    pub summary: String,
    pub domain_name: String,
    pub owner_name: String,
    pub data_layer: Option<String>,
    pub is_golden_source: bool,
    pub is_visao_cliente: bool,
    pub score: f64,
    pub score_breakdown: ScoreBreakdown,
    pub is_double_certified: bool,
    pub has_product_match: bool,
    pub matched_entities: Vec<String>,
    pub reasoning: String,
}

impl From<&TableMatch> for TableResponse {
    fn from(m: &TableMatch) -> Self {
        Self {
            id: m.table.id,
            name: m.table.name.clone(),
            display_name: m.table.display_name.clone(),
            summary: m.table.summary.clone(),
            domain_name: m.table.domain_name.clone(),
            owner_name: m.table.owner_name.clone(),
            data_layer: m.table.data_layer.map(|l| l.as_str().to_string()),
            is_golden_source: m.table.is_golden_source,
            is_visao_cliente: m.table.is_visao_cliente,
            score: m.score,
            score_breakdown: ScoreBreakdown {
                total: m.score,
                semantic: m.semantic_score,
                historical: m.historical_score,
                certification: m.certification_score,
                freshness: m.freshness_score,
                quality: m.quality_score,
                context: m.context_score,
            },
            is_double_certified: m.is_double_certified,
            has_product_match: m.has_product_match,
            matched_entities: m.matched_entities.clone(),
            reasoning: m.reasoning.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SingleMatchResponse {
    pub request_id: String,

    pub domain_id: String,
    pub domain_name: String,
    pub owner_id: i64,
    pub owner_name: String,

    pub table: Option<TableResponse>,

    pub domain_confidence: f64,
    pub owner_confidence: f64,
    pub table_confidence: Option<f64>,
    pub overall_confidence: f64,

    pub data_exists: String,
    pub action: crate::models::RecommendedAction,
    pub reasoning: String,

    pub ambiguity: AmbiguityResult,
    pub llm_reranked: bool,

    pub processing_time_ms: u64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RankingResponse {
    pub request_id: String,

    pub domains: Vec<DomainMatch>,
    pub owners: Vec<OwnerMatch>,
    pub tables: Vec<TableResponse>,

    pub summary: String,
    pub clarifying_question: Option<String>,

    pub ambiguity: AmbiguityResult,
    pub llm_reranked: bool,

    pub processing_time_ms: u64,
}

fn request_id_from(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string()[..8].to_string())
}

fn input_from(request: SearchRequest, request_id: String) -> SearchInput {
    let mut context: BTreeMap<String, String> = BTreeMap::new();
    for (key, value) in [
        ("produto", &request.produto),
        ("segmento", &request.segmento),
        ("publico", &request.publico),
        ("granularidade", &request.granularidade),
    ] {
        if let Some(value) = value.as_deref().filter(|v| !v.trim().is_empty()) {
            context.insert(key.to_string(), value.trim().to_string());
        }
    }
    context.insert("use_case".to_string(), request.use_case.clone());

    SearchInput {
        request_id,
        raw_query: request
            .raw_query
            .or(request.variable_name.clone())
            .unwrap_or_default(),
        variable_name: request.variable_name,
        variable_type: request.variable_type,
        context,
        use_case: request.use_case,
        search_mode: request.search_mode,
        enable_rerank: request.enable_rerank,
    }
}

/// Full-featured single-match search
#[utoipa::path(
    post,
    path = "/api/search/single",
    request_body = SearchRequest,
    responses(
        (status = 200, description = "Best domain/owner/table recommendation", body = SingleMatchResponse),
        (status = 400, description = "Invalid request")
    ),
    tag = "Search"
)]
pub async fn search_single(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<SearchRequest>,
) -> ApiResult<Json<SingleMatchResponse>> {
    let request_id = request_id_from(&headers);
    let input = input_from(request, request_id.clone());

    let outcome = state.search_service.run(input).await;
    Ok(Json(single_response(request_id, outcome)))
}

fn single_response(request_id: String, outcome: SearchOutcome) -> SingleMatchResponse {
    let (domain_id, domain_name) = outcome
        .matched_domains
        .first()
        .map(|d| (d.domain.id.clone(), d.domain.name.clone()))
        .unwrap_or_else(|| ("unknown".to_string(), "Não identificado".to_string()));

    let (owner_id, owner_name) = outcome
        .matched_owners
        .first()
        .map(|o| (o.owner.id, o.owner.name.clone()))
        .unwrap_or((0, "Não identificado".to_string()));

    SingleMatchResponse {
        request_id,
        domain_id,
        domain_name,
        owner_id,
        owner_name,
        table: outcome.best_table.as_ref().map(TableResponse::from),
        domain_confidence: outcome.domain_confidence,
        owner_confidence: outcome.owner_confidence,
        table_confidence: outcome.table_confidence,
        overall_confidence: outcome.overall_confidence,
        data_exists: outcome.data_existence.as_str().to_string(),
        action: outcome.action,
        reasoning: outcome.reasoning,
        ambiguity: outcome.ambiguity,
        llm_reranked: outcome.llm_reranked,
        processing_time_ms: outcome.processing_time_ms,
    }
}

/// Full ranking search: up to 5 domains, owners and tables
#[utoipa::path(
    post,
    path = "/api/search/ranking",
    request_body = SearchRequest,
    responses(
        (status = 200, description = "Ranked domains, owners and tables", body = RankingResponse),
        (status = 400, description = "Invalid request")
    ),
    tag = "Search"
)]
pub async fn search_ranking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<SearchRequest>,
) -> ApiResult<Json<RankingResponse>> {
    let request_id = request_id_from(&headers);
    let input = input_from(request, request_id.clone());

    let outcome = state.search_service.run(input).await;

    Ok(Json(RankingResponse {
        request_id,
        domains: outcome.matched_domains.iter().take(5).cloned().collect(),
        owners: outcome.matched_owners.iter().take(5).cloned().collect(),
        tables: outcome
            .matched_tables
            .iter()
            .take(5)
            .map(TableResponse::from)
            .collect(),
        summary: outcome.summary,
        clarifying_question: outcome.clarifying_question,
        ambiguity: outcome.ambiguity,
        llm_reranked: outcome.llm_reranked,
        processing_time_ms: outcome.processing_time_ms,
    }))
}

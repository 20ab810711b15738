//! Retrieval pipeline.
//!
//! A DAG over a shared typed state:
//!
//! ```text
//! request → normalize_intent → search_domains → search_owners
//!         → (search_tables ∥ search_columns) → merge_results
//!         → llm_rerank? → check_ambiguity → decide → record
//! ```
//!
//! Nodes run sequentially except the table/column branch, which joins at the
//! merge. Dependency failures are absorbed into neutral values; the pipeline
//! itself never errors.

pub mod ambiguity;
pub mod column_search;
pub mod decision;
pub mod domain_search;
pub mod owner_search;
pub mod reranker;
pub mod scorer;
pub mod state;
pub mod table_search;

pub use ambiguity::AmbiguityDetector;
pub use decision::{DecisionThresholds, SearchOutcome};
pub use state::{SearchInput, SearchMode, SearchState};

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::SearchConfig;
use crate::models::CatalogHandle;
use crate::services::feedback_store::FeedbackStore;
use crate::services::intent_service::IntentNormalizer;
use crate::services::llm::LanguageModel;
use crate::services::metrics_collector::{MetricsCollector, RequestMetrics};
use crate::services::quality::QualityCache;
use crate::services::retriever::Retriever;

pub struct SearchService {
    intent: Arc<IntentNormalizer>,
    catalog: CatalogHandle,
    retriever: Arc<dyn Retriever>,
    llm: Arc<dyn LanguageModel>,
    feedback: Arc<FeedbackStore>,
    quality: Arc<QualityCache>,
    metrics: Arc<MetricsCollector>,
    config: SearchConfig,
    llm_deadline: Duration,
}

impl SearchService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        intent: Arc<IntentNormalizer>,
        catalog: CatalogHandle,
        retriever: Arc<dyn Retriever>,
        llm: Arc<dyn LanguageModel>,
        feedback: Arc<FeedbackStore>,
        quality: Arc<QualityCache>,
        metrics: Arc<MetricsCollector>,
        config: SearchConfig,
        llm_deadline: Duration,
    ) -> Self {
        Self { intent, catalog, retriever, llm, feedback, quality, metrics, config, llm_deadline }
    }

    /// Run the full DAG for one request.
    pub async fn run(&self, input: SearchInput) -> SearchOutcome {
        let started = Instant::now();
        let mut state = SearchState::default();

        // normalize_intent
        let intent_started = Instant::now();
        let normalized = self
            .intent
            .normalize(
                &input.raw_query,
                input.variable_name.as_deref(),
                input.variable_type.as_deref(),
                Some(&input.context),
            )
            .await;
        if !normalized.cache_hit {
            if normalized.intent.extraction_confidence < 0.5 {
                // Model fallback path; the caller still gets an answer.
                self.metrics.record_error("intent_extraction");
            } else {
                self.metrics.record_llm_call("intent");
            }
        }
        state.intent = Some(normalized.intent);
        state.intent_cache_hit = normalized.cache_hit;
        let intent_latency_ms = intent_started.elapsed().as_millis() as i64;

        let catalog = self.catalog.load();

        // search_domains → search_owners
        state.matched_domains = domain_search::search_domains(state.intent.as_ref(), &catalog);
        state.matched_owners = owner_search::search_owners(&state.matched_domains, &catalog);

        // search_tables ∥ search_columns
        let search_started = Instant::now();
        let skip_tables = input.search_mode == SearchMode::ColumnOnly;
        let (table_branch, column_branch) = tokio::join!(
            async {
                if skip_tables {
                    (Vec::new(), None)
                } else {
                    let (matches, existence) = table_search::search_tables_with_disambiguation(
                        &input,
                        &state,
                        self.retriever.as_ref(),
                        &self.feedback,
                        &self.quality,
                        &catalog,
                    )
                    .await;
                    (matches, Some(existence))
                }
            },
            column_search::search_by_columns(&input, &state, self.retriever.as_ref()),
        );
        state.matched_tables = table_branch.0;
        state.data_existence = table_branch.1;
        state.column_results = column_branch;
        let search_latency_ms = search_started.elapsed().as_millis() as i64;

        // merge_results
        let columns_found = state
            .column_results
            .iter()
            .map(|c| c.matched_entities.len())
            .sum();
        state.matched_tables = column_search::merge_column_and_table_results(
            std::mem::take(&mut state.matched_tables),
            std::mem::take(&mut state.column_results),
        );
        if state.data_existence.is_none() {
            state.data_existence = Some(table_search::data_existence_for(&state.matched_tables));
        }

        // llm_rerank (conditional)
        let rerank_started = Instant::now();
        let (reranked_tables, llm_reranked) = reranker::llm_rerank(
            &input,
            &state,
            self.llm.as_ref(),
            self.config.rerank_spread_threshold,
            self.config.rerank_max_candidates,
            self.llm_deadline,
        )
        .await;
        state.matched_tables = reranked_tables;
        state.llm_reranked = llm_reranked;
        if llm_reranked {
            self.metrics.record_llm_call("rerank");
        }
        let rerank_latency_ms = rerank_started.elapsed().as_millis() as i64;

        // check_ambiguity
        let detector = AmbiguityDetector::new(
            self.config.score_tie_threshold,
            self.config.minimum_confidence,
        );
        let user_product = input
            .user_product(state.intent.as_ref())
            .map(str::to_string);
        state.ambiguity = Some(detector.detect(
            &state.matched_tables,
            &state.matched_domains,
            user_product.as_deref(),
        ));

        // decide
        let thresholds = DecisionThresholds {
            use_table_threshold: self.config.action_use_table_threshold,
            minimum_confidence: self.config.minimum_confidence,
        };
        let mut outcome = decision::decide(&input, state, &thresholds);
        outcome.processing_time_ms = started.elapsed().as_millis() as u64;

        // record
        self.record(&input, &outcome, intent_latency_ms, search_latency_ms, rerank_latency_ms,
            columns_found);

        outcome
    }

    fn record(
        &self,
        input: &SearchInput,
        outcome: &SearchOutcome,
        intent_latency_ms: i64,
        search_latency_ms: i64,
        rerank_latency_ms: i64,
        columns_found: usize,
    ) {
        let top = outcome.matched_tables.first();

        let result_label = if outcome.ambiguity.is_ambiguous {
            "AMBIGUOUS"
        } else {
            match outcome.data_existence {
                crate::models::DataExistence::Exists => "HIT",
                _ => "MISS",
            }
        };

        self.metrics.record_request(RequestMetrics {
            request_id: input.request_id.clone(),
            timestamp: chrono::Utc::now(),
            total_latency_ms: outcome.processing_time_ms as i64,
            intent_latency_ms,
            search_latency_ms,
            rerank_latency_ms,
            tables_found: outcome.matched_tables.len(),
            columns_found,
            top_score: top.map(|t| t.score).unwrap_or(0.0),
            outcome: Some(result_label.to_string()),
            ambiguity_type: Some(outcome.ambiguity.kind.as_str().to_string()),
            llm_reranked: outcome.llm_reranked,
            semantic_score: top.map(|t| t.semantic_score).unwrap_or(0.0),
            historical_score: top.map(|t| t.historical_score).unwrap_or(0.0),
            certification_score: top.map(|t| t.certification_score).unwrap_or(0.0),
            freshness_score: top.map(|t| t.freshness_score).unwrap_or(0.0),
            quality_score: top.map(|t| t.quality_score).unwrap_or(0.0),
            use_case: input.use_case.clone(),
            domain: outcome
                .matched_domains
                .first()
                .map(|d| d.domain.name.clone()),
            has_product_context: input.context.contains_key("produto"),
            intent_cache_hit: outcome.intent_cache_hit,
            quality_cache_hit: top.is_some_and(|t| self.quality.get(&t.table.name).is_some()),
        });

        tracing::debug!(
            request_id = %input.request_id,
            tables = outcome.matched_tables.len(),
            result = result_label,
            elapsed_ms = outcome.processing_time_ms,
            "search completed"
        );
    }
}

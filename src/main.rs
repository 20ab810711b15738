use axum::{
    Router,
    routing::{get, post, put},
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use faro::config::Config;
use faro::db;
use faro::models::CatalogHandle;
use faro::services::{
    CatalogService, ChatCompletionClient, DataMeshExporter, DbNotifier, FeedbackStore,
    HealthChecker, HttpQualitySource, HttpRetriever, IntentCache, IntentNormalizer,
    InvolvementService, LanguageModel, LlmSettings, MemoryRetriever, MetricsCollector,
    MockQualitySource, QualityCache, QualitySource, QualitySyncTask, Retriever, SearchService,
    SynonymDictionary, WorkflowService,
};
use faro::services::involvement_service::InvolvementSweepTask;
use faro::utils::ScheduledExecutor;
use faro::{AppState, handlers};

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::search::search_single,
        handlers::search::search_ranking,

        handlers::feedback::record_feedback,
        handlers::feedback::check_feedback,

        handlers::workflow::select_match,
        handlers::workflow::owner_respond,
        handlers::workflow::requester_respond,
        handlers::workflow::mark_in_use,
        handlers::workflow::list_matches,
        handlers::workflow::pending_for_owner,

        handlers::involvement::create_involvement,
        handlers::involvement::list_involvements,
        handlers::involvement::involvement_stats,
        handlers::involvement::set_expected_date,
        handlers::involvement::complete_involvement,

        handlers::monitoring::get_metrics,
        handlers::monitoring::get_hourly_metrics,
        handlers::monitoring::get_health,
        handlers::monitoring::get_dashboard,
        handlers::monitoring::export_now,
        handlers::monitoring::force_quality_sync,

        handlers::admin::sync_catalog,
    ),
    components(
        schemas(
            handlers::search::SearchRequest,
            handlers::search::SingleMatchResponse,
            handlers::search::RankingResponse,
            handlers::search::TableResponse,
            handlers::search::ScoreBreakdown,
            handlers::feedback::FeedbackRequest,
            handlers::feedback::FeedbackResponse,
            handlers::feedback::FeedbackCheckRequest,
            handlers::feedback::FeedbackCheckResponse,
            handlers::workflow::SelectMatchRequest,
            handlers::workflow::OwnerRespondRequest,
            handlers::workflow::RequesterRespondRequest,
            handlers::workflow::OwnerRespondResponse,
            handlers::workflow::RequesterRespondResponse,
            handlers::monitoring::MetricsResponse,
            handlers::monitoring::DashboardResponse,
            faro::models::Intent,
            faro::models::DomainInfo,
            faro::models::OwnerInfo,
            faro::models::TableInfo,
            faro::models::DomainMatch,
            faro::models::OwnerMatch,
            faro::models::TableMatch,
            faro::models::AmbiguityResult,
            faro::models::AmbiguityType,
            faro::models::ClarifyingOption,
            faro::models::DataExistence,
            faro::models::RecommendedAction,
            faro::models::MatchStatus,
            faro::models::VariableStatus,
            faro::models::OwnerResponseType,
            faro::models::RequesterResponseType,
            faro::models::WorkflowMatch,
            faro::models::CaseVariable,
            faro::models::Involvement,
            faro::models::InvolvementStatus,
            faro::models::InvolvementStats,
            faro::models::FeedbackOutcome,
        )
    ),
    tags(
        (name = "Search", description = "Catalog search endpoints"),
        (name = "Feedback", description = "Decision feedback endpoints"),
        (name = "Workflow", description = "Match validation workflow"),
        (name = "Involvements", description = "Data creation requests"),
        (name = "Monitoring", description = "Metrics and health"),
        (name = "Admin", description = "Catalog administration"),
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let config = Config::load()?;

    let log_filter = tracing_subscriber::EnvFilter::new(&config.logging.level);
    let registry = tracing_subscriber::registry().with(log_filter);

    let _guard;
    if let Some(log_file) = &config.logging.file {
        let log_path = std::path::Path::new(log_file);
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let log_dir = log_path.parent().and_then(|p| p.to_str()).unwrap_or("logs");
        let file_name = log_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("faro.log");
        let file_prefix = file_name.strip_suffix(".log").unwrap_or(file_name);

        let file_appender = tracing_appender::rolling::daily(log_dir, file_prefix);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        _guard = guard;
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(non_blocking))
            .with(tracing_subscriber::fmt::layer())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Faro starting up");
    tracing::info!("Configuration loaded successfully");

    let pool = db::create_pool(&config.database.url).await?;
    tracing::info!("Database pool created successfully");

    // Outbound capabilities
    let llm: Arc<dyn LanguageModel> = Arc::new(ChatCompletionClient::new(LlmSettings {
        api_base: config.llm.api_base.clone(),
        api_key: config.llm.api_key.clone(),
        model: config.llm.model.clone(),
        temperature: config.llm.temperature,
        max_tokens: config.llm.max_tokens,
        enabled: config.llm.enabled,
    }));

    let retriever: Arc<dyn Retriever> = if config.retriever.url.is_empty() {
        tracing::warn!("Retriever URL not configured, using in-memory index");
        Arc::new(MemoryRetriever::new())
    } else {
        Arc::new(HttpRetriever::new(
            config.retriever.url.clone(),
            config.retriever.timeout_seconds,
        ))
    };

    let quality_source: Arc<dyn QualitySource> = if config.quality.source_url.is_empty() {
        tracing::warn!("Quality source URL not configured, using mock metrics");
        Arc::new(MockQualitySource::default())
    } else {
        Arc::new(HttpQualitySource::new(config.quality.source_url.clone()))
    };

    let notifier = Arc::new(DbNotifier::new(pool.clone()));

    // Core services
    let synonyms = Arc::new(SynonymDictionary::new(
        config
            .synonyms
            .file
            .as_deref()
            .map(std::path::Path::new),
    ));

    let intent_cache = Arc::new(IntentCache::new(
        config.search.intent_cache_size,
        config.search.intent_cache_ttl_days,
    ));

    let llm_deadline = Duration::from_secs(config.llm.timeout_seconds);
    let intent_normalizer = Arc::new(IntentNormalizer::new(
        Arc::clone(&llm),
        Arc::clone(&intent_cache),
        Arc::clone(&synonyms),
        llm_deadline,
    ));

    let feedback_store = Arc::new(FeedbackStore::new(
        pool.clone(),
        config.feedback.cache_ttl_minutes,
        config.feedback.min_samples,
    ));

    let quality_cache = Arc::new(QualityCache::new(config.quality.max_stale_hours));
    let quality_sync = Arc::new(QualitySyncTask::new(
        Arc::clone(&quality_cache),
        Arc::clone(&quality_source),
        config.quality.sync_hour,
    ));

    let metrics = Arc::new(MetricsCollector::new(config.metrics_export.max_events));
    let exporter = Arc::new(DataMeshExporter::new(
        Arc::clone(&metrics),
        config.metrics_export.clone(),
    ));

    let catalog_handle = CatalogHandle::default();
    let catalog_service = Arc::new(CatalogService::new(
        catalog_handle.clone(),
        Arc::clone(&retriever),
        Arc::clone(&llm),
        pool.clone(),
    ));

    let search_service = Arc::new(SearchService::new(
        Arc::clone(&intent_normalizer),
        catalog_handle,
        Arc::clone(&retriever),
        Arc::clone(&llm),
        Arc::clone(&feedback_store),
        Arc::clone(&quality_cache),
        Arc::clone(&metrics),
        config.search.clone(),
        llm_deadline,
    ));

    let workflow = Arc::new(WorkflowService::new(
        pool.clone(),
        notifier.clone(),
        Arc::clone(&feedback_store),
    ));

    let involvements = Arc::new(InvolvementService::new(pool.clone(), notifier));

    let health = Arc::new(HealthChecker::new(
        Arc::clone(&llm),
        Arc::clone(&retriever),
        Arc::clone(&quality_cache),
        Arc::clone(&exporter),
        Arc::clone(&metrics),
    ));

    // Startup quality sync; failures keep the stale cache and are retried by
    // the scheduler.
    match quality_sync.force_sync().await {
        Ok(result) => tracing::info!(
            "Startup quality sync: {} ({} tables)",
            result.kind,
            result.synced
        ),
        Err(e) => tracing::warn!("Startup quality sync failed: {}", e),
    }

    // Background schedulers
    let mut shutdown_handles = Vec::new();

    {
        let interval = Duration::from_secs(config.quality.check_interval_hours * 3600);
        let executor = ScheduledExecutor::new("quality-sync", interval);
        shutdown_handles.push(executor.shutdown_handle());
        let task = Arc::clone(&quality_sync);
        tokio::spawn(async move { executor.start(task).await });
        tracing::info!(
            "Quality sync scheduler started (check interval: {}h, daily sync at {:02}:00 UTC)",
            config.quality.check_interval_hours,
            config.quality.sync_hour
        );
    }

    if config.metrics_export.enabled {
        let interval = Duration::from_secs(config.metrics_export.interval_minutes * 60);
        let executor = ScheduledExecutor::new("metrics-exporter", interval);
        shutdown_handles.push(executor.shutdown_handle());
        let task = Arc::clone(&exporter);
        tokio::spawn(async move { executor.start(task).await });
        tracing::info!(
            "Metrics exporter started (interval: {}min, method: {})",
            config.metrics_export.interval_minutes,
            config.metrics_export.method
        );
    } else {
        tracing::warn!("Metrics exporter disabled by configuration");
    }

    {
        let executor =
            ScheduledExecutor::new("involvement-sweep", Duration::from_secs(24 * 3600));
        shutdown_handles.push(executor.shutdown_handle());
        let task = InvolvementSweepTask::new(Arc::clone(&involvements));
        tokio::spawn(async move { executor.start(task).await });
        tracing::info!("Involvement reminder sweep started (interval: 24h)");
    }

    let app_state = Arc::new(AppState {
        db: pool.clone(),
        search_service,
        intent_cache,
        synonyms,
        feedback_store,
        quality_cache,
        quality_sync,
        metrics,
        exporter,
        health,
        workflow,
        involvements,
        catalog_service,
    });

    let api_routes = Router::new()
        .route("/api/search/single", post(handlers::search::search_single))
        .route("/api/search/ranking", post(handlers::search::search_ranking))
        .route("/api/feedback", post(handlers::feedback::record_feedback))
        .route("/api/feedback/check", post(handlers::feedback::check_feedback))
        .route("/api/variables/:id/select", post(handlers::workflow::select_match))
        .route("/api/variables/:id/in-use", post(handlers::workflow::mark_in_use))
        .route("/api/variables/:id/matches", get(handlers::workflow::list_matches))
        .route("/api/matches/pending", get(handlers::workflow::pending_for_owner))
        .route("/api/matches/:id/owner-respond", post(handlers::workflow::owner_respond))
        .route(
            "/api/matches/:id/requester-respond",
            post(handlers::workflow::requester_respond),
        )
        .route(
            "/api/involvements",
            post(handlers::involvement::create_involvement)
                .get(handlers::involvement::list_involvements),
        )
        .route("/api/involvements/stats", get(handlers::involvement::involvement_stats))
        .route("/api/involvements/:id/date", put(handlers::involvement::set_expected_date))
        .route(
            "/api/involvements/:id/complete",
            put(handlers::involvement::complete_involvement),
        )
        .route("/api/monitoring/metrics", get(handlers::monitoring::get_metrics))
        .route("/api/monitoring/metrics/hourly", get(handlers::monitoring::get_hourly_metrics))
        .route("/api/monitoring/health", get(handlers::monitoring::get_health))
        .route("/api/monitoring/dashboard", get(handlers::monitoring::get_dashboard))
        .route("/api/monitoring/export/now", post(handlers::monitoring::export_now))
        .route("/api/monitoring/quality/sync", post(handlers::monitoring::force_quality_sync))
        .route("/api/admin/catalog/sync", post(handlers::admin::sync_catalog))
        .with_state(Arc::clone(&app_state));

    let health_routes = Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(ready_check));

    let app = Router::new()
        .merge(SwaggerUi::new("/api-docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_routes)
        .merge(health_routes)
        .layer(tower_http::timeout::TimeoutLayer::new(Duration::from_millis(
            config.server.request_timeout_ms,
        )))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("API documentation available at http://{}/api-docs", addr);
    tracing::info!("Faro is ready to serve requests");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop schedulers; draining flushes the exporter buffer and finishes the
    // in-flight quality sync.
    for handle in shutdown_handles {
        handle.shutdown();
    }
    tokio::time::sleep(Duration::from_millis(1500)).await;

    if let Some(path) = &config.synonyms.learned_file
        && let Err(e) = app_state.synonyms.save_learned(std::path::Path::new(path))
    {
        tracing::warn!("Failed to persist learned synonyms: {}", e);
    }

    tracing::info!("Faro stopped");

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("Shutdown signal received");
}

async fn health_check() -> &'static str {
    "OK"
}

async fn ready_check() -> &'static str {
    "READY"
}

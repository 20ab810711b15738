//! Shared test fixtures.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;

use crate::config::SearchConfig;
use crate::db::create_test_pool;
use crate::models::{
    CatalogHandle, CatalogSnapshot, DataLayer, DomainInfo, OwnerInfo, TableInfo, UpdateFrequency,
};
use crate::services::llm::ScriptedModel;
use crate::services::quality::{QualityCache, TableQualityMetric};
use crate::services::retriever::{ColumnIndexRecord, MemoryRetriever, Retriever, TableIndexRecord};
use crate::services::{
    DbNotifier, FeedbackStore, IntentCache, IntentNormalizer, InvolvementService,
    MetricsCollector, SearchService, SynonymDictionary, WorkflowService,
};

pub struct PipelineFixture {
    pub service: SearchService,
    pub llm: Arc<ScriptedModel>,
    pub retriever: Arc<MemoryRetriever>,
    pub quality: Arc<QualityCache>,
    pub feedback: Arc<FeedbackStore>,
    pub catalog: CatalogHandle,
    pub pool: SqlitePool,
}

pub async fn pipeline_fixture(snapshot: CatalogSnapshot) -> PipelineFixture {
    let pool = create_test_pool().await.expect("test pool");

    let llm = Arc::new(ScriptedModel::default());
    let retriever = Arc::new(MemoryRetriever::new());
    let quality = Arc::new(QualityCache::new(25.0));
    let feedback = Arc::new(FeedbackStore::new(pool.clone(), 5, 3));
    let metrics = Arc::new(MetricsCollector::new(1000));
    let catalog = CatalogHandle::new(snapshot);

    let intent_cache = Arc::new(IntentCache::new(1000, 7));
    let synonyms = Arc::new(SynonymDictionary::default());
    let normalizer = Arc::new(IntentNormalizer::new(
        llm.clone(),
        intent_cache,
        synonyms,
        Duration::from_secs(5),
    ));

    let service = SearchService::new(
        normalizer,
        catalog.clone(),
        retriever.clone(),
        llm.clone(),
        feedback.clone(),
        quality.clone(),
        metrics,
        SearchConfig::default(),
        Duration::from_secs(5),
    );

    PipelineFixture { service, llm, retriever, quality, feedback, catalog, pool }
}

pub fn domain(id: &str, name: &str, keywords: &[&str]) -> DomainInfo {
    DomainInfo {
        id: id.to_string(),
        name: name.to_string(),
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
        chief: None,
    }
}

pub fn owner(id: i64, name: &str, domain_id: &str, approval_rate: f64) -> OwnerInfo {
    OwnerInfo {
        id,
        name: name.to_string(),
        email: format!("{}@corp.example", name.to_lowercase().replace(' ', ".")),
        domain_id: domain_id.to_string(),
        approval_rate,
        tables_count: 1,
    }
}

#[allow(clippy::too_many_arguments)]
pub fn table(
    id: i64,
    name: &str,
    domain_id: &str,
    domain_name: &str,
    owner_id: i64,
    data_layer: Option<DataLayer>,
    update_frequency: Option<UpdateFrequency>,
    inferred_product: Option<&str>,
    last_updated: Option<DateTime<Utc>>,
    keywords: &[&str],
) -> TableInfo {
    TableInfo {
        id,
        name: name.to_string(),
        display_name: name.to_string(),
        summary: format!("Tabela {}", name),
        domain_id: domain_id.to_string(),
        domain_name: domain_name.to_string(),
        owner_id,
        owner_name: format!("owner-{}", owner_id),
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
        granularity: None,
        main_entities: vec![],
        data_layer,
        is_golden_source: false,
        is_visao_cliente: false,
        update_frequency,
        inferred_product: inferred_product.map(str::to_string),
        last_updated,
    }
}

pub async fn index_table_from(retriever: &MemoryRetriever, info: &TableInfo, description: &str) {
    retriever
        .index_table(TableIndexRecord {
            id: info.id,
            name: info.name.clone(),
            display_name: info.display_name.clone(),
            description: description.to_string(),
            domain: info.domain_name.clone(),
            keywords: info.keywords.clone(),
            owner_id: Some(info.owner_id),
            owner_name: info.owner_name.clone(),
            data_layer: info.data_layer.map(|l| l.as_str().to_string()),
            is_golden_source: info.is_golden_source,
            is_visao_cliente: info.is_visao_cliente,
            update_frequency: info.update_frequency.map(|f| f.as_str().to_string()),
            inferred_product: info.inferred_product.clone(),
            last_updated: info.last_updated,
        })
        .await
        .expect("index table");
}

pub async fn index_column(
    retriever: &MemoryRetriever,
    info: &TableInfo,
    column_name: &str,
    column_display_name: &str,
    description: &str,
) {
    retriever
        .index_column(ColumnIndexRecord {
            table_id: info.id,
            table_name: info.name.clone(),
            table_display_name: info.display_name.clone(),
            column_name: column_name.to_string(),
            column_display_name: column_display_name.to_string(),
            description: description.to_string(),
            domain: info.domain_name.clone(),
            owner_id: Some(info.owner_id),
            owner_name: info.owner_name.clone(),
        })
        .await
        .expect("index column");
}

pub fn seed_quality(quality: &QualityCache, table_name: &str, score: f64) {
    quality.set(TableQualityMetric {
        table_name: table_name.to_string(),
        quality_score: score,
        last_updated: Utc::now(),
    });
}

// ============================================================================
// Workflow fixtures
// ============================================================================

pub struct WorkflowFixture {
    pub pool: SqlitePool,
    pub workflow: Arc<WorkflowService>,
    pub involvements: Arc<InvolvementService>,
    pub feedback: Arc<FeedbackStore>,
    pub requester_id: i64,
    pub owner_id: i64,
    pub case_id: i64,
    pub variable_id: i64,
    pub table_id: i64,
    pub match_id: i64,
}

/// One case with one variable, one active table owned by `owner` and one
/// SUGGESTED match between them.
pub async fn workflow_fixture() -> WorkflowFixture {
    let pool = create_test_pool().await.expect("test pool");
    let notifier = Arc::new(DbNotifier::new(pool.clone()));
    let feedback = Arc::new(FeedbackStore::new(pool.clone(), 5, 3));
    let workflow = Arc::new(WorkflowService::new(
        pool.clone(),
        notifier.clone(),
        feedback.clone(),
    ));
    let involvements = Arc::new(InvolvementService::new(pool.clone(), notifier));

    let requester_id = insert_collaborator(&pool, "Rita Requisitante").await;
    let owner_id = insert_collaborator(&pool, "Otávio Owner").await;

    let case_id: i64 = sqlx::query_scalar(
        "INSERT INTO cases (title, created_by) VALUES ('Case de teste', ?) RETURNING id",
    )
    .bind(requester_id)
    .fetch_one(&pool)
    .await
    .unwrap();

    let variable_id: i64 = sqlx::query_scalar(
        r#"INSERT INTO case_variables (case_id, variable_name, variable_type, search_status)
           VALUES (?, 'vl_vendas_mensal', 'currency', 'MATCHED') RETURNING id"#,
    )
    .bind(case_id)
    .fetch_one(&pool)
    .await
    .unwrap();

    let table_id = insert_table(&pool, "tb_vendas_consig_spec", owner_id).await;

    let match_id: i64 = sqlx::query_scalar(
        r#"INSERT INTO variable_matches (case_variable_id, data_table_id, score, status)
           VALUES (?, ?, 0.82, 'SUGGESTED') RETURNING id"#,
    )
    .bind(variable_id)
    .bind(table_id)
    .fetch_one(&pool)
    .await
    .unwrap();

    WorkflowFixture {
        pool,
        workflow,
        involvements,
        feedback,
        requester_id,
        owner_id,
        case_id,
        variable_id,
        table_id,
        match_id,
    }
}

pub async fn insert_collaborator(pool: &SqlitePool, name: &str) -> i64 {
    sqlx::query_scalar(
        "INSERT INTO collaborators (name, email, active) VALUES (?, ?, TRUE) RETURNING id",
    )
    .bind(name)
    .bind(format!("{}@corp.example", name.to_lowercase().replace(' ', ".")))
    .fetch_one(pool)
    .await
    .unwrap()
}

pub async fn insert_table(pool: &SqlitePool, name: &str, owner_id: i64) -> i64 {
    sqlx::query_scalar(
        r#"INSERT INTO data_tables (name, display_name, domain, owner_id, is_active)
           VALUES (?, ?, 'vendas', ?, TRUE) RETURNING id"#,
    )
    .bind(name)
    .bind(name)
    .bind(owner_id)
    .fetch_one(pool)
    .await
    .unwrap()
}

pub async fn notification_count_for(pool: &SqlitePool, collaborator_id: i64) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE collaborator_id = ?")
        .bind(collaborator_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

pub async fn history_rows_for(pool: &SqlitePool, variable_id: i64) -> Vec<(String, String)> {
    sqlx::query_as("SELECT decision_type, outcome FROM decision_history WHERE variable_id = ? ORDER BY id")
        .bind(variable_id)
        .fetch_all(pool)
        .await
        .unwrap()
}

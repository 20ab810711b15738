//! Catalog ingestion.
//!
//! Receives table/owner/domain metadata from the upstream case-management
//! system, summarizes tables for retrieval (language model, with a truncation
//! fallback), indexes tables and columns in the retriever, persists the
//! workflow projection, and atomically swaps the in-memory snapshot with a
//! bumped generation counter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use utoipa::ToSchema;

use super::intent_service::parse_json_reply;
use super::llm::LanguageModel;
use super::retriever::{ColumnIndexRecord, Retriever, TableIndexRecord};
use crate::models::{
    CatalogHandle, CatalogSnapshot, DataLayer, DomainInfo, OwnerInfo, TableInfo, UpdateFrequency,
};
use crate::utils::{ApiError, ApiResult, truncate_chars};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ColumnPayload {
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct TablePayload {
    pub id: i64,
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    pub domain_id: String,
    pub owner_id: i64,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub granularity: Option<String>,
    #[serde(default)]
    pub main_entities: Vec<String>,
    pub data_layer: Option<String>,
    #[serde(default)]
    pub is_golden_source: bool,
    #[serde(default)]
    pub is_visao_cliente: bool,
    pub update_frequency: Option<String>,
    pub inferred_product: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub columns: Vec<ColumnPayload>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CatalogSyncRequest {
    pub source: String,
    pub domains: Vec<DomainInfo>,
    pub owners: Vec<OwnerInfo>,
    pub tables: Vec<TablePayload>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CatalogSyncResponse {
    pub success: bool,
    pub generation: u64,
    pub domains: usize,
    pub owners: usize,
    pub tables_synced: usize,
    pub tables_failed: usize,
    pub message: String,
}

pub struct CatalogService {
    handle: CatalogHandle,
    retriever: Arc<dyn Retriever>,
    llm: Arc<dyn LanguageModel>,
    pool: SqlitePool,
    generation: AtomicU64,
}

impl CatalogService {
    pub fn new(
        handle: CatalogHandle,
        retriever: Arc<dyn Retriever>,
        llm: Arc<dyn LanguageModel>,
        pool: SqlitePool,
    ) -> Self {
        Self { handle, retriever, llm, pool, generation: AtomicU64::new(0) }
    }

    pub fn handle(&self) -> CatalogHandle {
        self.handle.clone()
    }

    pub async fn sync(&self, request: CatalogSyncRequest) -> ApiResult<CatalogSyncResponse> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let domains: HashMap<String, DomainInfo> = request
            .domains
            .iter()
            .map(|d| (d.id.clone(), d.clone()))
            .collect();
        let owners: HashMap<i64, OwnerInfo> =
            request.owners.iter().map(|o| (o.id, o.clone())).collect();

        let mut tables: HashMap<i64, TableInfo> = HashMap::new();
        let mut synced = 0usize;
        let mut failed = 0usize;

        for payload in &request.tables {
            match self.process_table(payload, &domains, &owners).await {
                Ok(info) => {
                    tables.insert(info.id, info);
                    synced += 1;
                },
                Err(e) => {
                    tracing::warn!("Failed to index table {}: {}", payload.name, e);
                    failed += 1;
                },
            }
        }

        let snapshot = CatalogSnapshot { generation, domains, owners, tables };
        snapshot
            .check_integrity()
            .map_err(ApiError::Integrity)?;

        self.persist_projection(&request, &snapshot).await?;
        self.handle.replace(snapshot);

        let message = format!(
            "Synced {} tables from {}{}",
            synced,
            request.source,
            if failed > 0 { format!(", {} failed", failed) } else { String::new() }
        );
        tracing::info!("{} (generation {})", message, generation);

        Ok(CatalogSyncResponse {
            success: failed == 0,
            generation,
            domains: request.domains.len(),
            owners: request.owners.len(),
            tables_synced: synced,
            tables_failed: failed,
            message,
        })
    }

    async fn process_table(
        &self,
        payload: &TablePayload,
        domains: &HashMap<String, DomainInfo>,
        owners: &HashMap<i64, OwnerInfo>,
    ) -> Result<TableInfo, String> {
        let domain_name = domains
            .get(&payload.domain_id)
            .map(|d| d.name.clone())
            .unwrap_or_else(|| payload.domain_id.clone());
        let owner_name = owners
            .get(&payload.owner_id)
            .map(|o| o.name.clone())
            .unwrap_or_default();

        let enriched = self.summarize(payload).await;

        let info = TableInfo {
            id: payload.id,
            name: payload.name.clone(),
            display_name: payload.display_name.clone(),
            summary: enriched.summary,
            domain_id: payload.domain_id.clone(),
            domain_name: domain_name.clone(),
            owner_id: payload.owner_id,
            owner_name: owner_name.clone(),
            keywords: enriched.keywords,
            granularity: enriched.granularity,
            main_entities: enriched.main_entities,
            data_layer: payload.data_layer.as_deref().and_then(DataLayer::parse),
            is_golden_source: payload.is_golden_source,
            is_visao_cliente: payload.is_visao_cliente,
            update_frequency: payload
                .update_frequency
                .as_deref()
                .and_then(UpdateFrequency::parse),
            inferred_product: payload.inferred_product.clone(),
            last_updated: payload.last_updated,
        };

        self.retriever
            .index_table(TableIndexRecord {
                id: info.id,
                name: info.name.clone(),
                display_name: info.display_name.clone(),
                description: info.summary.clone(),
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
            .map_err(|e| e.to_string())?;

        for column in &payload.columns {
            self.retriever
                .index_column(ColumnIndexRecord {
                    table_id: info.id,
                    table_name: info.name.clone(),
                    table_display_name: info.display_name.clone(),
                    column_name: column.name.clone(),
                    column_display_name: column.display_name.clone(),
                    description: column.description.clone(),
                    domain: info.domain_name.clone(),
                    owner_id: Some(info.owner_id),
                    owner_name: info.owner_name.clone(),
                })
                .await
                .map_err(|e| e.to_string())?;
        }

        Ok(info)
    }

    /// Condense the table metadata for retrieval. The language model produces
    /// summary/keywords/entities/granularity; on failure the original
    /// description is truncated and the payload's own fields are kept.
    async fn summarize(&self, payload: &TablePayload) -> EnrichedMetadata {
        let fallback = EnrichedMetadata {
            summary: if payload.description.is_empty() {
                payload.display_name.clone()
            } else {
                format!(
                    "{}: {}",
                    payload.display_name,
                    truncate_chars(&payload.description, 150)
                )
            },
            keywords: payload.keywords.clone(),
            main_entities: payload.main_entities.clone(),
            granularity: payload.granularity.clone(),
        };

        if !self.llm.is_available() {
            return fallback;
        }

        let columns_summary: String = payload
            .columns
            .iter()
            .take(30)
            .map(|c| format!("- {} ({})", c.name, c.display_name))
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            r#"Você é um especialista em catalogar dados corporativos.
Crie um RESUMO CONCISO (máximo 50 palavras) desta tabela para facilitar buscas e extraia:
- keywords: 5-10 palavras-chave para busca
- main_entities: entidades principais (cliente, produto, loja)
- granularity: periodicidade dos dados

Retorne JSON com: summary, keywords, main_entities, granularity

Nome da tabela: {}
Display name: {}
Descrição original: {}

Colunas (resumo):
{}

Retorne o JSON:"#,
            payload.name,
            payload.display_name,
            if payload.description.is_empty() {
                "Não informada"
            } else {
                truncate_chars(&payload.description, 1000)
            },
            columns_summary,
        );

        match self.llm.complete(&prompt, Duration::from_secs(20)).await {
            Ok(reply) => match parse_json_reply(&reply) {
                Ok(parsed) => EnrichedMetadata {
                    summary: parsed
                        .get("summary")
                        .and_then(Value::as_str)
                        .map(|s| truncate_chars(s, 200).to_string())
                        .unwrap_or(fallback.summary),
                    keywords: string_list(&parsed, "keywords", 10)
                        .unwrap_or(fallback.keywords),
                    main_entities: string_list(&parsed, "main_entities", 10)
                        .unwrap_or(fallback.main_entities),
                    granularity: parsed
                        .get("granularity")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .or(fallback.granularity),
                },
                Err(e) => {
                    tracing::warn!("Summarization reply unparseable for {}: {}", payload.name, e);
                    fallback
                },
            },
            Err(e) => {
                tracing::warn!("Summarization failed for {}: {}", payload.name, e);
                fallback
            },
        }
    }

    /// Keep the SQLite projection in step so workflow rows can reference
    /// tables and owners by id.
    async fn persist_projection(
        &self,
        request: &CatalogSyncRequest,
        snapshot: &CatalogSnapshot,
    ) -> ApiResult<()> {
        let mut tx = self.pool.begin().await?;

        for owner in &request.owners {
            sqlx::query(
                r#"INSERT INTO collaborators (id, name, email, active)
                   VALUES (?, ?, ?, TRUE)
                   ON CONFLICT(id) DO UPDATE SET name = excluded.name, email = excluded.email"#,
            )
            .bind(owner.id)
            .bind(&owner.name)
            .bind(&owner.email)
            .execute(&mut *tx)
            .await?;
        }

        for table in snapshot.tables.values() {
            sqlx::query(
                r#"INSERT INTO data_tables
                   (id, name, display_name, description, domain, owner_id, keywords, data_layer,
                    is_golden_source, is_visao_cliente, update_frequency, inferred_product,
                    is_active, created_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, TRUE, ?)
                   ON CONFLICT(id) DO UPDATE SET
                     name = excluded.name,
                     display_name = excluded.display_name,
                     description = excluded.description,
                     domain = excluded.domain,
                     owner_id = excluded.owner_id,
                     keywords = excluded.keywords,
                     data_layer = excluded.data_layer,
                     is_golden_source = excluded.is_golden_source,
                     is_visao_cliente = excluded.is_visao_cliente,
                     update_frequency = excluded.update_frequency,
                     inferred_product = excluded.inferred_product,
                     is_active = TRUE"#,
            )
            .bind(table.id)
            .bind(&table.name)
            .bind(&table.display_name)
            .bind(&table.summary)
            .bind(&table.domain_name)
            .bind(table.owner_id)
            .bind(serde_json::to_string(&table.keywords)?)
            .bind(table.data_layer.map(|l| l.as_str()))
            .bind(table.is_golden_source)
            .bind(table.is_visao_cliente)
            .bind(table.update_frequency.map(|f| f.as_str()))
            .bind(&table.inferred_product)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

struct EnrichedMetadata {
    summary: String,
    keywords: Vec<String>,
    main_entities: Vec<String>,
    granularity: Option<String>,
}

fn string_list(value: &Value, field: &str, limit: usize) -> Option<Vec<String>> {
    value.get(field).and_then(Value::as_array).map(|items| {
        items
            .iter()
            .filter_map(Value::as_str)
            .take(limit)
            .map(str::to_string)
            .collect()
    })
}

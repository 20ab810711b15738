//! Vector retrieval capability.
//!
//! The pipeline talks to a `Retriever` trait object: production uses the HTTP
//! client against the vector-search service, development and tests use the
//! deterministic in-memory index. The core never cares which is in use.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::utils::text::normalize_for_cache;

#[derive(Debug, Error)]
pub enum RetrieverError {
    #[error("retriever request failed: {0}")]
    Request(String),

    #[error("retriever response invalid: {0}")]
    InvalidResponse(String),
}

/// A table hit from the vector index. `distance` is the vector distance in
/// [0, 1]; semantic score is `1 − distance`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedTable {
    pub id: i64,
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub owner_id: Option<i64>,
    #[serde(default)]
    pub owner_name: String,
    pub data_layer: Option<String>,
    #[serde(default)]
    pub is_golden_source: bool,
    #[serde(default)]
    pub is_visao_cliente: bool,
    pub update_frequency: Option<String>,
    pub inferred_product: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(rename = "_distance", alias = "distance", default = "default_distance")]
    pub distance: f64,
}

fn default_distance() -> f64 {
    0.5
}

/// A column hit from the column-level index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedColumn {
    pub table_id: i64,
    pub table_name: String,
    pub table_display_name: String,
    pub column_name: String,
    pub column_display_name: String,
    #[serde(default)]
    pub domain: String,
    pub owner_id: Option<i64>,
    #[serde(default)]
    pub owner_name: String,
    pub similarity_score: f64,
}

/// Record upserted into the table index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableIndexRecord {
    pub id: i64,
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub owner_id: Option<i64>,
    #[serde(default)]
    pub owner_name: String,
    pub data_layer: Option<String>,
    #[serde(default)]
    pub is_golden_source: bool,
    #[serde(default)]
    pub is_visao_cliente: bool,
    pub update_frequency: Option<String>,
    pub inferred_product: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Record upserted into the column index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnIndexRecord {
    pub table_id: i64,
    pub table_name: String,
    pub table_display_name: String,
    pub column_name: String,
    pub column_display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub domain: String,
    pub owner_id: Option<i64>,
    #[serde(default)]
    pub owner_name: String,
}

#[async_trait]
pub trait Retriever: Send + Sync {
    async fn search(
        &self,
        query: &str,
        domain_filter: Option<&str>,
        max_results: usize,
    ) -> Result<Vec<RetrievedTable>, RetrieverError>;

    async fn search_columns(
        &self,
        query: &str,
        domain_filter: Option<&str>,
        max_results: usize,
    ) -> Result<Vec<RetrievedColumn>, RetrieverError>;

    async fn index_table(&self, record: TableIndexRecord) -> Result<(), RetrieverError>;

    async fn index_column(&self, record: ColumnIndexRecord) -> Result<(), RetrieverError>;
}

// ============================================================================
// HTTP client against the vector search service
// ============================================================================

pub struct HttpRetriever {
    base_url: String,
    client: Client,
    timeout: Duration,
}

impl HttpRetriever {
    pub fn new(base_url: impl Into<String>, timeout_seconds: u64) -> Self {
        Self {
            base_url: base_url.into(),
            client: Client::new(),
            timeout: Duration::from_secs(timeout_seconds),
        }
    }
}

#[derive(Serialize)]
struct SearchBody<'a> {
    query: &'a str,
    domain: Option<&'a str>,
    max_results: usize,
}

#[async_trait]
impl Retriever for HttpRetriever {
    async fn search(
        &self,
        query: &str,
        domain_filter: Option<&str>,
        max_results: usize,
    ) -> Result<Vec<RetrievedTable>, RetrieverError> {
        let url = format!("{}/search/tables", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&SearchBody { query, domain: domain_filter, max_results })
            .send()
            .await
            .map_err(|e| RetrieverError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RetrieverError::Request(format!("status {}", response.status())));
        }

        response
            .json()
            .await
            .map_err(|e| RetrieverError::InvalidResponse(e.to_string()))
    }

    async fn search_columns(
        &self,
        query: &str,
        domain_filter: Option<&str>,
        max_results: usize,
    ) -> Result<Vec<RetrievedColumn>, RetrieverError> {
        let url = format!("{}/search/columns", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&SearchBody { query, domain: domain_filter, max_results })
            .send()
            .await
            .map_err(|e| RetrieverError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RetrieverError::Request(format!("status {}", response.status())));
        }

        response
            .json()
            .await
            .map_err(|e| RetrieverError::InvalidResponse(e.to_string()))
    }

    async fn index_table(&self, record: TableIndexRecord) -> Result<(), RetrieverError> {
        let url = format!("{}/index/tables", self.base_url.trim_end_matches('/'));
        self.client
            .put(&url)
            .timeout(self.timeout)
            .json(&record)
            .send()
            .await
            .map_err(|e| RetrieverError::Request(e.to_string()))?
            .error_for_status()
            .map_err(|e| RetrieverError::Request(e.to_string()))?;
        Ok(())
    }

    async fn index_column(&self, record: ColumnIndexRecord) -> Result<(), RetrieverError> {
        let url = format!("{}/index/columns", self.base_url.trim_end_matches('/'));
        self.client
            .put(&url)
            .timeout(self.timeout)
            .json(&record)
            .send()
            .await
            .map_err(|e| RetrieverError::Request(e.to_string()))?
            .error_for_status()
            .map_err(|e| RetrieverError::Request(e.to_string()))?;
        Ok(())
    }
}

// ============================================================================
// In-memory index (development/tests)
// ============================================================================

/// Token-overlap index with deterministic scores. Distance is
/// `1 − |query ∩ doc| / |query|`, clamped to [0, 1]; ties break by id.
#[derive(Default)]
pub struct MemoryRetriever {
    tables: DashMap<i64, TableIndexRecord>,
    columns: DashMap<(i64, String), ColumnIndexRecord>,
}

impl MemoryRetriever {
    pub fn new() -> Self {
        Self::default()
    }

    fn overlap_score(query: &str, doc: &str) -> f64 {
        let query_norm = normalize_for_cache(query);
        let doc_norm = normalize_for_cache(doc);
        let query_tokens: Vec<&str> = query_norm.split_whitespace().collect();
        if query_tokens.is_empty() {
            return 0.0;
        }
        let matched = query_tokens
            .iter()
            .filter(|t| doc_norm.split_whitespace().any(|d| d == **t || d.contains(*t)))
            .count();
        matched as f64 / query_tokens.len() as f64
    }

    fn table_document(record: &TableIndexRecord) -> String {
        let mut doc = format!(
            "{} {} {} {}",
            record.name,
            record.display_name,
            record.description,
            record.keywords.join(" ")
        );
        if let Some(product) = &record.inferred_product {
            doc.push(' ');
            doc.push_str(product);
        }
        doc
    }
}

#[async_trait]
impl Retriever for MemoryRetriever {
    async fn search(
        &self,
        query: &str,
        domain_filter: Option<&str>,
        max_results: usize,
    ) -> Result<Vec<RetrievedTable>, RetrieverError> {
        let mut hits: Vec<RetrievedTable> = self
            .tables
            .iter()
            .filter(|entry| {
                domain_filter.is_none_or(|d| entry.value().domain.eq_ignore_ascii_case(d))
            })
            .filter_map(|entry| {
                let record = entry.value();
                let score = Self::overlap_score(query, &Self::table_document(record));
                if score <= 0.0 {
                    return None;
                }
                Some(RetrievedTable {
                    id: record.id,
                    name: record.name.clone(),
                    display_name: record.display_name.clone(),
                    description: record.description.clone(),
                    domain: record.domain.clone(),
                    keywords: record.keywords.clone(),
                    owner_id: record.owner_id,
                    owner_name: record.owner_name.clone(),
                    data_layer: record.data_layer.clone(),
                    is_golden_source: record.is_golden_source,
                    is_visao_cliente: record.is_visao_cliente,
                    update_frequency: record.update_frequency.clone(),
                    inferred_product: record.inferred_product.clone(),
                    last_updated: record.last_updated,
                    distance: (1.0 - score).clamp(0.0, 1.0),
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.id.cmp(&b.id))
        });
        hits.truncate(max_results);
        Ok(hits)
    }

    async fn search_columns(
        &self,
        query: &str,
        domain_filter: Option<&str>,
        max_results: usize,
    ) -> Result<Vec<RetrievedColumn>, RetrieverError> {
        let mut hits: Vec<RetrievedColumn> = self
            .columns
            .iter()
            .filter(|entry| {
                domain_filter.is_none_or(|d| entry.value().domain.eq_ignore_ascii_case(d))
            })
            .filter_map(|entry| {
                let record = entry.value();
                let doc = format!(
                    "{} {} {}",
                    record.column_name, record.column_display_name, record.description
                );
                let score = Self::overlap_score(query, &doc);
                if score <= 0.0 {
                    return None;
                }
                Some(RetrievedColumn {
                    table_id: record.table_id,
                    table_name: record.table_name.clone(),
                    table_display_name: record.table_display_name.clone(),
                    column_name: record.column_name.clone(),
                    column_display_name: record.column_display_name.clone(),
                    domain: record.domain.clone(),
                    owner_id: record.owner_id,
                    owner_name: record.owner_name.clone(),
                    similarity_score: score,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.similarity_score
                .partial_cmp(&a.similarity_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.table_id.cmp(&b.table_id))
        });
        hits.truncate(max_results);
        Ok(hits)
    }

    async fn index_table(&self, record: TableIndexRecord) -> Result<(), RetrieverError> {
        self.tables.insert(record.id, record);
        Ok(())
    }

    async fn index_column(&self, record: ColumnIndexRecord) -> Result<(), RetrieverError> {
        self.columns
            .insert((record.table_id, record.column_name.clone()), record);
        Ok(())
    }
}

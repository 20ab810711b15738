//! Quality source clients.
//!
//! The production source is the DataMesh quality mart queried over HTTP; the
//! mock serves a fixed set so development and tests run without the mart.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QualitySourceError {
    #[error("quality source request failed: {0}")]
    Request(String),

    #[error("quality source response invalid: {0}")]
    InvalidResponse(String),
}

/// Quality metric for a single table, as served by the source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableQualityMetric {
    pub table_name: String,
    /// 0–100
    pub quality_score: f64,
    pub last_updated: DateTime<Utc>,
}

#[async_trait]
pub trait QualitySource: Send + Sync {
    async fn get_all(&self) -> Result<Vec<TableQualityMetric>, QualitySourceError>;

    async fn get_updated_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<TableQualityMetric>, QualitySourceError>;
}

// ============================================================================
// HTTP client
// ============================================================================

pub struct HttpQualitySource {
    base_url: String,
    client: Client,
}

impl HttpQualitySource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
        }
    }

    async fn fetch(&self, path: &str) -> Result<Vec<TableQualityMetric>, QualitySourceError> {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| QualitySourceError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(QualitySourceError::Request(format!("status {}", response.status())));
        }

        response
            .json()
            .await
            .map_err(|e| QualitySourceError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl QualitySource for HttpQualitySource {
    async fn get_all(&self) -> Result<Vec<TableQualityMetric>, QualitySourceError> {
        self.fetch("/quality/metrics").await
    }

    async fn get_updated_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<TableQualityMetric>, QualitySourceError> {
        self.fetch(&format!("/quality/metrics?updated_since={}", since.to_rfc3339()))
            .await
    }
}

// ============================================================================
// Mock source (development/tests)
// ============================================================================

pub struct MockQualitySource {
    metrics: Vec<TableQualityMetric>,
}

impl Default for MockQualitySource {
    fn default() -> Self {
        let now = Utc::now();
        let seed = [
            ("tb_vendas_sot", 94.5),
            ("tb_vendas_sor", 78.2),
            ("tb_vendas_consig_spec", 91.0),
            ("tb_vendas_imob_spec", 88.5),
            ("tb_clientes_golden", 97.8),
            ("tb_clientes_sor", 72.3),
            ("tb_visao_cliente_varejo", 95.2),
            ("tb_visao_cliente_corporate", 93.1),
            ("tb_produtos_sot", 89.4),
            ("tb_contratos_sot", 91.7),
        ];
        Self {
            metrics: seed
                .into_iter()
                .map(|(name, score)| TableQualityMetric {
                    table_name: name.to_string(),
                    quality_score: score,
                    last_updated: now,
                })
                .collect(),
        }
    }
}

impl MockQualitySource {
    pub fn with_metrics(metrics: Vec<TableQualityMetric>) -> Self {
        Self { metrics }
    }
}

#[async_trait]
impl QualitySource for MockQualitySource {
    async fn get_all(&self) -> Result<Vec<TableQualityMetric>, QualitySourceError> {
        Ok(self.metrics.clone())
    }

    async fn get_updated_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<TableQualityMetric>, QualitySourceError> {
        Ok(self
            .metrics
            .iter()
            .filter(|m| m.last_updated > since)
            .cloned()
            .collect())
    }
}

//! Scored candidates produced by the retrieval pipeline. Per-request only,
//! never persisted.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::catalog::{DomainInfo, OwnerInfo, TableInfo};

/// Whether the requested data exists in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataExistence {
    Exists,
    NeedsCreation,
    Uncertain,
}

impl DataExistence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exists => "EXISTS",
            Self::NeedsCreation => "NEEDS_CREATION",
            Self::Uncertain => "UNCERTAIN",
        }
    }
}

/// Next step recommended to the requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecommendedAction {
    UseTable,
    ConfirmWithOwner,
    CreateInvolvement,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DomainMatch {
    pub domain: DomainInfo,
    pub score: f64,
    pub reasoning: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OwnerMatch {
    pub owner: OwnerInfo,
    pub score: f64,
    pub reasoning: String,
}

/// A scored table candidate with the full component breakdown.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TableMatch {
    pub table: TableInfo,
    /// Combined score in [0, 1].
    pub score: f64,
    pub semantic_score: f64,
    pub historical_score: f64,
    pub certification_score: f64,
    pub freshness_score: f64,
    pub quality_score: f64,
    pub context_score: f64,
    pub reasoning: String,
    /// Column names that matched, when the column branch contributed.
    #[serde(default)]
    pub matched_entities: Vec<String>,
    #[serde(default)]
    pub is_double_certified: bool,
    #[serde(default)]
    pub has_product_match: bool,
}

//! Typed state threaded through the retrieval pipeline.
//!
//! Each node reads the fields produced by its predecessors and writes its own
//! slice; no node observes partial output of a later node.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

use crate::models::{AmbiguityResult, DataExistence, DomainMatch, Intent, OwnerMatch, TableMatch};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    #[default]
    Auto,
    TableOnly,
    ColumnOnly,
    Hybrid,
}

/// Input to one pipeline run.
#[derive(Debug, Clone)]
pub struct SearchInput {
    pub request_id: String,
    pub raw_query: String,
    pub variable_name: Option<String>,
    pub variable_type: Option<String>,
    pub context: BTreeMap<String, String>,
    pub use_case: String,
    pub search_mode: SearchMode,
    pub enable_rerank: bool,
}

impl SearchInput {
    pub fn user_product<'a>(&'a self, intent: Option<&'a Intent>) -> Option<&'a str> {
        self.context
            .get("produto")
            .map(String::as_str)
            .or_else(|| intent.and_then(|i| i.target_product.as_deref()))
    }
}

/// Shared, typed pipeline state.
#[derive(Debug, Default)]
pub struct SearchState {
    pub intent: Option<Intent>,
    pub intent_cache_hit: bool,
    pub matched_domains: Vec<DomainMatch>,
    pub matched_owners: Vec<OwnerMatch>,
    pub matched_tables: Vec<TableMatch>,
    pub column_results: Vec<TableMatch>,
    pub data_existence: Option<DataExistence>,
    pub llm_reranked: bool,
    pub ambiguity: Option<AmbiguityResult>,
}

impl SearchState {
    pub fn user_domain(&self) -> Option<&str> {
        self.matched_domains
            .first()
            .map(|d| d.domain.name.as_str())
    }
}

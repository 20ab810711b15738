//! Canonical intent extracted from a user request.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Normalized form of a data request, produced by the intent normalizer.
///
/// Immutable once built; interned in the intent cache keyed by the
/// normalization hash of the originating query.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Intent {
    /// What is being requested (vendas, clientes, transações, ...)
    pub data_need: String,
    /// Kind of value (currency, count, text, date, ...)
    pub data_type: Option<String>,
    /// Main entity (cliente, produto, loja, ...)
    pub target_entity: Option<String>,
    /// Business segment (varejo, corporate, PF, PJ, ...)
    pub target_segment: Option<String>,
    /// Specific product (consignado, imobiliário, cartão, ...)
    pub target_product: Option<String>,
    /// Specific audience mentioned in the request
    pub target_audience: Option<String>,
    /// Periodicity (diária, mensal, anual, transação)
    pub granularity: Option<String>,
    /// Temporal reference (últimos 12 meses, YTD, ...)
    pub time_reference: Option<String>,
    /// Likely data domains (vendas, clientes, crédito, risco, ...)
    #[serde(default)]
    pub inferred_domains: Vec<String>,
    pub original_query: String,
    /// Confidence of the extraction, in [0, 1]. Fallback paths stay below 0.5.
    pub extraction_confidence: f64,
}

impl Intent {
    /// Deterministic fallback used when the language model is unavailable.
    pub fn fallback(data_need: impl Into<String>, original_query: impl Into<String>) -> Self {
        Self {
            data_need: data_need.into(),
            data_type: None,
            target_entity: None,
            target_segment: None,
            target_product: None,
            target_audience: None,
            granularity: None,
            time_reference: None,
            inferred_domains: Vec::new(),
            original_query: original_query.into(),
            extraction_confidence: 0.3,
        }
    }

    /// Clone with the original query rewritten (used on cache hits).
    pub fn with_original_query(&self, original_query: impl Into<String>) -> Self {
        let mut intent = self.clone();
        intent.original_query = original_query.into();
        intent
    }
}

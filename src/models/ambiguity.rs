//! Ambiguity detection results and clarifying options.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AmbiguityType {
    /// Clear winner
    None,
    /// Top results too close
    ScoreTie,
    /// Top results in different domains
    DomainConflict,
    /// Same name in different contexts
    Homonymy,
    /// Same data split across tables (versions/periods)
    Fragmentation,
    /// All scores below the minimum confidence
    LowConfidence,
    /// Query matches several product-specific tables
    MultipleProducts,
}

impl AmbiguityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::ScoreTie => "SCORE_TIE",
            Self::DomainConflict => "DOMAIN_CONFLICT",
            Self::Homonymy => "HOMONYMY",
            Self::Fragmentation => "FRAGMENTATION",
            Self::LowConfidence => "LOW_CONFIDENCE",
            Self::MultipleProducts => "MULTIPLE_PRODUCTS",
        }
    }
}

/// An option presented to the user for clarification.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ClarifyingOption {
    pub id: String,
    pub label: String,
    pub description: String,
    pub table_id: Option<i64>,
    pub domain: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AmbiguityResult {
    #[serde(rename = "type")]
    pub kind: AmbiguityType,
    pub is_ambiguous: bool,
    pub confidence: f64,
    pub clarifying_question: Option<String>,
    #[serde(default)]
    pub options: Vec<ClarifyingOption>,
    pub provisional_table_id: Option<i64>,
    #[serde(default)]
    pub provisional_reasoning: String,
}

impl AmbiguityResult {
    /// A clear-winner result carrying the provisional recommendation.
    pub fn clear(confidence: f64, table_id: Option<i64>, reasoning: impl Into<String>) -> Self {
        Self {
            kind: AmbiguityType::None,
            is_ambiguous: false,
            confidence,
            clarifying_question: None,
            options: Vec::new(),
            provisional_table_id: table_id,
            provisional_reasoning: reasoning.into(),
        }
    }
}

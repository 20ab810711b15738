//! Decision builder: shapes the final outcome from the pipeline state.
//!
//! Always yields the best domain and owner; the table only clears the
//! minimum-confidence bar. The recommended action follows the existence
//! verdict and the use-table threshold.

use super::state::{SearchInput, SearchState};
use crate::models::{
    AmbiguityResult, DataExistence, DomainMatch, Intent, OwnerMatch, RecommendedAction,
    TableMatch,
};

/// Final result of one retrieval run.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub request_id: String,
    pub intent: Option<Intent>,
    pub intent_cache_hit: bool,

    pub matched_domains: Vec<DomainMatch>,
    pub matched_owners: Vec<OwnerMatch>,
    pub matched_tables: Vec<TableMatch>,

    pub best_table: Option<TableMatch>,
    pub domain_confidence: f64,
    pub owner_confidence: f64,
    pub table_confidence: Option<f64>,
    pub overall_confidence: f64,

    pub data_existence: DataExistence,
    pub action: RecommendedAction,
    pub reasoning: String,
    pub summary: String,
    pub clarifying_question: Option<String>,

    pub ambiguity: AmbiguityResult,
    pub llm_reranked: bool,

    /// Filled by the service once the run completes.
    pub processing_time_ms: u64,
}

pub struct DecisionThresholds {
    pub use_table_threshold: f64,
    pub minimum_confidence: f64,
}

pub fn decide(
    input: &SearchInput,
    state: SearchState,
    thresholds: &DecisionThresholds,
) -> SearchOutcome {
    let domain_confidence = state.matched_domains.first().map(|d| d.score).unwrap_or(0.0);
    let owner_confidence = state.matched_owners.first().map(|o| o.score).unwrap_or(0.0);
    let table_confidence = state.matched_tables.first().map(|t| t.score);

    let overall_confidence = domain_confidence * 0.3
        + owner_confidence * 0.3
        + table_confidence.unwrap_or(0.0) * 0.4;

    let data_existence = state.data_existence.unwrap_or(DataExistence::Uncertain);

    let action = match data_existence {
        DataExistence::Exists
            if table_confidence.is_some_and(|c| c >= thresholds.use_table_threshold) =>
        {
            RecommendedAction::UseTable
        },
        DataExistence::NeedsCreation => RecommendedAction::CreateInvolvement,
        _ => RecommendedAction::ConfirmWithOwner,
    };

    // The table only surfaces above the minimum confidence.
    let best_table = state
        .matched_tables
        .first()
        .filter(|t| t.score >= thresholds.minimum_confidence)
        .cloned();

    let reasoning = build_final_reasoning(&state, best_table.as_ref(), data_existence, action);
    let summary = build_summary(&state, best_table.as_ref());

    let clarifying_question = if overall_confidence < 0.50 {
        Some(generate_clarifying_question(state.intent.as_ref()))
    } else {
        state
            .ambiguity
            .as_ref()
            .filter(|a| a.is_ambiguous)
            .and_then(|a| a.clarifying_question.clone())
    };

    let ambiguity = state.ambiguity.clone().unwrap_or_else(|| {
        AmbiguityResult::clear(
            table_confidence.unwrap_or(0.0),
            state.matched_tables.first().map(|t| t.table.id),
            "",
        )
    });

    SearchOutcome {
        request_id: input.request_id.clone(),
        intent: state.intent.clone(),
        intent_cache_hit: state.intent_cache_hit,
        best_table,
        domain_confidence,
        owner_confidence,
        table_confidence,
        overall_confidence,
        data_existence,
        action,
        reasoning,
        summary,
        clarifying_question,
        ambiguity,
        llm_reranked: state.llm_reranked,
        matched_domains: state.matched_domains,
        matched_owners: state.matched_owners,
        matched_tables: state.matched_tables,
        processing_time_ms: 0,
    }
}

fn build_final_reasoning(
    state: &SearchState,
    best_table: Option<&TableMatch>,
    existence: DataExistence,
    action: RecommendedAction,
) -> String {
    let mut parts: Vec<String> = Vec::new();

    if let Some(domain) = state.matched_domains.first() {
        parts.push(format!("Domínio: {}", domain.domain.name));
    }
    if let Some(owner) = state.matched_owners.first() {
        parts.push(format!("Responsável: {}", owner.owner.name));
    }
    if let Some(table) = best_table {
        parts.push(format!("Tabela sugerida: {}", table.table.display_name));
    }

    match existence {
        DataExistence::NeedsCreation => {
            parts.push("Dados não encontrados - solicitar criação".to_string());
        },
        DataExistence::Uncertain => {
            parts.push("Validação com responsável recomendada".to_string());
        },
        DataExistence::Exists => {},
    }

    match action {
        RecommendedAction::UseTable => {
            parts.push("✅ Alta confiança - usar tabela sugerida".to_string());
        },
        RecommendedAction::ConfirmWithOwner => {
            parts.push("⚠️ Confirmar com responsável antes de usar".to_string());
        },
        RecommendedAction::CreateInvolvement => {
            parts.push("📝 Abrir solicitação de criação de dados".to_string());
        },
    }

    parts.join(" | ")
}

fn build_summary(state: &SearchState, best_table: Option<&TableMatch>) -> String {
    if let Some(table) = best_table {
        let owner = state
            .matched_owners
            .first()
            .map(|o| o.owner.name.as_str())
            .unwrap_or("N/A");
        return format!("Melhor opção: {} ({})", table.table.display_name, owner);
    }
    if let Some(owner) = state.matched_owners.first() {
        let domain = state
            .matched_domains
            .first()
            .map(|d| d.domain.name.as_str())
            .unwrap_or("N/A");
        return format!("Responsável sugerido: {} ({})", owner.owner.name, domain);
    }
    "Nenhum resultado encontrado com confiança adequada.".to_string()
}

/// First missing intent facet drives the question.
fn generate_clarifying_question(intent: Option<&Intent>) -> String {
    let Some(intent) = intent else {
        return "Você pode descrever melhor qual tipo de dado está buscando?".to_string();
    };

    if intent.target_entity.is_none() {
        return "Qual entidade principal você precisa? (cliente, produto, transação, etc.)"
            .to_string();
    }
    if intent.target_segment.is_none() {
        return "Para qual segmento? (varejo, corporate, PF, PJ, etc.)".to_string();
    }
    if intent.granularity.is_none() {
        return "Qual a granularidade desejada? (diária, mensal, por transação, etc.)".to_string();
    }
    "Pode detalhar mais o contexto de uso desses dados?".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DomainInfo, OwnerInfo, TableInfo};
    use std::collections::BTreeMap;

    fn input() -> SearchInput {
        SearchInput {
            request_id: "req-1".into(),
            raw_query: "vendas".into(),
            variable_name: None,
            variable_type: None,
            context: BTreeMap::new(),
            use_case: "default".into(),
            search_mode: Default::default(),
            enable_rerank: true,
        }
    }

    fn thresholds() -> DecisionThresholds {
        DecisionThresholds { use_table_threshold: 0.70, minimum_confidence: 0.40 }
    }

    fn state_with_table(score: f64, existence: DataExistence) -> SearchState {
        SearchState {
            matched_domains: vec![DomainMatch {
                domain: DomainInfo {
                    id: "vendas".into(),
                    name: "Vendas".into(),
                    keywords: vec![],
                    chief: None,
                },
                score: 0.9,
                reasoning: String::new(),
            }],
            matched_owners: vec![OwnerMatch {
                owner: OwnerInfo {
                    id: 1,
                    name: "Ana".into(),
                    email: "ana@corp.example".into(),
                    domain_id: "vendas".into(),
                    approval_rate: 0.8,
                    tables_count: 2,
                },
                score: 0.8,
                reasoning: String::new(),
            }],
            matched_tables: vec![TableMatch {
                table: TableInfo {
                    id: 1,
                    name: "tb_vendas".into(),
                    display_name: "Vendas".into(),
                    summary: String::new(),
                    domain_id: "vendas".into(),
                    domain_name: "Vendas".into(),
                    owner_id: 1,
                    owner_name: "Ana".into(),
                    keywords: vec![],
                    granularity: None,
                    main_entities: vec![],
                    data_layer: None,
                    is_golden_source: false,
                    is_visao_cliente: false,
                    update_frequency: None,
                    inferred_product: None,
                    last_updated: None,
                },
                score,
                semantic_score: score,
                historical_score: 0.5,
                certification_score: 0.5,
                freshness_score: 0.5,
                quality_score: 0.5,
                context_score: 0.3,
                reasoning: String::new(),
                matched_entities: vec![],
                is_double_certified: false,
                has_product_match: false,
            }],
            data_existence: Some(existence),
            ..Default::default()
        }
    }

    #[test]
    fn high_confidence_existing_table_means_use_table() {
        let outcome = decide(&input(), state_with_table(0.85, DataExistence::Exists), &thresholds());
        assert_eq!(outcome.action, RecommendedAction::UseTable);
        assert!(outcome.best_table.is_some());
        assert!(outcome.reasoning.contains("Alta confiança"));
    }

    #[test]
    fn existing_but_mid_confidence_confirms_with_owner() {
        let outcome = decide(&input(), state_with_table(0.65, DataExistence::Exists), &thresholds());
        assert_eq!(outcome.action, RecommendedAction::ConfirmWithOwner);
    }

    #[test]
    fn needs_creation_opens_involvement() {
        let outcome =
            decide(&input(), state_with_table(0.2, DataExistence::NeedsCreation), &thresholds());
        assert_eq!(outcome.action, RecommendedAction::CreateInvolvement);
        // Below the minimum confidence, no table is surfaced.
        assert!(outcome.best_table.is_none());
    }

    #[test]
    fn low_overall_confidence_asks_a_clarifying_question() {
        let mut state = state_with_table(0.2, DataExistence::NeedsCreation);
        state.matched_domains[0].score = 0.3;
        state.matched_owners[0].score = 0.3;

        let outcome = decide(&input(), state, &thresholds());
        assert!(outcome.overall_confidence < 0.50);
        assert!(outcome.clarifying_question.is_some());
    }
}

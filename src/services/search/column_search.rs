//! Column-level search and the merge with table results.
//!
//! Activates when the query asks about fields ("onde tem o campo CPF?") or
//! the intent targets a field-like entity. Column hits are grouped by parent
//! table; on merge an already-known table gets a +0.15 boost, an unknown one
//! enters with neutral component scores.

use std::collections::BTreeMap;

use super::state::{SearchInput, SearchMode, SearchState};
use crate::models::{Intent, TableInfo, TableMatch};
use crate::services::retriever::{RetrievedColumn, Retriever};

const FIELD_KEYWORDS: &[&str] = &["campo", "coluna", "atributo", "variável", "field"];
const FIELD_ENTITIES: &[&str] = &["cpf", "cnpj", "campo", "coluna"];
const COLUMN_MATCH_BOOST: f64 = 0.15;

/// Whether the column branch should run for this request.
pub fn should_search_columns(input: &SearchInput, intent: Option<&Intent>) -> bool {
    match input.search_mode {
        SearchMode::TableOnly => return false,
        SearchMode::ColumnOnly | SearchMode::Hybrid => return true,
        SearchMode::Auto => {},
    }

    let query_lower = input.raw_query.to_lowercase();
    if FIELD_KEYWORDS.iter().any(|kw| query_lower.contains(kw)) {
        return true;
    }

    intent
        .and_then(|i| i.target_entity.as_deref())
        .is_some_and(|entity| FIELD_ENTITIES.contains(&entity.to_lowercase().as_str()))
}

/// Term sent to the column index: the data need when known, otherwise the
/// raw query with the field keywords stripped.
fn column_search_term(input: &SearchInput, intent: Option<&Intent>) -> String {
    if let Some(intent) = intent
        && !intent.data_need.is_empty()
    {
        return intent.data_need.clone();
    }

    let mut term = input.raw_query.to_lowercase();
    for keyword in FIELD_KEYWORDS {
        term = term.replace(keyword, "");
    }
    term.trim().to_string()
}

pub async fn search_by_columns(
    input: &SearchInput,
    state: &SearchState,
    retriever: &dyn Retriever,
) -> Vec<TableMatch> {
    if !should_search_columns(input, state.intent.as_ref()) {
        return Vec::new();
    }

    let term = column_search_term(input, state.intent.as_ref());
    let domain_filter = input.context.get("domain").map(String::as_str);

    let results = match retriever.search_columns(&term, domain_filter, 10).await {
        Ok(results) => results,
        Err(e) => {
            tracing::warn!("Column search failed: {}", e);
            Vec::new()
        },
    };

    // Group by parent table; best column similarity becomes the group score.
    let mut groups: BTreeMap<i64, (Vec<String>, f64, RetrievedColumn)> = BTreeMap::new();
    for column in results {
        let entry = groups
            .entry(column.table_id)
            .or_insert_with(|| (Vec::new(), 0.0, column.clone()));
        entry.0.push(column.column_display_name.clone());
        entry.1 = entry.1.max(column.similarity_score);
    }

    let mut matches: Vec<TableMatch> = groups
        .into_values()
        .map(|(columns, best_score, first)| {
            let shown: Vec<&String> = columns.iter().take(3).collect();
            TableMatch {
                table: table_info_from_column(&first),
                score: best_score,
                semantic_score: best_score,
                historical_score: 0.5,
                certification_score: 0.5,
                freshness_score: 0.5,
                quality_score: 0.5,
                context_score: 0.0,
                reasoning: format!(
                    "Contém campos: {}",
                    shown.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
                ),
                matched_entities: columns,
                is_double_certified: false,
                has_product_match: false,
            }
        })
        .collect();

    matches.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.table.id.cmp(&b.table.id))
    });
    matches
}

/// Merge column results into the table result set.
pub fn merge_column_and_table_results(
    table_matches: Vec<TableMatch>,
    column_matches: Vec<TableMatch>,
) -> Vec<TableMatch> {
    if column_matches.is_empty() {
        return table_matches;
    }

    let mut merged: BTreeMap<i64, TableMatch> = BTreeMap::new();
    for tm in table_matches {
        merged.insert(tm.table.id, tm);
    }

    for cm in column_matches {
        match merged.get_mut(&cm.table.id) {
            Some(existing) => {
                existing.score = (existing.score + COLUMN_MATCH_BOOST).min(1.0);
                existing
                    .reasoning
                    .push_str(&format!(" | ✓ Campo match: {}", cm.reasoning));
                if existing.matched_entities.is_empty() {
                    existing.matched_entities = cm.matched_entities;
                }
            },
            None => {
                merged.insert(cm.table.id, cm);
            },
        }
    }

    let mut final_matches: Vec<TableMatch> = merged.into_values().collect();
    final_matches.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.table.id.cmp(&b.table.id))
    });
    final_matches.truncate(10);
    final_matches
}

fn table_info_from_column(column: &RetrievedColumn) -> TableInfo {
    TableInfo {
        id: column.table_id,
        name: column.table_name.clone(),
        display_name: column.table_display_name.clone(),
        summary: format!("Tabela com campo {}", column.column_display_name),
        domain_id: column.domain.clone(),
        domain_name: column.domain.clone(),
        owner_id: column.owner_id.unwrap_or(0),
        owner_name: column.owner_name.clone(),
        keywords: vec![column.column_name.clone(), column.column_display_name.clone()],
        granularity: None,
        main_entities: Vec::new(),
        data_layer: None,
        is_golden_source: false,
        is_visao_cliente: false,
        update_frequency: None,
        inferred_product: None,
        last_updated: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap as Ctx;

    fn input(raw_query: &str, mode: SearchMode) -> SearchInput {
        SearchInput {
            request_id: "t".into(),
            raw_query: raw_query.into(),
            variable_name: None,
            variable_type: None,
            context: Ctx::new(),
            use_case: "default".into(),
            search_mode: mode,
            enable_rerank: false,
        }
    }

    #[test]
    fn field_keywords_trigger_the_branch() {
        assert!(should_search_columns(&input("onde tem o campo CPF?", SearchMode::Auto), None));
        assert!(!should_search_columns(&input("vendas mensais", SearchMode::Auto), None));
    }

    #[test]
    fn field_entities_trigger_the_branch() {
        let mut intent = Intent::fallback("documento", "q");
        intent.target_entity = Some("cpf".to_string());
        assert!(should_search_columns(&input("documento", SearchMode::Auto), Some(&intent)));
    }

    #[test]
    fn search_mode_overrides_the_predicate() {
        assert!(!should_search_columns(
            &input("onde tem o campo CPF?", SearchMode::TableOnly),
            None
        ));
        assert!(should_search_columns(&input("vendas", SearchMode::Hybrid), None));
        assert!(should_search_columns(&input("vendas", SearchMode::ColumnOnly), None));
    }

    fn table_match(id: i64, score: f64) -> TableMatch {
        TableMatch {
            table: TableInfo {
                id,
                name: format!("tb_{}", id),
                display_name: format!("tb_{}", id),
                summary: String::new(),
                domain_id: "d".into(),
                domain_name: "d".into(),
                owner_id: 1,
                owner_name: "o".into(),
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
            context_score: 0.0,
            reasoning: "r".into(),
            matched_entities: vec!["nr_cpf".into()],
            is_double_certified: false,
            has_product_match: false,
        }
    }

    #[test]
    fn merge_boosts_existing_tables() {
        let merged = merge_column_and_table_results(
            vec![table_match(1, 0.5)],
            vec![table_match(1, 0.9)],
        );
        assert_eq!(merged.len(), 1);
        assert!((merged[0].score - 0.65).abs() < 1e-9);
        assert!(merged[0].reasoning.contains("Campo match"));
    }

    #[test]
    fn merge_caps_the_boost_at_one() {
        let merged = merge_column_and_table_results(
            vec![table_match(1, 0.95)],
            vec![table_match(1, 0.9)],
        );
        assert!((merged[0].score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn merge_inserts_new_tables() {
        let merged = merge_column_and_table_results(
            vec![table_match(1, 0.5)],
            vec![table_match(2, 0.8)],
        );
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].table.id, 2);
    }
}

//! Table search with disambiguation scoring.
//!
//! Semantic retrieval seeds the candidate set; each candidate is then scored
//! on certification, freshness, quality and context, blended with the
//! historical approval rate and an owner boost:
//! `0.25·semantic + 0.50·disambiguation + 0.15·historical + 0.10·owner`.

use chrono::Utc;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use super::scorer::{TableMetadataForScoring, disambiguation_score};
use super::state::{SearchInput, SearchState};
use crate::models::{
    CatalogSnapshot, DataExistence, DataLayer, Intent, TableInfo, TableMatch, UpdateFrequency,
};
use crate::services::feedback_store::{FeedbackStore, concept_hash_from_intent};
use crate::services::quality::QualityCache;
use crate::services::retriever::{RetrievedTable, Retriever};

const WEIGHT_SEMANTIC: f64 = 0.25;
const WEIGHT_DISAMBIGUATION: f64 = 0.50;
const WEIGHT_HISTORICAL: f64 = 0.15;
const WEIGHT_OWNER: f64 = 0.10;
const OWNER_BOOST: f64 = 0.1;

/// Compose the retrieval query from the intent facets, falling back to the
/// raw query when no intent survived normalization.
pub fn compose_search_query(intent: Option<&Intent>, raw_query: &str) -> String {
    let Some(intent) = intent else {
        return raw_query.to_string();
    };

    let mut parts: Vec<String> = Vec::new();
    if !intent.data_need.is_empty() {
        parts.push(intent.data_need.clone());
    }
    if let Some(entity) = &intent.target_entity {
        parts.push(format!("entidade: {}", entity));
    }
    if let Some(product) = &intent.target_product {
        parts.push(format!("produto: {}", product));
    }
    if let Some(segment) = &intent.target_segment {
        parts.push(format!("segmento: {}", segment));
    }
    if let Some(granularity) = &intent.granularity {
        parts.push(format!("granularidade: {}", granularity));
    }

    if parts.is_empty() {
        raw_query.to_string()
    } else {
        parts.join(" | ")
    }
}

/// Existence verdict from the ranked candidate list.
pub fn data_existence_for(matches: &[TableMatch]) -> DataExistence {
    match matches.first() {
        Some(top) if top.score >= 0.60 => DataExistence::Exists,
        Some(top) if top.score < 0.30 => DataExistence::NeedsCreation,
        Some(_) => DataExistence::Uncertain,
        None => DataExistence::NeedsCreation,
    }
}

pub async fn search_tables_with_disambiguation(
    input: &SearchInput,
    state: &SearchState,
    retriever: &dyn Retriever,
    feedback: &FeedbackStore,
    quality: &Arc<QualityCache>,
    catalog: &CatalogSnapshot,
) -> (Vec<TableMatch>, DataExistence) {
    let intent = state.intent.as_ref();
    let user_domain = state.user_domain().map(str::to_string);
    let user_product = input.user_product(intent).map(str::to_string);

    // Historically approved tables for this concept, fetched once.
    let mut historical_boosts: HashMap<i64, f64> = HashMap::new();
    let concept_hash = intent.map(concept_hash_from_intent);
    if let Some(hash) = &concept_hash {
        match feedback.top_tables_for_concept(hash, 10).await {
            Ok(top) => {
                for (table_id, rate, _count) in top {
                    historical_boosts.insert(table_id, rate);
                }
            },
            Err(e) => tracing::warn!("Historical lookup failed: {}", e),
        }
    }

    let search_query = compose_search_query(intent, &input.raw_query);

    let raw_results = match retriever
        .search(&search_query, user_domain.as_deref(), 20)
        .await
    {
        Ok(results) => results,
        Err(e) => {
            tracing::warn!("Semantic retrieval failed: {}", e);
            Vec::new()
        },
    };

    let owner_ids: BTreeSet<i64> = state.matched_owners.iter().map(|o| o.owner.id).collect();
    let now = Utc::now();

    let mut matches: Vec<TableMatch> = Vec::new();
    for result in raw_results {
        let table_info = table_info_from_result(&result, catalog);

        let metadata = TableMetadataForScoring {
            table_name: table_info.name.clone(),
            data_layer: table_info.data_layer,
            is_golden_source: table_info.is_golden_source,
            is_visao_cliente: table_info.is_visao_cliente,
            domain: Some(table_info.domain_name.clone()),
            update_frequency: table_info.update_frequency,
            last_updated: table_info.last_updated,
            inferred_product: table_info.inferred_product.clone(),
        };

        let disamb = disambiguation_score(
            &metadata,
            &input.use_case,
            user_domain.as_deref(),
            user_product.as_deref(),
            quality,
            now,
        );

        let semantic_score = (1.0 - result.distance).clamp(0.0, 1.0);

        let mut historical_score = historical_boosts
            .get(&table_info.id)
            .copied()
            .unwrap_or(0.5);
        if historical_score == 0.5
            && let Some(hash) = &concept_hash
        {
            match feedback
                .historical_score(hash, table_info.id, feedback.min_samples)
                .await
            {
                Ok((score, count)) => {
                    let is_reliable = count >= feedback.min_samples || count == -1;
                    if is_reliable {
                        historical_score = score;
                    }
                },
                Err(e) => tracing::debug!("Per-table historical lookup failed: {}", e),
            }
        }

        let owner_boost = if owner_ids.contains(&table_info.owner_id) { OWNER_BOOST } else { 0.0 };

        let combined = semantic_score * WEIGHT_SEMANTIC
            + disamb.total_score * WEIGHT_DISAMBIGUATION
            + historical_score * WEIGHT_HISTORICAL
            + owner_boost * WEIGHT_OWNER;

        let mut reasoning = disamb.reasoning.clone();
        if historical_score > 0.7 {
            reasoning.push_str(&format!(
                " | ✓ Histórico: {:.0}% aprovações",
                historical_score * 100.0
            ));
        } else if historical_score < 0.3 {
            reasoning.push_str(&format!(
                " | ⚠️ Histórico: {:.0}% aprovações",
                historical_score * 100.0
            ));
        }

        matches.push(TableMatch {
            matched_entities: table_info.main_entities.clone(),
            table: table_info,
            score: combined,
            semantic_score,
            historical_score,
            certification_score: disamb.certification_score,
            freshness_score: disamb.freshness_score,
            quality_score: disamb.quality_score,
            context_score: disamb.context_score,
            reasoning,
            is_double_certified: disamb.is_double_certified,
            has_product_match: disamb.has_product_match,
        });
    }

    matches.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.table.id.cmp(&b.table.id))
    });
    matches.truncate(10);

    let existence = data_existence_for(&matches);
    (matches, existence)
}

/// Prefer the indexed snapshot entry; fall back to the raw retrieval record
/// for tables indexed after the snapshot was taken.
fn table_info_from_result(result: &RetrievedTable, catalog: &CatalogSnapshot) -> TableInfo {
    if let Some(info) = catalog.table(result.id) {
        return info.clone();
    }

    TableInfo {
        id: result.id,
        name: result.name.clone(),
        display_name: if result.display_name.is_empty() {
            result.name.clone()
        } else {
            result.display_name.clone()
        },
        summary: crate::utils::truncate_chars(&result.description, 200).to_string(),
        domain_id: result.domain.clone(),
        domain_name: result.domain.clone(),
        owner_id: result.owner_id.unwrap_or(0),
        owner_name: result.owner_name.clone(),
        keywords: result.keywords.clone(),
        granularity: None,
        main_entities: Vec::new(),
        data_layer: result.data_layer.as_deref().and_then(DataLayer::parse),
        is_golden_source: result.is_golden_source,
        is_visao_cliente: result.is_visao_cliente,
        update_frequency: result
            .update_frequency
            .as_deref()
            .and_then(UpdateFrequency::parse),
        inferred_product: result.inferred_product.clone(),
        last_updated: result.last_updated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_composition_uses_intent_facets() {
        let mut intent = Intent::fallback("vendas", "q");
        intent.target_entity = Some("cliente".to_string());
        intent.target_product = Some("consignado".to_string());
        intent.granularity = Some("mensal".to_string());

        let query = compose_search_query(Some(&intent), "raw");
        assert_eq!(
            query,
            "vendas | entidade: cliente | produto: consignado | granularidade: mensal"
        );
    }

    #[test]
    fn query_composition_falls_back_to_raw() {
        assert_eq!(compose_search_query(None, "busca livre"), "busca livre");
    }

    #[test]
    fn existence_thresholds() {
        let mk = |score: f64| TableMatch {
            table: TableInfo {
                id: 1,
                name: "t".into(),
                display_name: "t".into(),
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
            context_score: 0.3,
            reasoning: String::new(),
            matched_entities: vec![],
            is_double_certified: false,
            has_product_match: false,
        };

        assert_eq!(data_existence_for(&[mk(0.65)]), DataExistence::Exists);
        assert_eq!(data_existence_for(&[mk(0.45)]), DataExistence::Uncertain);
        assert_eq!(data_existence_for(&[mk(0.2)]), DataExistence::NeedsCreation);
        assert_eq!(data_existence_for(&[]), DataExistence::NeedsCreation);
    }
}

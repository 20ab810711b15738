//! Domain search: keyword-bag overlap against the domain registry.

use std::collections::BTreeSet;

use crate::models::{CatalogSnapshot, DomainMatch, Intent};

/// Score each domain by keyword overlap with the intent. Ties break by
/// domain id; empty overlap everywhere falls back to the first five domains
/// at score 0.3 so downstream nodes always have something to work with.
pub fn search_domains(intent: Option<&Intent>, catalog: &CatalogSnapshot) -> Vec<DomainMatch> {
    let Some(intent) = intent else {
        return Vec::new();
    };

    let mut bag: BTreeSet<String> = BTreeSet::new();
    bag.insert(intent.data_need.to_lowercase());
    for field in [&intent.target_entity, &intent.target_product, &intent.target_segment] {
        if let Some(value) = field {
            bag.insert(value.to_lowercase());
        }
    }
    for domain in &intent.inferred_domains {
        bag.insert(domain.to_lowercase());
    }
    bag.retain(|w| !w.is_empty());

    let mut matches: Vec<DomainMatch> = Vec::new();
    for domain in catalog.domains_sorted() {
        let domain_keywords: BTreeSet<String> =
            domain.keywords.iter().map(|k| k.to_lowercase()).collect();
        let overlap: Vec<&String> = domain_keywords.intersection(&bag).collect();

        if overlap.is_empty() {
            continue;
        }

        let score = (overlap.len() as f64 / bag.len().max(1) as f64 + 0.3).min(1.0);
        let matched: Vec<String> = overlap.iter().map(|s| s.to_string()).collect();
        matches.push(DomainMatch {
            domain: domain.clone(),
            score,
            reasoning: format!("Match por keywords: {}", matched.join(", ")),
        });
    }

    // Stable sort keeps the alphabetical id order among equal scores.
    matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    if matches.is_empty() {
        matches = catalog
            .domains_sorted()
            .into_iter()
            .take(5)
            .map(|d| DomainMatch {
                domain: d.clone(),
                score: 0.3,
                reasoning: "Fallback: sem match direto".to_string(),
            })
            .collect();
    }

    matches.truncate(5);
    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DomainInfo;

    fn catalog() -> CatalogSnapshot {
        let mut snapshot = CatalogSnapshot { generation: 1, ..Default::default() };
        for (id, keywords) in [
            ("clientes", vec!["cliente", "cadastro", "correntista"]),
            ("credito", vec!["consignado", "imobiliário", "empréstimo"]),
            ("vendas", vec!["vendas", "faturamento", "receita"]),
        ] {
            snapshot.domains.insert(
                id.to_string(),
                DomainInfo {
                    id: id.to_string(),
                    name: id.to_string(),
                    keywords: keywords.into_iter().map(String::from).collect(),
                    chief: None,
                },
            );
        }
        snapshot
    }

    fn intent(data_need: &str) -> Intent {
        Intent::fallback(data_need, data_need)
    }

    #[test]
    fn scores_by_keyword_overlap() {
        let catalog = catalog();
        let mut intent = intent("vendas");
        intent.inferred_domains = vec!["faturamento".to_string()];

        let matches = search_domains(Some(&intent), &catalog);
        assert_eq!(matches[0].domain.id, "vendas");
        // bag = {vendas, faturamento}; both overlap → 2/2 + 0.3 capped at 1.0
        assert!((matches[0].score - 1.0).abs() < 1e-9);
        assert!(matches[0].reasoning.contains("keywords"));
    }

    #[test]
    fn falls_back_to_stable_domains_when_nothing_matches() {
        let catalog = catalog();
        let matches = search_domains(Some(&intent("orçamento")), &catalog);

        assert_eq!(matches.len(), 3);
        assert!(matches.iter().all(|m| (m.score - 0.3).abs() < 1e-9));
        assert_eq!(matches[0].reasoning, "Fallback: sem match direto");
        // Stable ordering by domain id.
        assert_eq!(matches[0].domain.id, "clientes");
    }

    #[test]
    fn missing_intent_returns_empty() {
        let catalog = catalog();
        assert!(search_domains(None, &catalog).is_empty());
    }
}

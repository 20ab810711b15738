//! Owner search: owners of the matched domains, weighted by the originating
//! domain score and the owner's historical approval rate.

use std::collections::BTreeSet;

use crate::models::{CatalogSnapshot, DomainMatch, OwnerMatch};

pub fn search_owners(domain_matches: &[DomainMatch], catalog: &CatalogSnapshot) -> Vec<OwnerMatch> {
    let mut seen: BTreeSet<i64> = BTreeSet::new();
    let mut matches: Vec<OwnerMatch> = Vec::new();

    for domain_match in domain_matches {
        for owner in catalog.owners_by_domain(&domain_match.domain.id) {
            if !seen.insert(owner.id) {
                continue;
            }

            let score = domain_match.score * 0.6 + owner.approval_rate * 0.4;
            matches.push(OwnerMatch {
                owner: owner.clone(),
                score,
                reasoning: format!(
                    "Domínio: {} | Aprovação histórica: {:.0}%",
                    domain_match.domain.name,
                    owner.approval_rate * 100.0
                ),
            });
        }
    }

    matches.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.owner.id.cmp(&b.owner.id))
    });
    matches.truncate(10);
    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DomainInfo, OwnerInfo};

    fn catalog() -> CatalogSnapshot {
        let mut snapshot = CatalogSnapshot { generation: 1, ..Default::default() };
        snapshot.domains.insert(
            "vendas".to_string(),
            DomainInfo {
                id: "vendas".to_string(),
                name: "Vendas".to_string(),
                keywords: vec![],
                chief: None,
            },
        );
        for (id, rate) in [(1i64, 0.9), (2, 0.4)] {
            snapshot.owners.insert(
                id,
                OwnerInfo {
                    id,
                    name: format!("Owner {}", id),
                    email: format!("owner{}@corp.example", id),
                    domain_id: "vendas".to_string(),
                    approval_rate: rate,
                    tables_count: 3,
                },
            );
        }
        snapshot
    }

    fn domain_match(score: f64) -> DomainMatch {
        DomainMatch {
            domain: DomainInfo {
                id: "vendas".to_string(),
                name: "Vendas".to_string(),
                keywords: vec![],
                chief: None,
            },
            score,
            reasoning: String::new(),
        }
    }

    #[test]
    fn combines_domain_score_and_approval_rate() {
        let catalog = catalog();
        let matches = search_owners(&[domain_match(0.8)], &catalog);

        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].owner.id, 1);
        assert!((matches[0].score - (0.8 * 0.6 + 0.9 * 0.4)).abs() < 1e-9);
        assert!(matches[0].reasoning.contains("90%"));
    }

    #[test]
    fn deduplicates_owners_across_domain_matches() {
        let catalog = catalog();
        let matches = search_owners(&[domain_match(0.8), domain_match(0.5)], &catalog);
        assert_eq!(matches.len(), 2);
    }
}

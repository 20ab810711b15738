//! Ambiguity Detector
//!
//! Detects ambiguous result sets and builds clarifying questions.
//! Rules, in order: low confidence, score ties (specialized into domain and
//! product conflicts), multiple products, homonymy, fragmentation.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{
    AmbiguityResult, AmbiguityType, ClarifyingOption, DomainMatch, TableMatch,
};

/// Product tokens recognized in table names when `inferred_product` is absent.
const KNOWN_PRODUCTS: &[&str] = &["consig", "imob", "auto", "cartao", "cdc", "varejo", "corporate"];

static VERSION_SUFFIXES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [r"_v\d+$", r"_\d{4}$", r"_hist$", r"_old$", r"_new$", r"_bkp$"]
        .iter()
        .map(|p| Regex::new(p).expect("static suffix pattern"))
        .collect()
});

pub struct AmbiguityDetector {
    score_tie_threshold: f64,
    minimum_confidence: f64,
}

impl AmbiguityDetector {
    pub fn new(score_tie_threshold: f64, minimum_confidence: f64) -> Self {
        Self { score_tie_threshold, minimum_confidence }
    }

    pub fn detect(
        &self,
        table_matches: &[TableMatch],
        _domain_matches: &[DomainMatch],
        user_product: Option<&str>,
    ) -> AmbiguityResult {
        let Some(top1) = table_matches.first() else {
            return AmbiguityResult {
                kind: AmbiguityType::None,
                is_ambiguous: false,
                confidence: 0.0,
                clarifying_question: Some(
                    "Não encontrei tabelas para essa busca. Pode reformular?".to_string(),
                ),
                options: Vec::new(),
                provisional_table_id: None,
                provisional_reasoning: String::new(),
            };
        };

        if top1.score < self.minimum_confidence {
            return self.low_confidence(table_matches);
        }

        if table_matches.len() == 1 {
            return AmbiguityResult::clear(top1.score, Some(top1.table.id), &top1.reasoning);
        }

        let top2 = &table_matches[1];

        if (top1.score - top2.score).abs() < self.score_tie_threshold {
            if top1.table.domain_name != top2.table.domain_name {
                return self.domain_conflict(top1, top2);
            }
            if self.has_product_conflict(top1, top2) {
                return self.product_conflict(&table_matches[..table_matches.len().min(5)]);
            }
            return self.score_tie(top1, top2);
        }

        if user_product.is_some()
            && self.has_multiple_products(&table_matches[..table_matches.len().min(5)])
        {
            return self.product_conflict(&table_matches[..table_matches.len().min(5)]);
        }

        if let Some(result) = self.detect_homonymy(&table_matches[..table_matches.len().min(5)]) {
            return result;
        }

        if let Some(result) = self.detect_fragmentation(&table_matches[..table_matches.len().min(5)])
        {
            return result;
        }

        AmbiguityResult::clear(top1.score, Some(top1.table.id), &top1.reasoning)
    }

    fn low_confidence(&self, matches: &[TableMatch]) -> AmbiguityResult {
        let options = matches
            .iter()
            .take(5)
            .map(|m| ClarifyingOption {
                id: format!("table_{}", m.table.id),
                label: m.table.display_name.clone(),
                description: format!(
                    "{} | Score: {:.0}%",
                    m.table.domain_name,
                    m.score * 100.0
                ),
                table_id: Some(m.table.id),
                domain: Some(m.table.domain_name.clone()),
            })
            .collect();

        AmbiguityResult {
            kind: AmbiguityType::LowConfidence,
            is_ambiguous: true,
            confidence: matches.first().map(|m| m.score).unwrap_or(0.0),
            clarifying_question: Some(
                "Não tenho certeza sobre a melhor opção. Qual destas tabelas você precisa?"
                    .to_string(),
            ),
            options,
            provisional_table_id: matches.first().map(|m| m.table.id),
            provisional_reasoning: String::new(),
        }
    }

    fn score_tie(&self, top1: &TableMatch, top2: &TableMatch) -> AmbiguityResult {
        AmbiguityResult {
            kind: AmbiguityType::ScoreTie,
            is_ambiguous: true,
            confidence: top1.score,
            clarifying_question: Some(
                "Encontrei 2 tabelas com relevância similar. Qual você prefere?".to_string(),
            ),
            options: vec![
                ClarifyingOption {
                    id: format!("table_{}", top1.table.id),
                    label: top1.table.display_name.clone(),
                    description: top1.reasoning.clone(),
                    table_id: Some(top1.table.id),
                    domain: None,
                },
                ClarifyingOption {
                    id: format!("table_{}", top2.table.id),
                    label: top2.table.display_name.clone(),
                    description: top2.reasoning.clone(),
                    table_id: Some(top2.table.id),
                    domain: None,
                },
            ],
            provisional_table_id: Some(top1.table.id),
            provisional_reasoning: "Empate de score, escolhida a primeira".to_string(),
        }
    }

    fn domain_conflict(&self, top1: &TableMatch, top2: &TableMatch) -> AmbiguityResult {
        AmbiguityResult {
            kind: AmbiguityType::DomainConflict,
            is_ambiguous: true,
            confidence: top1.score,
            clarifying_question: Some(format!(
                "Você precisa de dados de {} ou {}?",
                top1.table.domain_name, top2.table.domain_name
            )),
            options: vec![
                ClarifyingOption {
                    id: format!("domain_{}", top1.table.domain_name),
                    label: top1.table.domain_name.clone(),
                    description: format!("Tabela: {}", top1.table.display_name),
                    table_id: Some(top1.table.id),
                    domain: Some(top1.table.domain_name.clone()),
                },
                ClarifyingOption {
                    id: format!("domain_{}", top2.table.domain_name),
                    label: top2.table.domain_name.clone(),
                    description: format!("Tabela: {}", top2.table.display_name),
                    table_id: Some(top2.table.id),
                    domain: Some(top2.table.domain_name.clone()),
                },
            ],
            provisional_table_id: Some(top1.table.id),
            provisional_reasoning: format!(
                "Conflito de domínio entre {} e {}",
                top1.table.domain_name, top2.table.domain_name
            ),
        }
    }

    fn product_conflict(&self, matches: &[TableMatch]) -> AmbiguityResult {
        let mut products: Vec<String> = Vec::new();
        let mut options: Vec<ClarifyingOption> = Vec::new();

        for m in matches {
            let Some(product) = self.product_of(m) else { continue };
            if products.contains(&product) {
                continue;
            }
            products.push(product.clone());
            options.push(ClarifyingOption {
                id: format!("product_{}", product),
                label: capitalize(&product),
                description: format!("Tabela: {}", m.table.display_name),
                table_id: Some(m.table.id),
                domain: None,
            });
        }
        options.truncate(5);

        AmbiguityResult {
            kind: AmbiguityType::MultipleProducts,
            is_ambiguous: true,
            confidence: matches.first().map(|m| m.score).unwrap_or(0.0),
            clarifying_question: Some(
                "Encontrei dados para múltiplos produtos. Qual você precisa?".to_string(),
            ),
            options,
            provisional_table_id: matches.first().map(|m| m.table.id),
            provisional_reasoning: String::new(),
        }
    }

    fn detect_homonymy(&self, matches: &[TableMatch]) -> Option<AmbiguityResult> {
        for (i, earlier) in matches.iter().enumerate() {
            for later in &matches[i + 1..] {
                if earlier.table.name == later.table.name
                    && earlier.table.domain_name != later.table.domain_name
                {
                    return Some(AmbiguityResult {
                        kind: AmbiguityType::Homonymy,
                        is_ambiguous: true,
                        confidence: later.score,
                        clarifying_question: Some(format!(
                            "'{}' existe em contextos diferentes. Qual você precisa?",
                            earlier.table.name
                        )),
                        options: vec![
                            homonym_option(earlier),
                            homonym_option(later),
                        ],
                        provisional_table_id: Some(earlier.table.id),
                        provisional_reasoning: String::new(),
                    });
                }
            }
        }
        None
    }

    fn detect_fragmentation(&self, matches: &[TableMatch]) -> Option<AmbiguityResult> {
        for (i, earlier) in matches.iter().enumerate() {
            for later in &matches[i + 1..] {
                if earlier.table.id != later.table.id
                    && base_name(&earlier.table.name) == base_name(&later.table.name)
                    && earlier.table.name != later.table.name
                {
                    return Some(AmbiguityResult {
                        kind: AmbiguityType::Fragmentation,
                        is_ambiguous: true,
                        confidence: later.score,
                        clarifying_question: Some(
                            "Esses dados estão em tabelas separadas. Qual período/versão você precisa?"
                                .to_string(),
                        ),
                        options: vec![
                            fragment_option(earlier),
                            fragment_option(later),
                        ],
                        provisional_table_id: Some(earlier.table.id),
                        provisional_reasoning: String::new(),
                    });
                }
            }
        }
        None
    }

    fn has_product_conflict(&self, top1: &TableMatch, top2: &TableMatch) -> bool {
        match (self.product_of(top1), self.product_of(top2)) {
            (Some(a), Some(b)) => a != b,
            _ => false,
        }
    }

    fn has_multiple_products(&self, matches: &[TableMatch]) -> bool {
        let mut products: Vec<String> = Vec::new();
        for m in matches {
            if let Some(p) = self.product_of(m)
                && !products.contains(&p)
            {
                products.push(p);
            }
        }
        products.len() > 1
    }

    fn product_of(&self, m: &TableMatch) -> Option<String> {
        if let Some(product) = &m.table.inferred_product {
            return Some(product.to_lowercase());
        }
        extract_product_from_name(&m.table.name)
    }
}

fn homonym_option(m: &TableMatch) -> ClarifyingOption {
    ClarifyingOption {
        id: format!("context_{}", m.table.domain_name),
        label: format!("{} ({})", m.table.name, m.table.domain_name),
        description: crate::utils::truncate_chars(&m.table.summary, 100).to_string(),
        table_id: Some(m.table.id),
        domain: Some(m.table.domain_name.clone()),
    }
}

fn fragment_option(m: &TableMatch) -> ClarifyingOption {
    ClarifyingOption {
        id: format!("version_{}", m.table.name),
        label: m.table.display_name.clone(),
        description: crate::utils::truncate_chars(&m.table.summary, 100).to_string(),
        table_id: Some(m.table.id),
        domain: None,
    }
}

/// Extract a known product token from a table name.
pub fn extract_product_from_name(table_name: &str) -> Option<String> {
    let name_lower = table_name.to_lowercase();
    KNOWN_PRODUCTS
        .iter()
        .find(|p| name_lower.contains(**p))
        .map(|p| p.to_string())
}

/// Base name with version/date suffixes removed.
fn base_name(table_name: &str) -> String {
    let mut result = table_name.to_lowercase();
    for pattern in VERSION_SUFFIXES.iter() {
        result = pattern.replace(&result, "").to_string();
    }
    result
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

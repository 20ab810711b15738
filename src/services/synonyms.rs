//! Corporate synonym dictionary for query expansion.
//!
//! Built-in glossary, optional YAML overlay, plus learned corrections.
//! Lookups are bidirectional: if "consig" is declared a synonym of
//! "consignado", asking for either returns the other.

use once_cell::sync::Lazy;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::RwLock;

static DEFAULT_SYNONYMS: Lazy<BTreeMap<&'static str, Vec<&'static str>>> = Lazy::new(|| {
    BTreeMap::from([
        // Vendas
        ("vendas", vec!["faturamento", "receita", "comercialização", "venda"]),
        ("faturamento", vec!["vendas", "receita"]),
        ("receita", vec!["vendas", "faturamento"]),
        // Crédito
        ("consignado", vec!["consig", "empréstimo consignado", "crédito consignado"]),
        ("consig", vec!["consignado"]),
        ("imobiliário", vec!["imob", "crédito imobiliário", "financiamento imobiliário"]),
        ("imob", vec!["imobiliário"]),
        // Clientes
        ("cliente", vec!["consumidor", "correntista", "titular", "usuário"]),
        ("consumidor", vec!["cliente"]),
        ("correntista", vec!["cliente"]),
        // Segmentos
        ("varejo", vec!["retail", "pessoa física", "pf"]),
        ("pf", vec!["varejo", "pessoa física"]),
        ("corporate", vec!["empresas", "pj", "pessoa jurídica", "corporativo"]),
        ("pj", vec!["corporate", "pessoa jurídica", "empresas"]),
        // Temporais
        ("diário", vec!["diária", "por dia", "daily"]),
        ("mensal", vec!["por mês", "monthly", "mês"]),
        ("anual", vec!["por ano", "yearly", "ano"]),
        // Métricas
        ("quantidade", vec!["qtd", "count", "número", "total"]),
        ("qtd", vec!["quantidade"]),
        ("valor", vec!["montante", "amount", "vlr"]),
        ("vlr", vec!["valor"]),
        // Status
        ("ativo", vec!["ativa", "vigente", "em vigor"]),
        ("inativo", vec!["inativa", "cancelado", "encerrado"]),
        ("inadimplente", vec!["inadimplência", "default", "atraso"]),
    ])
});

/// Thread-safe synonym dictionary. The base map is fixed after construction;
/// learned associations accumulate at runtime and persist separately.
pub struct SynonymDictionary {
    synonyms: BTreeMap<String, BTreeSet<String>>,
    learned: RwLock<BTreeMap<String, BTreeSet<String>>>,
}

impl Default for SynonymDictionary {
    fn default() -> Self {
        Self::new(None)
    }
}

impl SynonymDictionary {
    pub fn new(overlay_path: Option<&Path>) -> Self {
        let mut synonyms: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        for (term, syns) in DEFAULT_SYNONYMS.iter() {
            synonyms.insert(
                term.to_lowercase(),
                syns.iter().map(|s| s.to_lowercase()).collect(),
            );
        }

        let dict = Self { synonyms, learned: RwLock::new(BTreeMap::new()) };

        match overlay_path {
            Some(path) => dict.with_overlay(path),
            None => dict,
        }
    }

    fn with_overlay(mut self, path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match serde_yaml_ng::from_str::<BTreeMap<String, Vec<String>>>(&content)
            {
                Ok(overlay) => {
                    for (term, syns) in overlay {
                        let entry = self.synonyms.entry(term.to_lowercase()).or_default();
                        entry.extend(syns.into_iter().map(|s| s.to_lowercase()));
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to parse synonyms overlay {}: {}", path.display(), e);
                },
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
            Err(e) => {
                tracing::warn!("Failed to load synonyms overlay {}: {}", path.display(), e);
            },
        }
        self
    }

    /// All synonyms for a term: declared, learned, and reverse-lookup entries,
    /// minus the term itself. Stable (sorted) order.
    pub fn get_synonyms(&self, term: &str) -> Vec<String> {
        let term_lower = term.to_lowercase();
        let mut result: BTreeSet<String> = BTreeSet::new();

        if let Some(syns) = self.synonyms.get(&term_lower) {
            result.extend(syns.iter().cloned());
        }

        {
            let learned = self
                .learned
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(syns) = learned.get(&term_lower) {
                result.extend(syns.iter().cloned());
            }
        }

        // Reverse lookup: terms that declare `term` as their synonym.
        for (base, syns) in &self.synonyms {
            if syns.contains(&term_lower) {
                result.insert(base.clone());
                result.extend(syns.iter().cloned());
            }
        }

        result.remove(&term_lower);
        result.into_iter().collect()
    }

    /// Expand a query word-by-word, returning the original plus up to
    /// `max_expansions` variants. Deterministic on input.
    pub fn expand_query(&self, query: &str, max_expansions: usize) -> Vec<String> {
        let mut expansions = vec![query.to_string()];
        let lowered = query.to_lowercase();

        for word in lowered.split_whitespace() {
            for synonym in self.get_synonyms(word).into_iter().take(max_expansions) {
                let expanded = lowered.replace(word, &synonym);
                if !expansions.contains(&expanded) {
                    expansions.push(expanded);
                    if expansions.len() >= max_expansions + 1 {
                        return expansions;
                    }
                }
            }
        }

        expansions
    }

    /// Record a bidirectional learned association from a user correction.
    pub fn learn(&self, original_term: &str, synonym: &str) {
        let original = original_term.to_lowercase();
        let synonym = synonym.to_lowercase();

        let mut learned = self
            .learned
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        learned
            .entry(original.clone())
            .or_default()
            .insert(synonym.clone());
        learned.entry(synonym).or_default().insert(original);
    }

    /// Persist only the learned portion as YAML.
    pub fn save_learned(&self, path: &Path) -> std::io::Result<()> {
        let learned = self
            .learned
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let as_lists: BTreeMap<String, Vec<String>> = learned
            .iter()
            .map(|(k, v)| (k.clone(), v.iter().cloned().collect()))
            .collect();

        let yaml = serde_yaml_ng::to_string(&as_lists)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, yaml)
    }

    pub fn stats(&self) -> (usize, usize) {
        let learned = self
            .learned
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        (self.synonyms.len(), learned.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synonyms_are_bidirectional() {
        let dict = SynonymDictionary::default();

        let from_base = dict.get_synonyms("consignado");
        assert!(from_base.contains(&"consig".to_string()));

        let from_synonym = dict.get_synonyms("consig");
        assert!(from_synonym.contains(&"consignado".to_string()));
    }

    #[test]
    fn get_synonyms_excludes_the_term_itself() {
        let dict = SynonymDictionary::default();
        let synonyms = dict.get_synonyms("vendas");
        assert!(!synonyms.contains(&"vendas".to_string()));
        assert!(synonyms.contains(&"faturamento".to_string()));
    }

    #[test]
    fn expand_query_is_bounded_and_deterministic() {
        let dict = SynonymDictionary::default();

        let first = dict.expand_query("vendas mensais", 3);
        let second = dict.expand_query("vendas mensais", 3);

        assert_eq!(first, second);
        assert_eq!(first[0], "vendas mensais");
        assert!(first.len() <= 4);
    }

    #[test]
    fn learned_synonyms_are_bidirectional() {
        let dict = SynonymDictionary::default();
        dict.learn("poupança", "caderneta");

        assert!(dict
            .get_synonyms("poupança")
            .contains(&"caderneta".to_string()));
        assert!(dict
            .get_synonyms("caderneta")
            .contains(&"poupança".to_string()));
    }

    #[test]
    fn save_learned_persists_only_learned_entries() {
        let dict = SynonymDictionary::default();
        dict.learn("poupança", "caderneta");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("learned.yaml");
        dict.save_learned(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("poupança"));
        assert!(!content.contains("consignado"));
    }
}

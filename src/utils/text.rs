//! Text normalization helpers for cache keys and query matching.
//!
//! Queries differing only in case, punctuation, stopwords or word order must
//! normalize to the same token list, so equivalent requests share one intent
//! cache entry.

use std::collections::BTreeSet;

/// Portuguese stopwords removed before hashing a query.
pub const STOPWORDS: &[&str] = &[
    "de", "da", "do", "das", "dos", "e", "para", "com", "em", "a", "o", "os", "as", "um", "uma",
    "uns", "umas", "que", "na", "no", "nas", "nos", "se", "por", "mais", "como", "mas", "foi",
    "ao", "aos", "pela", "pelo", "seu", "sua", "seus", "suas", "preciso", "quero", "buscar",
    "encontrar", "ver", "dados", "tabela", "tabelas",
];

fn is_word_char(c: char) -> bool {
    c.is_ascii_lowercase()
        || matches!(c, 'á' | 'à' | 'â' | 'ã' | 'é' | 'è' | 'ê' | 'í' | 'ì' | 'ó' | 'ò' | 'ô'
            | 'õ' | 'ú' | 'ù' | 'û' | 'ç')
}

/// Normalize text for cache key generation: lowercase, strip everything but
/// letters and spaces, drop stopwords and short tokens, dedupe and sort.
pub fn normalize_for_cache(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| if is_word_char(c) { c } else { ' ' })
        .collect();

    let words: BTreeSet<&str> = cleaned
        .split_whitespace()
        .filter(|w| w.chars().count() > 2 && !STOPWORDS.contains(w))
        .collect();

    words.into_iter().collect::<Vec<_>>().join(" ")
}

/// Trim a string, returning None when nothing is left.
pub fn clean_optional(s: Option<&str>) -> Option<String> {
    s.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Truncate a string to at most `max` characters (on a char boundary).
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_ignores_case_punctuation_and_order() {
        let a = normalize_for_cache("Vendas mensais do Consignado!");
        let b = normalize_for_cache("consignado   VENDAS mensais");
        assert_eq!(a, b);
        assert_eq!(a, "consignado mensais vendas");
    }

    #[test]
    fn normalization_drops_stopwords_and_short_tokens() {
        let out = normalize_for_cache("preciso de dados da tabela de vendas pf");
        assert_eq!(out, "vendas");
    }

    #[test]
    fn normalization_keeps_accented_words() {
        let out = normalize_for_cache("crédito imobiliário");
        assert_eq!(out, "crédito imobiliário");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("granularidade", 5), "granu");
        assert_eq!(truncate_chars("ação", 2), "aç");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}

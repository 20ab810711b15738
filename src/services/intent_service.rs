//! Intent Normalizer
//!
//! Converts a free-form request plus optional structured context into a
//! canonical `Intent`. Checks the cache first, calls the language model on a
//! miss, expands inferred domains with synonyms, and caches the result under
//! its key plus synonym-expanded query variants. Never errors to the caller:
//! a model failure produces a low-confidence fallback intent.

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use super::intent_cache::{IntentCache, generate_cache_key};
use super::llm::LanguageModel;
use super::synonyms::SynonymDictionary;
use crate::models::Intent;

const INTENT_PROMPT: &str = r#"Você é um especialista em interpretar solicitações de dados.
Sua tarefa é normalizar a solicitação do usuário em um formato estruturado.

Extraia:
1. data_need: O que está sendo solicitado (vendas, clientes, transações, etc)
2. data_type: Tipo de dado (currency, count, text, date, etc)
3. target_entity: Entidade principal (cliente, produto, loja, etc)
4. target_segment: Segmento de negócio (varejo, corporate, PF, PJ, etc)
5. target_product: Produto específico (consignado, imobiliário, cartão, etc)
6. target_audience: Público específico mencionado
7. granularity: Periodicidade (diária, mensal, anual, transação)
8. time_reference: Referência temporal (últimos 12 meses, YTD, etc)
9. inferred_domains: Domínios de dados prováveis (vendas, clientes, produtos, crédito, risco)

IMPORTANTE:
- Normalize sinônimos (receita → vendas, faturamento → vendas)
- Se não tiver certeza de um campo, deixe null
- Retorne APENAS JSON válido

Exemplos de normalização:
- "faturamento mensal" → data_need: "vendas", granularity: "mensal"
- "clientes ativos do consig" → target_entity: "cliente", target_product: "consignado"
- "quantos PJs temos" → target_entity: "cliente", target_segment: "PJ", data_type: "count"
"#;

/// Outcome of a normalization, with the cache-hit flag for metrics.
pub struct NormalizedIntent {
    pub intent: Intent,
    pub cache_hit: bool,
}

pub struct IntentNormalizer {
    llm: Arc<dyn LanguageModel>,
    cache: Arc<IntentCache>,
    synonyms: Arc<SynonymDictionary>,
    llm_deadline: Duration,
}

impl IntentNormalizer {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        cache: Arc<IntentCache>,
        synonyms: Arc<SynonymDictionary>,
        llm_deadline: Duration,
    ) -> Self {
        Self { llm, cache, synonyms, llm_deadline }
    }

    /// Build the full query string from the raw query and variable name.
    pub fn full_query(raw_query: &str, variable_name: Option<&str>) -> String {
        let mut parts: Vec<String> = Vec::new();
        if !raw_query.trim().is_empty() {
            parts.push(raw_query.trim().to_string());
        }
        if let Some(name) = variable_name.filter(|n| !n.trim().is_empty()) {
            parts.push(format!("variável: {}", name.trim()));
        }
        if parts.is_empty() {
            "consulta não especificada".to_string()
        } else {
            parts.join(" | ")
        }
    }

    pub async fn normalize(
        &self,
        raw_query: &str,
        variable_name: Option<&str>,
        variable_type: Option<&str>,
        context: Option<&BTreeMap<String, String>>,
    ) -> NormalizedIntent {
        let full_query = Self::full_query(raw_query, variable_name);
        let cache_key = generate_cache_key(&full_query, variable_name, context);

        if let Some(cached) = self.cache.get(&cache_key) {
            return NormalizedIntent {
                intent: cached.with_original_query(&full_query),
                cache_hit: true,
            };
        }

        match self
            .extract_with_llm(&full_query, variable_name, variable_type, context)
            .await
        {
            Ok(intent) => {
                let variants = self.synonyms.expand_query(&full_query, 3);
                self.cache.set(&cache_key, intent.clone(), &variants);
                NormalizedIntent { intent, cache_hit: false }
            },
            Err(e) => {
                tracing::warn!("Intent extraction failed, using fallback: {}", e);
                let data_need = variable_name
                    .filter(|n| !n.is_empty())
                    .unwrap_or(raw_query)
                    .to_string();
                NormalizedIntent {
                    intent: Intent::fallback(data_need, full_query),
                    cache_hit: false,
                }
            },
        }
    }

    async fn extract_with_llm(
        &self,
        full_query: &str,
        variable_name: Option<&str>,
        variable_type: Option<&str>,
        context: Option<&BTreeMap<String, String>>,
    ) -> Result<Intent, String> {
        let context_json = context
            .map(|c| serde_json::to_string(c).unwrap_or_else(|_| "{}".to_string()))
            .unwrap_or_else(|| "{}".to_string());

        let prompt = format!(
            "{INTENT_PROMPT}\nSolicitação: {full_query}\n\nContexto adicional:\n- Nome da variável: {}\n- Tipo da variável: {}\n- Contexto: {}\n\nRetorne o JSON estruturado:",
            variable_name.unwrap_or("não informado"),
            variable_type.unwrap_or("não informado"),
            context_json,
        );

        let reply = self
            .llm
            .complete(&prompt, self.llm_deadline)
            .await
            .map_err(|e| e.to_string())?;

        let parsed = parse_json_reply(&reply)?;

        let mut inferred_domains: Vec<String> = parsed
            .get("inferred_domains")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        // Up to two synonyms per seeded domain, no duplicates.
        for domain in inferred_domains.clone() {
            for synonym in self.synonyms.get_synonyms(&domain).into_iter().take(2) {
                if !inferred_domains.contains(&synonym) {
                    inferred_domains.push(synonym);
                }
            }
        }

        let as_string = |field: &str| -> Option<String> {
            parsed
                .get(field)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        Ok(Intent {
            data_need: as_string("data_need").unwrap_or_else(|| full_query.to_string()),
            data_type: as_string("data_type"),
            target_entity: as_string("target_entity"),
            target_segment: as_string("target_segment"),
            target_product: as_string("target_product"),
            target_audience: as_string("target_audience"),
            granularity: as_string("granularity"),
            time_reference: as_string("time_reference"),
            inferred_domains,
            original_query: full_query.to_string(),
            extraction_confidence: 0.85,
        })
    }
}

/// Parse a model reply as a JSON object, tolerating markdown code fences.
pub fn parse_json_reply(reply: &str) -> Result<Value, String> {
    let mut text = reply.trim();

    if let Some(start) = text.find("```json") {
        text = &text[start + 7..];
        if let Some(end) = text.find("```") {
            text = &text[..end];
        }
    } else if let Some(start) = text.find("```") {
        text = &text[start + 3..];
        if let Some(end) = text.find("```") {
            text = &text[..end];
        }
    }

    serde_json::from_str(text.trim()).map_err(|e| format!("invalid JSON reply: {}", e))
}

//! LLM Reranker
//!
//! Reorders candidates through the language model, but only when the numeric
//! ranking is ambiguous (small spread across the top 5). Any failure — call,
//! parse, unknown ids — leaves the input order untouched.

use serde_json::Value;
use std::time::Duration;

use super::state::{SearchInput, SearchState};
use crate::models::{Intent, TableMatch};
use crate::services::intent_service::parse_json_reply;
use crate::services::llm::LanguageModel;
use crate::utils::truncate_chars;

/// Rerank only when the top-5 spread is below the threshold and there is a
/// real choice to make.
pub fn should_rerank(matches: &[TableMatch], spread_threshold: f64) -> bool {
    if matches.len() < 2 {
        return false;
    }
    let top5 = &matches[..matches.len().min(5)];
    let spread = top5[0].score - top5[top5.len() - 1].score;
    spread < spread_threshold
}

fn build_tables_summary(matches: &[TableMatch]) -> String {
    let mut lines: Vec<String> = Vec::new();
    for (i, m) in matches.iter().enumerate() {
        let mut certifications: Vec<String> = Vec::new();
        if m.table.is_golden_source {
            certifications.push("Golden Source".to_string());
        }
        if m.table.is_visao_cliente {
            certifications.push("Visão Cliente".to_string());
        }
        if let Some(layer) = m.table.data_layer {
            certifications.push(layer.as_str().to_string());
        }
        let cert_str = if certifications.is_empty() {
            String::new()
        } else {
            format!(" [{}]", certifications.join(", "))
        };

        lines.push(format!(
            "**{}. {}** (ID: {}){}\n- Score: {:.2}\n- Domínio: {}\n- Owner: {}\n- Resumo: {}\n- Reasoning atual: {}",
            i + 1,
            m.table.display_name,
            m.table.id,
            cert_str,
            m.score,
            m.table.domain_name,
            m.table.owner_name,
            truncate_chars(&m.table.summary, 150),
            m.reasoning,
        ));
    }
    lines.join("\n\n")
}

fn build_context_summary(input: &SearchInput, intent: Option<&Intent>) -> String {
    let mut parts: Vec<String> = Vec::new();

    if let Some(intent) = intent {
        if let Some(product) = &intent.target_product {
            parts.push(format!("Produto: {}", product));
        }
        if let Some(segment) = &intent.target_segment {
            parts.push(format!("Segmento: {}", segment));
        }
        if let Some(entity) = &intent.target_entity {
            parts.push(format!("Entidade: {}", entity));
        }
        if let Some(granularity) = &intent.granularity {
            parts.push(format!("Granularidade: {}", granularity));
        }
    }

    parts.push(format!("Use case: {}", input.use_case));
    parts.join(" | ")
}

fn build_rerank_prompt(input: &SearchInput, state: &SearchState, matches: &[TableMatch]) -> String {
    let query = state
        .intent
        .as_ref()
        .map(|i| i.data_need.as_str())
        .filter(|s| !s.is_empty())
        .unwrap_or(&input.raw_query);

    format!(
        r#"Você é um especialista em dados corporativos. Analise estas tabelas candidatas para a busca do usuário e reordene-as baseado em relevância.

## Query do Usuário
{query}

## Contexto Adicional
{context}

## Tabelas Candidatas (ordenadas por score numérico)
{tables}

## Critérios de Avaliação
1. **Match de conceito**: A tabela atende ao que o usuário busca?
2. **Granularidade**: A granularidade (diária, mensal) é adequada?
3. **Qualidade**: Considere certificações (Golden Source, Visão Cliente)
4. **Recência**: Dados atualizados são preferíveis
5. **Especificidade**: Tabela específica > genérica se match de contexto

## Resposta
Retorne um JSON com:
1. "ranking": lista de IDs na nova ordem (melhor primeiro)
2. "reasoning": explicação da reordenação
3. "confidence": 0.0-1.0 na reordenação

Exemplo:
{{"ranking": [3, 1, 2], "reasoning": "Tabela 3 tem match exato de produto...", "confidence": 0.85}}

JSON:"#,
        query = query,
        context = build_context_summary(input, state.intent.as_ref()),
        tables = build_tables_summary(matches),
    )
}

/// Apply a returned ranking to the candidate list. Candidates missing from
/// the ranking keep their relative order after the ranked ones, followed by
/// the unreranked tail.
pub fn apply_ranking(
    matches: Vec<TableMatch>,
    ranking: &[i64],
    model_reasoning: &str,
    max_candidates: usize,
) -> Vec<TableMatch> {
    let tail: Vec<TableMatch> = matches.iter().skip(max_candidates).cloned().collect();
    let mut head: Vec<Option<TableMatch>> =
        matches.into_iter().take(max_candidates).map(Some).collect();

    let mut reranked: Vec<TableMatch> = Vec::new();
    for id in ranking {
        if let Some(slot) = head
            .iter_mut()
            .find(|slot| slot.as_ref().is_some_and(|m| m.table.id == *id))
        {
            let mut m = slot.take().expect("slot was checked above");
            m.reasoning
                .push_str(&format!(" | 🤖 LLM: {}", truncate_chars(model_reasoning, 100)));
            reranked.push(m);
        }
    }

    // Unranked candidates keep their relative order.
    reranked.extend(head.into_iter().flatten());
    reranked.extend(tail);
    reranked
}

/// Rerank node. Returns `(matches, reranked_flag)`.
pub async fn llm_rerank(
    input: &SearchInput,
    state: &SearchState,
    llm: &dyn LanguageModel,
    spread_threshold: f64,
    max_candidates: usize,
    deadline: Duration,
) -> (Vec<TableMatch>, bool) {
    let matches = state.matched_tables.clone();

    if !input.enable_rerank {
        return (matches, false);
    }
    if !should_rerank(&matches, spread_threshold) {
        return (matches, false);
    }

    let to_rerank = &matches[..matches.len().min(max_candidates)];
    let prompt = build_rerank_prompt(input, state, to_rerank);

    let reply = match llm.complete(&prompt, deadline).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::warn!("LLM reranking failed: {}", e);
            return (matches, false);
        },
    };

    let parsed = match parse_json_reply(&reply) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("LLM rerank reply unparseable: {}", e);
            return (matches, false);
        },
    };

    let ranking: Vec<i64> = parsed
        .get("ranking")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_i64).collect())
        .unwrap_or_default();

    if ranking.is_empty() {
        return (matches, false);
    }

    let reasoning = parsed
        .get("reasoning")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    (apply_ranking(matches, &ranking, &reasoning, max_candidates), true)
}

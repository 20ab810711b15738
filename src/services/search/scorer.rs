//! Disambiguation Scorer
//!
//! Multi-dimensional scoring for table disambiguation: certification,
//! freshness, quality and context, mixed by use-case weights. Pure and
//! deterministic for a given clock instant.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::models::{DataLayer, UpdateFrequency};
use crate::services::quality::QualityCache;

/// Initial defaults, pending calibration data.
pub const CERT_GOLDEN_OR_VISAO: f64 = 1.0;
pub const CERT_SOT: f64 = 0.75;
pub const CERT_SPEC: f64 = 0.50;
pub const CERT_SOR: f64 = 0.30;
pub const CERT_UNKNOWN: f64 = 0.3;

/// (fresh_hours, stale_hours) per declared frequency.
pub const FRESHNESS_REALTIME: (f64, f64) = (1.0, 4.0);
pub const FRESHNESS_DAILY: (f64, f64) = (26.0, 50.0);
pub const FRESHNESS_WEEKLY: (f64, f64) = (170.0, 200.0);
pub const FRESHNESS_MONTHLY: (f64, f64) = (750.0, 800.0);
pub const FRESHNESS_UNKNOWN: (f64, f64) = (72.0, 168.0);

#[derive(Debug, Clone, Copy)]
pub struct UseCaseWeights {
    pub cert: f64,
    pub fresh: f64,
    pub quality: f64,
}

/// Weight mix per use case; cert + fresh + quality sum to 1.0.
pub fn weights_for(use_case: &str) -> UseCaseWeights {
    match use_case {
        "operational" => UseCaseWeights { cert: 0.25, fresh: 0.40, quality: 0.35 },
        "analytical" => UseCaseWeights { cert: 0.30, fresh: 0.15, quality: 0.55 },
        "regulatory" => UseCaseWeights { cert: 0.40, fresh: 0.10, quality: 0.50 },
        _ => UseCaseWeights { cert: 0.30, fresh: 0.30, quality: 0.40 },
    }
}

/// Table metadata needed for disambiguation scoring.
#[derive(Debug, Clone, Default)]
pub struct TableMetadataForScoring {
    pub table_name: String,
    pub data_layer: Option<DataLayer>,
    pub is_golden_source: bool,
    pub is_visao_cliente: bool,
    pub domain: Option<String>,
    pub update_frequency: Option<UpdateFrequency>,
    pub last_updated: Option<DateTime<Utc>>,
    pub inferred_product: Option<String>,
}

/// Complete disambiguation score with breakdown.
#[derive(Debug, Clone)]
pub struct DisambiguationScore {
    pub total_score: f64,
    pub certification_score: f64,
    pub freshness_score: f64,
    pub quality_score: f64,
    pub context_score: f64,
    pub reasoning: String,
    pub is_double_certified: bool,
    pub has_product_match: bool,
}

/// Certification hierarchy: double certification and single certification at
/// the top, then SoT > Spec > SoR.
pub fn certification_score(table: &TableMetadataForScoring) -> (f64, String) {
    let layer_score = match table.data_layer {
        Some(DataLayer::SoT) => CERT_SOT,
        Some(DataLayer::Spec) => CERT_SPEC,
        Some(DataLayer::SoR) => CERT_SOR,
        None => CERT_UNKNOWN,
    };

    if table.is_golden_source && table.is_visao_cliente {
        return (CERT_GOLDEN_OR_VISAO, "✓✓ Duplamente certificada".to_string());
    }
    if table.is_golden_source {
        return (CERT_GOLDEN_OR_VISAO.max(layer_score), "✓ Golden Source".to_string());
    }
    if table.is_visao_cliente {
        return (CERT_GOLDEN_OR_VISAO.max(layer_score), "✓ Visão Cliente".to_string());
    }
    if let Some(layer) = table.data_layer {
        return (layer_score, format!("Camada: {}", layer.as_str()));
    }
    (layer_score, "Não certificada".to_string())
}

/// Freshness against the declared update frequency. Missing `last_updated`
/// yields the neutral 0.5.
pub fn freshness_score(table: &TableMetadataForScoring, now: DateTime<Utc>) -> (f64, String) {
    let Some(last_updated) = table.last_updated else {
        return (0.5, "Sem info de atualização".to_string());
    };

    let hours_since = (now - last_updated).num_seconds() as f64 / 3600.0;
    let (freq_label, (fresh_limit, stale_limit)) = match table.update_frequency {
        Some(UpdateFrequency::Realtime) => ("realtime", FRESHNESS_REALTIME),
        Some(UpdateFrequency::Daily) => ("daily", FRESHNESS_DAILY),
        Some(UpdateFrequency::Weekly) => ("weekly", FRESHNESS_WEEKLY),
        Some(UpdateFrequency::Monthly) => ("monthly", FRESHNESS_MONTHLY),
        None => ("unknown", FRESHNESS_UNKNOWN),
    };

    if hours_since <= fresh_limit {
        (1.0, format!("✓ Atualizada há {}h ({})", hours_since as i64, freq_label))
    } else if hours_since <= stale_limit {
        (0.7, format!("○ Atualizada há {}h ({})", hours_since as i64, freq_label))
    } else {
        (0.4, format!("⚠️ Desatualizada há {}h ({})", hours_since as i64, freq_label))
    }
}

/// Quality from the synced cache, 0.5 when absent.
pub fn quality_component(quality: &QualityCache, table_name: &str) -> (f64, String) {
    let Some(cached) = quality.get(table_name) else {
        return (0.5, "Sem métrica de qualidade".to_string());
    };

    let score = cached.quality_score / 100.0;
    let reason = if score >= 0.9 {
        format!("✓ Qualidade: {:.1}/100", cached.quality_score)
    } else if score >= 0.7 {
        format!("○ Qualidade: {:.1}/100", cached.quality_score)
    } else {
        format!("⚠️ Qualidade: {:.1}/100", cached.quality_score)
    };
    (score, reason)
}

/// Context match: +0.5 domain, +0.5 product (via `inferred_product`, or the
/// table name for Spec tables). 0.3 when nothing matched.
pub fn context_score(
    table: &TableMetadataForScoring,
    user_domain: Option<&str>,
    user_product: Option<&str>,
) -> (f64, String) {
    let mut score: f64 = 0.0;
    let mut reasons: Vec<String> = Vec::new();

    if let (Some(user_domain), Some(domain)) = (user_domain, table.domain.as_deref())
        && user_domain.eq_ignore_ascii_case(domain)
    {
        score += 0.5;
        reasons.push(format!("✓ Domínio: {}", domain));
    }

    if let Some(user_product) = user_product {
        let product_lower = user_product.to_lowercase();
        if let Some(inferred) = table.inferred_product.as_deref() {
            if inferred.to_lowercase().contains(&product_lower) {
                score += 0.5;
                reasons.push(format!("✓ Produto: {}", inferred));
            }
        } else if table.data_layer == Some(DataLayer::Spec)
            && table.table_name.to_lowercase().contains(&product_lower)
        {
            score += 0.5;
            reasons.push("✓ Produto match no nome".to_string());
        }
    }

    if reasons.is_empty() {
        return (0.3, "Contexto não verificado".to_string());
    }

    (score.min(1.0), reasons.join(" | "))
}

/// Weighted combination of the four components. Context acts as an additive
/// +0.10 boost (capped at 1.0) rather than a weighted term.
pub fn disambiguation_score(
    table: &TableMetadataForScoring,
    use_case: &str,
    user_domain: Option<&str>,
    user_product: Option<&str>,
    quality: &Arc<QualityCache>,
    now: DateTime<Utc>,
) -> DisambiguationScore {
    let weights = weights_for(use_case);

    let (cert, cert_reason) = certification_score(table);
    let (fresh, fresh_reason) = freshness_score(table, now);
    let (qual, quality_reason) = quality_component(quality, &table.table_name);
    let (context, context_reason) = context_score(table, user_domain, user_product);

    let mut total = cert * weights.cert + fresh * weights.fresh + qual * weights.quality;
    if context >= 0.5 {
        total = (total + 0.10).min(1.0);
    }

    let mut reasoning_parts = vec![cert_reason, fresh_reason, quality_reason];
    if context_reason != "Contexto não verificado" {
        reasoning_parts.push(context_reason);
    }

    DisambiguationScore {
        total_score: total,
        certification_score: cert,
        freshness_score: fresh,
        quality_score: qual,
        context_score: context,
        reasoning: reasoning_parts.join(" | "),
        is_double_certified: table.is_golden_source && table.is_visao_cliente,
        has_product_match: context >= 0.5 && user_product.is_some(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn quality_cache() -> Arc<QualityCache> {
        Arc::new(QualityCache::new(25.0))
    }

    fn spec_table(name: &str) -> TableMetadataForScoring {
        TableMetadataForScoring {
            table_name: name.to_string(),
            data_layer: Some(DataLayer::Spec),
            domain: Some("vendas".to_string()),
            update_frequency: Some(UpdateFrequency::Monthly),
            last_updated: Some(Utc::now() - Duration::hours(12)),
            ..Default::default()
        }
    }

    #[test]
    fn certification_hierarchy() {
        let mut table = spec_table("tb");
        assert!((certification_score(&table).0 - CERT_SPEC).abs() < 1e-9);

        table.data_layer = Some(DataLayer::SoT);
        assert!((certification_score(&table).0 - CERT_SOT).abs() < 1e-9);

        table.is_golden_source = true;
        assert!((certification_score(&table).0 - 1.0).abs() < 1e-9);

        table.is_visao_cliente = true;
        let (score, reason) = certification_score(&table);
        assert!((score - 1.0).abs() < 1e-9);
        assert!(reason.contains("Duplamente"));
    }

    #[test]
    fn golden_source_never_scores_below_its_layer() {
        let golden = TableMetadataForScoring {
            table_name: "tb_g".into(),
            is_golden_source: true,
            data_layer: Some(DataLayer::SoR),
            ..Default::default()
        };
        let plain = TableMetadataForScoring {
            table_name: "tb_p".into(),
            data_layer: Some(DataLayer::SoR),
            ..Default::default()
        };
        assert!(certification_score(&golden).0 >= certification_score(&plain).0);
    }

    #[test]
    fn freshness_windows_per_frequency() {
        let now = Utc::now();
        let mut table = spec_table("tb");

        table.update_frequency = Some(UpdateFrequency::Daily);
        table.last_updated = Some(now - Duration::hours(10));
        assert!((freshness_score(&table, now).0 - 1.0).abs() < 1e-9);

        table.last_updated = Some(now - Duration::hours(40));
        assert!((freshness_score(&table, now).0 - 0.7).abs() < 1e-9);

        table.last_updated = Some(now - Duration::hours(60));
        assert!((freshness_score(&table, now).0 - 0.4).abs() < 1e-9);

        table.last_updated = None;
        assert!((freshness_score(&table, now).0 - 0.5).abs() < 1e-9);
    }

    #[test]
    fn context_boost_for_spec_table_with_product_in_name() {
        let table = spec_table("tb_vendas_consig_spec");
        let (score, reason) = context_score(&table, Some("vendas"), Some("consig"));
        assert!((score - 1.0).abs() < 1e-9);
        assert!(reason.contains("Domínio"));
        assert!(reason.contains("Produto"));
    }

    #[test]
    fn context_neutral_when_nothing_matches() {
        let table = spec_table("tb_contratos");
        let (score, reason) = context_score(&table, Some("clientes"), None);
        assert!((score - 0.3).abs() < 1e-9);
        assert_eq!(reason, "Contexto não verificado");
    }

    #[test]
    fn use_case_weights_sum_to_one() {
        for use_case in ["operational", "analytical", "regulatory", "default", "other"] {
            let w = weights_for(use_case);
            assert!((w.cert + w.fresh + w.quality - 1.0).abs() < 1e-9, "{}", use_case);
        }
    }

    #[test]
    fn scoring_is_stable() {
        let quality = quality_cache();
        let table = spec_table("tb_vendas_consig_spec");
        let now = Utc::now();

        let a = disambiguation_score(&table, "analytical", Some("vendas"), Some("consig"), &quality, now);
        let b = disambiguation_score(&table, "analytical", Some("vendas"), Some("consig"), &quality, now);
        assert!((a.total_score - b.total_score).abs() < 1e-9);
    }

    #[test]
    fn certification_is_monotonic_in_golden_source() {
        let quality = quality_cache();
        let now = Utc::now();

        let mut golden = spec_table("tb_x");
        golden.is_golden_source = true;
        let plain = spec_table("tb_x");

        let golden_score =
            disambiguation_score(&golden, "default", None, None, &quality, now).total_score;
        let plain_score =
            disambiguation_score(&plain, "default", None, None, &quality, now).total_score;
        assert!(golden_score >= plain_score);
    }

    #[test]
    fn context_adds_capped_boost() {
        let quality = quality_cache();
        let now = Utc::now();
        let table = spec_table("tb_vendas_consig_spec");

        let with_context =
            disambiguation_score(&table, "default", Some("vendas"), Some("consig"), &quality, now);
        let without_context = disambiguation_score(&table, "default", None, None, &quality, now);

        assert!(with_context.has_product_match);
        assert!(
            (with_context.total_score - (without_context.total_score + 0.10).min(1.0)).abs()
                < 1e-9
        );
    }
}

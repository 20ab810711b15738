//! Local quality-metric cache.
//!
//! `get` returns entries even when stale (the caller inspects the age);
//! `get_score` normalizes to [0, 1] with a neutral default for unknown
//! tables. Sync state lives here so the scheduler and health checker share it.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::RwLock;
use utoipa::ToSchema;

use super::source::TableQualityMetric;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CachedQualityMetric {
    pub table_name: String,
    pub quality_score: f64,
    /// When the source says the metric was computed.
    pub source_updated_at: DateTime<Utc>,
    /// When we cached it.
    pub cached_at: DateTime<Utc>,
}

impl CachedQualityMetric {
    pub fn cache_age_hours(&self, now: DateTime<Utc>) -> f64 {
        (now - self.cached_at).num_seconds() as f64 / 3600.0
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QualityCacheStats {
    pub total_cached: usize,
    pub stale_count: usize,
    pub last_sync: Option<DateTime<Utc>>,
}

pub struct QualityCache {
    cache: DashMap<String, CachedQualityMetric>,
    max_stale_hours: f64,
    last_sync: RwLock<Option<DateTime<Utc>>>,
}

impl QualityCache {
    pub fn new(max_stale_hours: f64) -> Self {
        Self {
            cache: DashMap::new(),
            max_stale_hours,
            last_sync: RwLock::new(None),
        }
    }

    /// Cached metric for a table, stale or not.
    pub fn get(&self, table_name: &str) -> Option<CachedQualityMetric> {
        self.cache.get(table_name).map(|e| e.clone())
    }

    /// Quality score normalized to [0, 1], or `default` when unknown.
    pub fn get_score(&self, table_name: &str, default: f64) -> f64 {
        match self.get(table_name) {
            Some(metric) => metric.quality_score / 100.0,
            None => default,
        }
    }

    pub fn set(&self, metric: TableQualityMetric) {
        self.cache.insert(
            metric.table_name.clone(),
            CachedQualityMetric {
                table_name: metric.table_name,
                quality_score: metric.quality_score,
                source_updated_at: metric.last_updated,
                cached_at: Utc::now(),
            },
        );
    }

    pub fn set_batch(&self, metrics: Vec<TableQualityMetric>) -> usize {
        let count = metrics.len();
        for metric in metrics {
            self.set(metric);
        }
        count
    }

    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        *self
            .last_sync
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn mark_synced(&self, at: DateTime<Utc>) {
        *self
            .last_sync
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(at);
    }

    pub fn stale_tables(&self) -> Vec<String> {
        let now = Utc::now();
        self.cache
            .iter()
            .filter(|e| e.value().cache_age_hours(now) > self.max_stale_hours)
            .map(|e| e.key().clone())
            .collect()
    }

    pub fn stats(&self) -> QualityCacheStats {
        QualityCacheStats {
            total_cached: self.cache.len(),
            stale_count: self.stale_tables().len(),
            last_sync: self.last_sync(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric(name: &str, score: f64) -> TableQualityMetric {
        TableQualityMetric {
            table_name: name.to_string(),
            quality_score: score,
            last_updated: Utc::now(),
        }
    }

    #[test]
    fn score_is_normalized_with_neutral_default() {
        let cache = QualityCache::new(25.0);
        cache.set(metric("tb_vendas_sot", 94.5));

        assert!((cache.get_score("tb_vendas_sot", 0.5) - 0.945).abs() < 1e-9);
        assert!((cache.get_score("tb_desconhecida", 0.5) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn stale_entries_are_still_served() {
        let cache = QualityCache::new(0.0);
        cache.set(metric("tb_vendas_sot", 80.0));

        // max_stale_hours = 0, so everything is immediately stale.
        assert!(cache.get("tb_vendas_sot").is_some());
    }

    #[test]
    fn batch_set_counts_entries() {
        let cache = QualityCache::new(25.0);
        let n = cache.set_batch(vec![metric("a", 1.0), metric("b", 2.0)]);
        assert_eq!(n, 2);
        assert_eq!(cache.stats().total_cached, 2);
    }
}

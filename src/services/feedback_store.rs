//! Feedback Store
//!
//! Append-only record of decision outcomes plus a TTL'd aggregate cache.
//! The empirical approval rate per `(concept_hash, table_id)` feeds the
//! historical component of the table scorer.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;

use crate::models::{DecisionRecord, FeedbackOutcome, Intent, NewDecisionRecord};

/// Concept hash: 16-hex digest over the salient intent fields. Field order
/// must not matter, so the nonempty parts are lowercased and sorted first.
pub fn concept_hash_from_parts(parts: &[Option<&str>]) -> String {
    let mut fields: Vec<String> = parts
        .iter()
        .filter_map(|p| *p)
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect();
    fields.sort();

    let joined = fields.join("|");
    let digest = Sha256::digest(joined.as_bytes());
    hex::encode(digest)[..16].to_string()
}

pub fn concept_hash_from_intent(intent: &Intent) -> String {
    concept_hash_from_parts(&[
        Some(intent.data_need.as_str()),
        intent.target_entity.as_deref(),
        intent.target_product.as_deref(),
        intent.target_segment.as_deref(),
        intent.granularity.as_deref(),
    ])
}

/// Concept hash used by the workflow side, where only the variable name and
/// type are known.
pub fn concept_hash_for_variable(variable_name: &str, variable_type: &str) -> String {
    concept_hash_from_parts(&[Some(variable_name), Some(variable_type)])
}

#[derive(Clone)]
struct CachedScore {
    score: f64,
    cached_at: DateTime<Utc>,
}

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub struct FeedbackStoreStats {
    pub total_records: i64,
    pub unique_concepts: i64,
    pub unique_pairs: i64,
    pub cache_size: usize,
}

pub struct FeedbackStore {
    pool: SqlitePool,
    score_cache: DashMap<(String, i64), CachedScore>,
    cache_ttl: Duration,
    pub min_samples: i64,
}

impl FeedbackStore {
    pub fn new(pool: SqlitePool, cache_ttl_minutes: i64, min_samples: i64) -> Self {
        Self {
            pool,
            score_cache: DashMap::new(),
            cache_ttl: Duration::minutes(cache_ttl_minutes),
            min_samples,
        }
    }

    /// Record a decision outcome. Idempotent on
    /// `(request_id, table_id, outcome)`: a duplicate returns the existing id
    /// with no aggregate effect.
    pub async fn record_decision(&self, record: NewDecisionRecord) -> Result<i64, sqlx::Error> {
        if record.outcome == FeedbackOutcome::Modified {
            match record.actual_table_id {
                Some(actual) if actual != record.table_id => {},
                _ => {
                    return Err(sqlx::Error::Protocol(
                        "MODIFIED requires a distinct actual_table_id".into(),
                    ));
                },
            }
        }

        let existing: Option<i64> = sqlx::query_scalar(
            r#"SELECT id FROM decision_records
               WHERE request_id = ? AND table_id = ? AND outcome = ?"#,
        )
        .bind(&record.request_id)
        .bind(record.table_id)
        .bind(record.outcome)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(id) = existing {
            tracing::debug!(
                "duplicate decision record for request {} table {}, keeping id {}",
                record.request_id,
                record.table_id,
                id
            );
            return Ok(id);
        }

        let id: i64 = sqlx::query_scalar(
            r#"INSERT INTO decision_records
               (request_id, concept_hash, domain_id, owner_id, table_id, outcome,
                actual_table_id, confidence_at_decision, use_case, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               RETURNING id"#,
        )
        .bind(&record.request_id)
        .bind(&record.concept_hash)
        .bind(&record.domain_id)
        .bind(record.owner_id)
        .bind(record.table_id)
        .bind(record.outcome)
        .bind(record.actual_table_id)
        .bind(record.confidence_at_decision)
        .bind(&record.use_case)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        // A read after a successful record must reflect it.
        self.score_cache
            .remove(&(record.concept_hash.clone(), record.table_id));

        Ok(id)
    }

    /// Historical approval rate for a concept+table pair.
    ///
    /// Returns `(0.5, count)` below `min_samples`, `(approved/total, total)`
    /// otherwise. Cached results return `(score, -1)` as a sentinel.
    pub async fn historical_score(
        &self,
        concept_hash: &str,
        table_id: i64,
        min_samples: i64,
    ) -> Result<(f64, i64), sqlx::Error> {
        let key = (concept_hash.to_string(), table_id);

        if let Some(cached) = self.score_cache.get(&key) {
            if Utc::now() - cached.cached_at < self.cache_ttl {
                return Ok((cached.score, -1));
            }
            drop(cached);
            self.score_cache.remove(&key);
        }

        let (approved, total): (i64, i64) = sqlx::query_as(
            r#"SELECT
                 COALESCE(SUM(CASE WHEN outcome = 'APPROVED' THEN 1 ELSE 0 END), 0),
                 COUNT(*)
               FROM decision_records
               WHERE concept_hash = ? AND table_id = ?"#,
        )
        .bind(concept_hash)
        .bind(table_id)
        .fetch_one(&self.pool)
        .await?;

        if total < min_samples {
            return Ok((0.5, total));
        }

        let score = approved as f64 / total as f64;
        self.score_cache
            .insert(key, CachedScore { score, cached_at: Utc::now() });

        Ok((score, total))
    }

    /// Tables historically approved for a concept, best first
    /// (approval rate, then sample count). Only pairs with ≥ 3 samples.
    pub async fn top_tables_for_concept(
        &self,
        concept_hash: &str,
        limit: i64,
    ) -> Result<Vec<(i64, f64, i64)>, sqlx::Error> {
        let rows: Vec<(i64, f64, i64)> = sqlx::query_as(
            r#"SELECT
                 table_id,
                 CAST(SUM(CASE WHEN outcome = 'APPROVED' THEN 1 ELSE 0 END) AS REAL)
                     / COUNT(*) AS approval_rate,
                 COUNT(*) AS sample_count
               FROM decision_records
               WHERE concept_hash = ?
               GROUP BY table_id
               HAVING COUNT(*) >= 3
               ORDER BY approval_rate DESC, sample_count DESC, table_id ASC
               LIMIT ?"#,
        )
        .bind(concept_hash)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn records_for_request(
        &self,
        request_id: &str,
    ) -> Result<Vec<DecisionRecord>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM decision_records WHERE request_id = ? ORDER BY id")
            .bind(request_id)
            .fetch_all(&self.pool)
            .await
    }

    pub async fn stats(&self) -> Result<FeedbackStoreStats, sqlx::Error> {
        let (total_records, unique_concepts, unique_pairs): (i64, i64, i64) = sqlx::query_as(
            r#"SELECT
                 COUNT(*),
                 COUNT(DISTINCT concept_hash),
                 COUNT(DISTINCT concept_hash || ':' || table_id)
               FROM decision_records"#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(FeedbackStoreStats {
            total_records,
            unique_concepts,
            unique_pairs,
            cache_size: self.score_cache.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    fn record(request_id: &str, table_id: i64, outcome: FeedbackOutcome) -> NewDecisionRecord {
        NewDecisionRecord {
            request_id: request_id.to_string(),
            concept_hash: "abc123".to_string(),
            domain_id: Some("vendas".to_string()),
            owner_id: Some(1),
            table_id,
            outcome,
            actual_table_id: None,
            confidence_at_decision: 0.8,
            use_case: "default".to_string(),
        }
    }

    #[test]
    fn concept_hash_is_order_independent() {
        let a = concept_hash_from_parts(&[Some("Vendas"), Some("cliente"), None]);
        let b = concept_hash_from_parts(&[Some("cliente"), None, Some("vendas")]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn identical_intents_share_a_hash() {
        let mut intent = Intent::fallback("vendas", "q");
        intent.target_product = Some("consignado".into());

        let mut other = Intent::fallback("vendas", "another query entirely");
        other.target_product = Some("Consignado".into());

        assert_eq!(concept_hash_from_intent(&intent), concept_hash_from_intent(&other));
    }

    #[tokio::test]
    async fn neutral_score_below_min_samples() {
        let pool = create_test_pool().await.unwrap();
        let store = FeedbackStore::new(pool, 5, 3);

        store.record_decision(record("r1", 7, FeedbackOutcome::Approved)).await.unwrap();

        let (score, count) = store.historical_score("abc123", 7, 3).await.unwrap();
        assert!((score - 0.5).abs() < 1e-9);
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn empirical_rate_after_min_samples_and_cached_sentinel() {
        let pool = create_test_pool().await.unwrap();
        let store = FeedbackStore::new(pool, 5, 3);

        store.record_decision(record("r1", 7, FeedbackOutcome::Approved)).await.unwrap();
        store.record_decision(record("r2", 7, FeedbackOutcome::Approved)).await.unwrap();
        store.record_decision(record("r3", 7, FeedbackOutcome::Rejected)).await.unwrap();

        let (score, count) = store.historical_score("abc123", 7, 3).await.unwrap();
        assert!((score - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(count, 3);

        let (cached_score, sentinel) = store.historical_score("abc123", 7, 3).await.unwrap();
        assert!((cached_score - score).abs() < 1e-9);
        assert_eq!(sentinel, -1);
    }

    #[tokio::test]
    async fn recording_is_idempotent() {
        let pool = create_test_pool().await.unwrap();
        let store = FeedbackStore::new(pool, 5, 3);

        let first = store.record_decision(record("r1", 7, FeedbackOutcome::Approved)).await.unwrap();
        let second =
            store.record_decision(record("r1", 7, FeedbackOutcome::Approved)).await.unwrap();
        assert_eq!(first, second);

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_records, 1);
    }

    #[tokio::test]
    async fn record_invalidates_the_aggregate_cache() {
        let pool = create_test_pool().await.unwrap();
        let store = FeedbackStore::new(pool, 5, 3);

        for i in 0..3 {
            store
                .record_decision(record(&format!("r{}", i), 7, FeedbackOutcome::Approved))
                .await
                .unwrap();
        }
        let (score, _) = store.historical_score("abc123", 7, 3).await.unwrap();
        assert!((score - 1.0).abs() < 1e-9);

        store.record_decision(record("r9", 7, FeedbackOutcome::Rejected)).await.unwrap();
        let (score, count) = store.historical_score("abc123", 7, 3).await.unwrap();
        assert!((score - 0.75).abs() < 1e-9);
        assert_eq!(count, 4);
    }

    #[tokio::test]
    async fn modified_requires_distinct_actual_table() {
        let pool = create_test_pool().await.unwrap();
        let store = FeedbackStore::new(pool, 5, 3);

        let mut bad = record("r1", 7, FeedbackOutcome::Modified);
        bad.actual_table_id = Some(7);
        assert!(store.record_decision(bad).await.is_err());

        let mut ok = record("r2", 7, FeedbackOutcome::Modified);
        ok.actual_table_id = Some(8);
        assert!(store.record_decision(ok).await.is_ok());
    }

    #[tokio::test]
    async fn top_tables_orders_by_rate_then_count() {
        let pool = create_test_pool().await.unwrap();
        let store = FeedbackStore::new(pool, 5, 3);

        // Table 1: 3 approvals. Table 2: 2 approvals, 2 rejections.
        for i in 0..3 {
            store
                .record_decision(record(&format!("a{}", i), 1, FeedbackOutcome::Approved))
                .await
                .unwrap();
        }
        for i in 0..2 {
            store
                .record_decision(record(&format!("b{}", i), 2, FeedbackOutcome::Approved))
                .await
                .unwrap();
        }
        for i in 0..2 {
            store
                .record_decision(record(&format!("c{}", i), 2, FeedbackOutcome::Rejected))
                .await
                .unwrap();
        }

        let top = store.top_tables_for_concept("abc123", 5).await.unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].0, 1);
        assert!((top[0].1 - 1.0).abs() < 1e-9);
        assert_eq!(top[1].0, 2);
        assert!((top[1].1 - 0.5).abs() < 1e-9);
    }
}

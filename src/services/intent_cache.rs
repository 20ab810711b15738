//! Intent Cache
//!
//! Bounded LRU of normalized intents, keyed by a normalization hash so
//! queries differing only in case, punctuation, stopwords or word order share
//! one entry. Suppresses most language-model calls.

use chrono::{DateTime, Duration, Utc};
use lru::LruCache;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::models::Intent;
use crate::utils::text::normalize_for_cache;

/// Deterministic cache key: normalized query + variable name + sorted context
/// pairs, hashed to the first 32 hex chars of SHA-256.
pub fn generate_cache_key(
    raw_query: &str,
    variable_name: Option<&str>,
    context: Option<&BTreeMap<String, String>>,
) -> String {
    let mut parts: Vec<String> = Vec::new();

    if !raw_query.is_empty() {
        parts.push(normalize_for_cache(raw_query));
    }
    if let Some(name) = variable_name {
        parts.push(normalize_for_cache(name));
    }
    if let Some(context) = context {
        // BTreeMap iteration is already sorted by key.
        for (key, value) in context {
            if !value.is_empty() {
                parts.push(format!("{}:{}", key, normalize_for_cache(value)));
            }
        }
    }

    let combined = parts.join("|");
    let digest = Sha256::digest(combined.as_bytes());
    hex::encode(digest)[..32].to_string()
}

struct CacheEntry {
    intent: Intent,
    created_at: DateTime<Utc>,
    ttl_days: i64,
}

impl CacheEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.created_at + Duration::days(self.ttl_days)
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct IntentCacheStats {
    pub size: usize,
    pub max_size: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

/// LRU intent cache with TTL. Expiry is checked on read; an eviction on read
/// counts as a miss.
pub struct IntentCache {
    cache: Mutex<LruCache<String, Arc<CacheEntry>>>,
    max_size: usize,
    ttl_days: i64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl IntentCache {
    pub fn new(max_size: usize, ttl_days: i64) -> Self {
        let capacity = NonZeroUsize::new(max_size.max(1)).expect("max(1) is non-zero");
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
            max_size,
            ttl_days,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Get a cached intent if present and not expired.
    pub fn get(&self, cache_key: &str) -> Option<Intent> {
        let mut cache = self
            .cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let entry = match cache.get(cache_key) {
            Some(entry) => Arc::clone(entry),
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            },
        };

        if entry.is_expired(Utc::now()) {
            cache.pop(cache_key);
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        self.hits.fetch_add(1, Ordering::Relaxed);
        Some(entry.intent.clone())
    }

    /// Cache an intent under its key plus synonym-expanded variant keys, all
    /// pointing at the same entry.
    pub fn set(&self, cache_key: &str, intent: Intent, variant_queries: &[String]) {
        let entry = Arc::new(CacheEntry {
            intent,
            created_at: Utc::now(),
            ttl_days: self.ttl_days,
        });

        let mut cache = self
            .cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        cache.put(cache_key.to_string(), Arc::clone(&entry));

        for variant in variant_queries {
            let variant_key = generate_cache_key(variant, None, None);
            if variant_key != cache_key {
                cache.put(variant_key, Arc::clone(&entry));
            }
        }
    }

    pub fn invalidate(&self, cache_key: &str) {
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop(cache_key);
    }

    pub fn clear(&self) {
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 { 0.0 } else { hits as f64 / total as f64 }
    }

    pub fn stats(&self) -> IntentCacheStats {
        let size = self
            .cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len();
        IntentCacheStats {
            size,
            max_size: self.max_size,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            hit_rate: self.hit_rate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intent(query: &str) -> Intent {
        Intent::fallback("vendas", query)
    }

    #[test]
    fn cache_key_is_invariant_to_case_stopwords_and_order() {
        let a = generate_cache_key("Vendas mensais do Consignado", None, None);
        let b = generate_cache_key("consignado VENDAS   mensais!", None, None);
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn cache_key_includes_sorted_context() {
        let mut ctx1 = BTreeMap::new();
        ctx1.insert("produto".to_string(), "consignado".to_string());
        ctx1.insert("segmento".to_string(), "varejo".to_string());

        let mut ctx2 = BTreeMap::new();
        ctx2.insert("segmento".to_string(), "varejo".to_string());
        ctx2.insert("produto".to_string(), "consignado".to_string());

        let a = generate_cache_key("vendas", None, Some(&ctx1));
        let b = generate_cache_key("vendas", None, Some(&ctx2));
        assert_eq!(a, b);

        let without = generate_cache_key("vendas", None, None);
        assert_ne!(a, without);
    }

    #[test]
    fn hit_miss_accounting() {
        let cache = IntentCache::new(10, 7);
        let key = generate_cache_key("vendas mensais", None, None);

        assert!(cache.get(&key).is_none());
        cache.set(&key, intent("vendas mensais"), &[]);
        assert!(cache.get(&key).is_some());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 0.5).abs() < 1e-9);
    }

    #[test]
    fn variants_share_the_entry() {
        let cache = IntentCache::new(10, 7);
        let key = generate_cache_key("vendas mensais", None, None);

        cache.set(
            &key,
            intent("vendas mensais"),
            &["faturamento mensais".to_string()],
        );

        let variant_key = generate_cache_key("faturamento mensais", None, None);
        assert!(cache.get(&variant_key).is_some());
    }

    #[test]
    fn eviction_respects_capacity() {
        let cache = IntentCache::new(2, 7);
        cache.set("k1", intent("a"), &[]);
        cache.set("k2", intent("b"), &[]);
        cache.set("k3", intent("c"), &[]);

        assert!(cache.stats().size <= 2);
        assert!(cache.get("k1").is_none());
    }
}

//! Metrics Collector
//!
//! Per-request metrics in a bounded circular buffer, monotonic counters, and
//! latency percentiles over a bounded sample window. Aggregation re-computes
//! from the buffer filtered by timestamp, so hourly/daily views stay correct
//! after restarts of the exporter.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::Mutex;
use utoipa::ToSchema;

pub const AGENT_NAME: &str = "table-search-agent";
pub const AGENT_VERSION: &str = "1.0.0";

const MAX_LATENCY_SAMPLES: usize = 1000;

// Counter keys
const SEARCH_REQUEST: &str = "search_request";
const SEARCH_HIT: &str = "search_hit";
const SEARCH_MISS: &str = "search_miss";
const FEEDBACK_APPROVED: &str = "feedback_approved";
const FEEDBACK_REJECTED: &str = "feedback_rejected";
const FEEDBACK_MODIFIED: &str = "feedback_modified";
const FALSE_POSITIVE: &str = "false_positive";
const AMBIGUITY_DETECTED: &str = "ambiguity_detected";
const RERANK_ACTIVATED: &str = "rerank_activated";
const RERANK_SKIPPED: &str = "rerank_skipped";
const CACHE_HIT: &str = "cache_hit";
const CACHE_MISS: &str = "cache_miss";
const LLM_CALL: &str = "llm_call";
const ERROR: &str = "error";
const TIMEOUT: &str = "timeout";

/// Metrics for a single retrieval request.
#[derive(Debug, Clone)]
pub struct RequestMetrics {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,

    pub total_latency_ms: i64,
    pub intent_latency_ms: i64,
    pub search_latency_ms: i64,
    pub rerank_latency_ms: i64,

    pub tables_found: usize,
    pub columns_found: usize,
    pub top_score: f64,

    /// HIT, MISS or AMBIGUOUS
    pub outcome: Option<String>,
    pub ambiguity_type: Option<String>,
    pub llm_reranked: bool,

    pub semantic_score: f64,
    pub historical_score: f64,
    pub certification_score: f64,
    pub freshness_score: f64,
    pub quality_score: f64,

    pub use_case: String,
    pub domain: Option<String>,
    pub has_product_context: bool,

    pub intent_cache_hit: bool,
    pub quality_cache_hit: bool,
}

/// Aggregated metrics for a time window.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AggregatedMetrics {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub period_type: String,

    pub total_requests: usize,
    pub successful_requests: usize,
    pub hit_rate_top1: f64,
    pub ambiguity_rate: f64,

    pub avg_latency_ms: f64,
    pub p50_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub p99_latency_ms: f64,

    pub rerank_activation_rate: f64,
    pub intent_cache_hit_rate: f64,
}

/// Current point-in-time statistics.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CurrentStats {
    pub uptime_seconds: f64,
    pub total_requests: u64,
    pub hit_rate: f64,
    pub ambiguity_rate: f64,
    pub false_positive_rate: f64,
    pub feedback_count: u64,
    pub approval_rate: f64,
    pub avg_latency_ms: f64,
    pub p50_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub p99_latency_ms: f64,
    pub llm_calls_total: u64,
    pub rerank_activation_rate: f64,
    pub cache_hit_rate: f64,
    pub error_count: u64,
}

pub struct MetricsCollector {
    requests: Mutex<VecDeque<RequestMetrics>>,
    max_requests: usize,
    counters: DashMap<String, u64>,
    latencies: Mutex<VecDeque<i64>>,
    started_at: DateTime<Utc>,
}

impl MetricsCollector {
    pub fn new(max_requests: usize) -> Self {
        Self {
            requests: Mutex::new(VecDeque::with_capacity(max_requests.min(1024))),
            max_requests,
            counters: DashMap::new(),
            latencies: Mutex::new(VecDeque::with_capacity(MAX_LATENCY_SAMPLES)),
            started_at: Utc::now(),
        }
    }

    fn bump(&self, key: &str) {
        *self.counters.entry(key.to_string()).or_insert(0) += 1;
    }

    fn counter(&self, key: &str) -> u64 {
        self.counters.get(key).map(|v| *v).unwrap_or(0)
    }

    pub fn record_request(&self, metrics: RequestMetrics) {
        self.bump(SEARCH_REQUEST);

        match metrics.outcome.as_deref() {
            Some("HIT") => self.bump(SEARCH_HIT),
            Some("MISS") => self.bump(SEARCH_MISS),
            _ => {},
        }

        if metrics
            .ambiguity_type
            .as_deref()
            .is_some_and(|t| t != "NONE")
        {
            self.bump(AMBIGUITY_DETECTED);
        }

        if metrics.llm_reranked {
            self.bump(RERANK_ACTIVATED);
        } else {
            self.bump(RERANK_SKIPPED);
        }

        if metrics.intent_cache_hit {
            self.bump(CACHE_HIT);
        } else {
            self.bump(CACHE_MISS);
        }

        {
            let mut latencies = self
                .latencies
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if latencies.len() >= MAX_LATENCY_SAMPLES {
                latencies.pop_front();
            }
            latencies.push_back(metrics.total_latency_ms);
        }

        let mut requests = self
            .requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if requests.len() >= self.max_requests {
            requests.pop_front();
        }
        requests.push_back(metrics);
    }

    /// Record a feedback event. A rejection with a high score at decision
    /// time counts as a false positive.
    pub fn record_feedback(&self, outcome: &str, _table_id: i64, score_at_decision: f64) {
        match outcome {
            "APPROVED" => self.bump(FEEDBACK_APPROVED),
            "REJECTED" => {
                self.bump(FEEDBACK_REJECTED);
                if score_at_decision > 0.7 {
                    self.bump(FALSE_POSITIVE);
                }
            },
            _ => self.bump(FEEDBACK_MODIFIED),
        }
    }

    pub fn record_error(&self, error_type: &str) {
        self.bump(ERROR);
        self.bump(&format!("error_{}", error_type));
    }

    pub fn record_timeout(&self) {
        self.bump(TIMEOUT);
    }

    pub fn record_llm_call(&self, call_type: &str) {
        self.bump(LLM_CALL);
        self.bump(&format!("llm_{}", call_type));
    }

    fn percentiles(&self) -> (f64, f64, f64) {
        let latencies = self
            .latencies
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        percentiles_of(latencies.iter().copied())
    }

    pub fn current_stats(&self) -> CurrentStats {
        let total_requests = self.counter(SEARCH_REQUEST);
        let hits = self.counter(SEARCH_HIT);
        let approved = self.counter(FEEDBACK_APPROVED);
        let rejected = self.counter(FEEDBACK_REJECTED);
        let cache_hits = self.counter(CACHE_HIT);
        let cache_misses = self.counter(CACHE_MISS);

        let (p50, p95, p99) = self.percentiles();
        let avg = {
            let latencies = self
                .latencies
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if latencies.is_empty() {
                0.0
            } else {
                latencies.iter().sum::<i64>() as f64 / latencies.len() as f64
            }
        };

        let ratio = |num: u64, den: u64| if den == 0 { 0.0 } else { num as f64 / den as f64 };

        CurrentStats {
            uptime_seconds: (Utc::now() - self.started_at).num_milliseconds() as f64 / 1000.0,
            total_requests,
            hit_rate: ratio(hits, total_requests),
            ambiguity_rate: ratio(self.counter(AMBIGUITY_DETECTED), total_requests),
            false_positive_rate: ratio(self.counter(FALSE_POSITIVE), rejected),
            feedback_count: approved + rejected,
            approval_rate: ratio(approved, approved + rejected),
            avg_latency_ms: avg,
            p50_latency_ms: p50,
            p95_latency_ms: p95,
            p99_latency_ms: p99,
            llm_calls_total: self.counter(LLM_CALL),
            rerank_activation_rate: ratio(self.counter(RERANK_ACTIVATED), total_requests),
            cache_hit_rate: ratio(cache_hits, cache_hits + cache_misses),
            error_count: self.counter(ERROR),
        }
    }

    pub fn aggregate_hourly(&self) -> AggregatedMetrics {
        let now = Utc::now();
        self.aggregate_window(now - Duration::hours(1), now, "hour")
    }

    pub fn aggregate_daily(&self) -> AggregatedMetrics {
        let now = Utc::now();
        self.aggregate_window(now - Duration::days(1), now, "day")
    }

    fn aggregate_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        period_type: &str,
    ) -> AggregatedMetrics {
        let requests = self
            .requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let window: Vec<&RequestMetrics> =
            requests.iter().filter(|r| r.timestamp >= start).collect();

        if window.is_empty() {
            return AggregatedMetrics {
                period_start: start,
                period_end: end,
                period_type: period_type.to_string(),
                total_requests: 0,
                successful_requests: 0,
                hit_rate_top1: 0.0,
                ambiguity_rate: 0.0,
                avg_latency_ms: 0.0,
                p50_latency_ms: 0.0,
                p95_latency_ms: 0.0,
                p99_latency_ms: 0.0,
                rerank_activation_rate: 0.0,
                intent_cache_hit_rate: 0.0,
            };
        }

        let total = window.len();
        let hits = window
            .iter()
            .filter(|r| r.outcome.as_deref() == Some("HIT"))
            .count();
        let ambiguous = window
            .iter()
            .filter(|r| r.ambiguity_type.as_deref().is_some_and(|t| t != "NONE"))
            .count();
        let reranked = window.iter().filter(|r| r.llm_reranked).count();
        let cache_hits = window.iter().filter(|r| r.intent_cache_hit).count();

        let (p50, p95, p99) = percentiles_of(window.iter().map(|r| r.total_latency_ms));
        let avg =
            window.iter().map(|r| r.total_latency_ms).sum::<i64>() as f64 / total as f64;

        AggregatedMetrics {
            period_start: start,
            period_end: end,
            period_type: period_type.to_string(),
            total_requests: total,
            successful_requests: hits,
            hit_rate_top1: hits as f64 / total as f64,
            ambiguity_rate: ambiguous as f64 / total as f64,
            avg_latency_ms: avg,
            p50_latency_ms: p50,
            p95_latency_ms: p95,
            p99_latency_ms: p99,
            rerank_activation_rate: reranked as f64 / total as f64,
            intent_cache_hit_rate: cache_hits as f64 / total as f64,
        }
    }

    /// Payload handed to the exporter.
    pub fn export_payload(&self) -> Value {
        let stats = self.current_stats();
        let hourly = self.aggregate_hourly();

        json!({
            "timestamp": Utc::now().to_rfc3339(),
            "agent_version": AGENT_VERSION,
            "current": stats,
            "hourly": {
                "total_requests": hourly.total_requests,
                "hit_rate": hourly.hit_rate_top1,
                "ambiguity_rate": hourly.ambiguity_rate,
                "p50_latency_ms": hourly.p50_latency_ms,
                "p95_latency_ms": hourly.p95_latency_ms,
                "rerank_rate": hourly.rerank_activation_rate,
                "cache_hit_rate": hourly.intent_cache_hit_rate,
            },
        })
    }
}

fn percentiles_of(samples: impl Iterator<Item = i64>) -> (f64, f64, f64) {
    let mut sorted: Vec<i64> = samples.collect();
    if sorted.is_empty() {
        return (0.0, 0.0, 0.0);
    }
    sorted.sort_unstable();
    let n = sorted.len();

    let p50 = sorted[(n as f64 * 0.50) as usize % n] as f64;
    let p95 = sorted[(n as f64 * 0.95) as usize % n] as f64;
    let p99 = sorted[((n as f64 * 0.99) as usize).min(n - 1)] as f64;
    (p50, p95, p99)
}

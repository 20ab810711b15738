//! Health Checker
//!
//! Aggregates component statuses into healthy / degraded / unhealthy.
//! Unhealthy: model unavailable, retriever down, error rate > 10%,
//! p95 > 5000ms. Degraded: error rate 5–10%, p95 2000–5000ms, quality cache
//! older than 48h, exporter idle.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use super::exporter::DataMeshExporter;
use super::llm::LanguageModel;
use super::metrics_collector::MetricsCollector;
use super::quality::QualityCache;
use super::retriever::Retriever;

const QUALITY_STALE_HOURS: f64 = 48.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ServiceHealth {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: f64,
    pub timestamp: DateTime<Utc>,
    pub components: Vec<ComponentHealth>,
}

pub struct HealthChecker {
    llm: Arc<dyn LanguageModel>,
    retriever: Arc<dyn Retriever>,
    quality: Arc<QualityCache>,
    exporter: Arc<DataMeshExporter>,
    metrics: Arc<MetricsCollector>,
    started_at: DateTime<Utc>,
}

impl HealthChecker {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        retriever: Arc<dyn Retriever>,
        quality: Arc<QualityCache>,
        exporter: Arc<DataMeshExporter>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self { llm, retriever, quality, exporter, metrics, started_at: Utc::now() }
    }

    pub async fn check_all(&self) -> ServiceHealth {
        let components = vec![
            self.check_llm(),
            self.check_retriever().await,
            self.check_quality_cache(),
            self.check_exporter(),
            self.check_error_rate(),
            self.check_latency(),
        ];

        let status = if components.iter().any(|c| c.status == HealthStatus::Unhealthy) {
            HealthStatus::Unhealthy
        } else if components.iter().any(|c| c.status == HealthStatus::Degraded) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        ServiceHealth {
            status,
            version: super::metrics_collector::AGENT_VERSION.to_string(),
            uptime_seconds: (Utc::now() - self.started_at).num_milliseconds() as f64 / 1000.0,
            timestamp: Utc::now(),
            components,
        }
    }

    fn check_llm(&self) -> ComponentHealth {
        if self.llm.is_available() {
            ComponentHealth {
                name: "llm".to_string(),
                status: HealthStatus::Healthy,
                message: "Model configured".to_string(),
            }
        } else {
            ComponentHealth {
                name: "llm".to_string(),
                status: HealthStatus::Unhealthy,
                message: "Language model not configured".to_string(),
            }
        }
    }

    async fn check_retriever(&self) -> ComponentHealth {
        // A cheap probe query; any response (even empty) means reachable.
        match self.retriever.search("healthcheck", None, 1).await {
            Ok(_) => ComponentHealth {
                name: "vector_db".to_string(),
                status: HealthStatus::Healthy,
                message: "Retriever reachable".to_string(),
            },
            Err(e) => ComponentHealth {
                name: "vector_db".to_string(),
                status: HealthStatus::Unhealthy,
                message: e.to_string(),
            },
        }
    }

    fn check_quality_cache(&self) -> ComponentHealth {
        let name = "quality_cache".to_string();
        match self.quality.last_sync() {
            None => ComponentHealth {
                name,
                status: HealthStatus::Degraded,
                message: "Never synced".to_string(),
            },
            Some(last_sync) => {
                let age_hours = (Utc::now() - last_sync).num_seconds() as f64 / 3600.0;
                let status = if age_hours > QUALITY_STALE_HOURS {
                    HealthStatus::Degraded
                } else {
                    HealthStatus::Healthy
                };
                ComponentHealth {
                    name,
                    status,
                    message: format!("Last sync {:.1} hours ago", age_hours),
                }
            },
        }
    }

    fn check_exporter(&self) -> ComponentHealth {
        let status = self.exporter.status();
        if !status.enabled {
            return ComponentHealth {
                name: "datamesh_exporter".to_string(),
                status: HealthStatus::Degraded,
                message: "Not running".to_string(),
            };
        }
        ComponentHealth {
            name: "datamesh_exporter".to_string(),
            status: HealthStatus::Healthy,
            message: format!("Running ({})", status.method),
        }
    }

    fn check_error_rate(&self) -> ComponentHealth {
        let stats = self.metrics.current_stats();
        let name = "error_rate".to_string();

        if stats.total_requests == 0 {
            return ComponentHealth {
                name,
                status: HealthStatus::Healthy,
                message: "No requests yet".to_string(),
            };
        }

        let rate = stats.error_count as f64 / stats.total_requests as f64;
        let status = if rate > 0.1 {
            HealthStatus::Unhealthy
        } else if rate > 0.05 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        ComponentHealth { name, status, message: format!("Error rate {:.1}%", rate * 100.0) }
    }

    fn check_latency(&self) -> ComponentHealth {
        let stats = self.metrics.current_stats();
        let name = "latency".to_string();
        let p95 = stats.p95_latency_ms;

        if p95 == 0.0 {
            return ComponentHealth {
                name,
                status: HealthStatus::Healthy,
                message: "No requests yet".to_string(),
            };
        }

        let status = if p95 > 5000.0 {
            HealthStatus::Unhealthy
        } else if p95 > 2000.0 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        ComponentHealth { name, status, message: format!("p95: {:.0}ms", p95) }
    }
}

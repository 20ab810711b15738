//! Faro Library
//!
//! This library contains all the core modules for the Faro data-catalog
//! search and validation service.

use sqlx::SqlitePool;
use std::sync::Arc;

pub mod config;
pub mod db;
pub mod handlers;
pub mod models;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use services::{
    CatalogService, DataMeshExporter, FeedbackStore, HealthChecker, IntentCache,
    IntentNormalizer, InvolvementService, MetricsCollector, QualityCache, QualitySyncTask,
    SearchService, SynonymDictionary, WorkflowService,
};

#[cfg(test)]
mod tests;

/// Application shared state
///
/// Design Philosophy: Keep it simple - Rust's type system IS our DI container.
/// All services are wrapped in Arc for cheap cloning and thread safety; the
/// background schedulers hold the same references.
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,

    pub search_service: Arc<SearchService>,
    pub intent_cache: Arc<IntentCache>,
    pub synonyms: Arc<SynonymDictionary>,
    pub feedback_store: Arc<FeedbackStore>,

    pub quality_cache: Arc<QualityCache>,
    pub quality_sync: Arc<QualitySyncTask>,

    pub metrics: Arc<MetricsCollector>,
    pub exporter: Arc<DataMeshExporter>,
    pub health: Arc<HealthChecker>,

    pub workflow: Arc<WorkflowService>,
    pub involvements: Arc<InvolvementService>,
    pub catalog_service: Arc<CatalogService>,
}

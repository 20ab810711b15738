pub mod catalog_service;
pub mod exporter;
pub mod feedback_store;
pub mod health;
pub mod intent_cache;
pub mod intent_service;
pub mod involvement_service;
pub mod llm;
pub mod metrics_collector;
pub mod notifier;
pub mod quality;
pub mod retriever;
pub mod search;
pub mod synonyms;
pub mod workflow_service;

pub use catalog_service::{CatalogService, CatalogSyncRequest, CatalogSyncResponse};
pub use exporter::{DataMeshExporter, ExporterStatus};
pub use feedback_store::{
    FeedbackStore, FeedbackStoreStats, concept_hash_for_variable, concept_hash_from_intent,
    concept_hash_from_parts,
};
pub use health::{ComponentHealth, HealthChecker, HealthStatus, ServiceHealth};
pub use intent_cache::{IntentCache, IntentCacheStats, generate_cache_key};
pub use intent_service::{IntentNormalizer, NormalizedIntent};
pub use involvement_service::{
    CompleteInvolvementInput, CreateInvolvementInput, InvolvementFilter, InvolvementService,
    InvolvementSweepTask, SetExpectedDateInput,
};
pub use llm::{ChatCompletionClient, LanguageModel, LlmError, LlmSettings, ScriptedModel};
pub use metrics_collector::{AggregatedMetrics, CurrentStats, MetricsCollector, RequestMetrics};
pub use notifier::{DbNotifier, Notifier};
pub use quality::{
    HttpQualitySource, MockQualitySource, QualityCache, QualitySource, QualitySyncTask,
};
pub use retriever::{HttpRetriever, MemoryRetriever, Retriever};
pub use search::{SearchInput, SearchMode, SearchOutcome, SearchService};
pub use synonyms::SynonymDictionary;
pub use workflow_service::{
    OwnerResponseInput, PendingOwnerItem, RequesterResponseInput, WorkflowService,
};

//! Quality metric cache with proactive sync from the corporate quality source.

mod cache;
mod source;
mod sync;

pub use cache::{CachedQualityMetric, QualityCache, QualityCacheStats};
pub use source::{HttpQualitySource, MockQualitySource, QualitySource, QualitySourceError,
    TableQualityMetric};
pub use sync::{QualitySyncTask, SyncResult};

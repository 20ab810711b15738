use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub search: SearchConfig,
    pub quality: QualityConfig,
    pub metrics_export: MetricsExportConfig,
    pub feedback: FeedbackConfig,
    pub llm: LlmConfig,
    pub retriever: RetrieverConfig,
    pub synonyms: SynonymsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Per-request deadline for the retrieval pipeline, in milliseconds.
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

/// Retrieval pipeline tuning knobs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub intent_cache_size: usize,
    pub intent_cache_ttl_days: i64,
    pub score_tie_threshold: f64,
    pub minimum_confidence: f64,
    pub high_confidence: f64,
    pub rerank_spread_threshold: f64,
    pub rerank_max_candidates: usize,
    pub action_use_table_threshold: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Hour of day (UTC) for the daily incremental sync.
    pub sync_hour: u32,
    pub check_interval_hours: u64,
    pub max_stale_hours: f64,
    /// Base URL of the quality source; empty uses the built-in mock.
    pub source_url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsExportConfig {
    pub enabled: bool,
    /// "object_store", "stream" or "http"
    pub method: String,
    pub interval_minutes: u64,
    pub batch_size: usize,
    pub max_events: usize,
    pub object_store_endpoint: String,
    pub object_store_bucket: String,
    pub object_store_prefix: String,
    pub stream_endpoint: String,
    pub stream_name: String,
    pub http_endpoint: String,
    pub http_api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    pub cache_ttl_minutes: i64,
    pub min_samples: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub enabled: bool,
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    pub timeout_seconds: u64,
    pub temperature: f64,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrieverConfig {
    /// Base URL of the vector search service; empty uses the in-memory index.
    pub url: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SynonymsConfig {
    /// Optional YAML overlay with `term: [synonym, ...]` entries.
    pub file: Option<String>,
    /// Where learned synonyms are persisted.
    pub learned_file: Option<String>,
}

/// Command line arguments for configuration overrides
#[derive(Parser, Debug, Clone)]
#[command(name = "faro")]
#[command(version, about = "Faro - Data Catalog Search & Validation Service")]
pub struct CommandLineArgs {
    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Server host (overrides config file)
    #[arg(long, value_name = "HOST")]
    pub server_host: Option<String>,

    /// Server port (overrides config file)
    #[arg(long, value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Database URL (overrides config file)
    #[arg(long, value_name = "URL")]
    pub database_url: Option<String>,

    /// Logging level (overrides config file, e.g., "info,faro=debug")
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// LLM API base URL (overrides config file)
    #[arg(long, value_name = "URL")]
    pub llm_api_base: Option<String>,

    /// Vector retriever URL (overrides config file)
    #[arg(long, value_name = "URL")]
    pub retriever_url: Option<String>,

    /// Enable/disable the metrics exporter (overrides config file)
    #[arg(long, value_name = "BOOL")]
    pub metrics_export_enabled: Option<bool>,
}

impl Config {
    /// Load configuration with command line, environment variable, and file support
    ///
    /// Loading order (priority from highest to lowest):
    /// 1. Command line arguments
    /// 2. Environment variables (prefixed with FARO_)
    /// 3. Configuration file (config.toml)
    /// 4. Default values
    pub fn load() -> Result<Self, anyhow::Error> {
        let cli_args = CommandLineArgs::parse();
        Self::load_with_args(&cli_args)
    }

    pub fn load_with_args(cli_args: &CommandLineArgs) -> Result<Self, anyhow::Error> {
        let config_path = cli_args.config.clone().or_else(Self::find_config_file);
        let mut config = if let Some(config_path) = config_path {
            Self::from_toml(&config_path)?
        } else {
            tracing::warn!("Configuration file not found, using defaults");
            Config::default()
        };

        config.apply_env_overrides();
        config.apply_cli_overrides(cli_args);
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - FARO_SERVER_HOST, FARO_SERVER_PORT
    /// - FARO_DATABASE_URL
    /// - FARO_LOG_LEVEL
    /// - FARO_LLM_API_BASE, FARO_LLM_API_KEY, FARO_LLM_MODEL
    /// - FARO_RETRIEVER_URL
    /// - FARO_QUALITY_SOURCE_URL
    /// - FARO_EXPORT_METHOD, FARO_EXPORT_HTTP_ENDPOINT, FARO_EXPORT_HTTP_API_KEY
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("FARO_SERVER_HOST") {
            self.server.host = host;
            tracing::info!("Override server.host from env: {}", self.server.host);
        }

        if let Ok(port) = std::env::var("FARO_SERVER_PORT")
            && let Ok(port) = port.parse()
        {
            self.server.port = port;
            tracing::info!("Override server.port from env: {}", self.server.port);
        }

        if let Ok(db_url) = std::env::var("FARO_DATABASE_URL") {
            self.database.url = db_url;
            tracing::info!("Override database.url from env");
        }

        if let Ok(level) = std::env::var("FARO_LOG_LEVEL") {
            self.logging.level = level;
            tracing::info!("Override logging.level from env: {}", self.logging.level);
        }

        if let Ok(base) = std::env::var("FARO_LLM_API_BASE") {
            self.llm.api_base = base;
            tracing::info!("Override llm.api_base from env");
        }

        if let Ok(key) = std::env::var("FARO_LLM_API_KEY") {
            self.llm.api_key = key;
            tracing::info!("Override llm.api_key from env");
        }

        if let Ok(model) = std::env::var("FARO_LLM_MODEL") {
            self.llm.model = model;
            tracing::info!("Override llm.model from env: {}", self.llm.model);
        }

        if let Ok(url) = std::env::var("FARO_RETRIEVER_URL") {
            self.retriever.url = url;
            tracing::info!("Override retriever.url from env");
        }

        if let Ok(url) = std::env::var("FARO_QUALITY_SOURCE_URL") {
            self.quality.source_url = url;
            tracing::info!("Override quality.source_url from env");
        }

        if let Ok(method) = std::env::var("FARO_EXPORT_METHOD") {
            self.metrics_export.method = method;
            tracing::info!("Override metrics_export.method from env");
        }

        if let Ok(endpoint) = std::env::var("FARO_EXPORT_HTTP_ENDPOINT") {
            self.metrics_export.http_endpoint = endpoint;
        }

        if let Ok(key) = std::env::var("FARO_EXPORT_HTTP_API_KEY") {
            self.metrics_export.http_api_key = key;
        }
    }

    /// Apply command line argument overrides (highest priority)
    fn apply_cli_overrides(&mut self, args: &CommandLineArgs) {
        if let Some(host) = &args.server_host {
            self.server.host = host.clone();
            tracing::info!("Override server.host from CLI: {}", self.server.host);
        }

        if let Some(port) = args.server_port {
            self.server.port = port;
            tracing::info!("Override server.port from CLI: {}", self.server.port);
        }

        if let Some(db_url) = &args.database_url {
            self.database.url = db_url.clone();
            tracing::info!("Override database.url from CLI");
        }

        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
            tracing::info!("Override logging.level from CLI: {}", self.logging.level);
        }

        if let Some(base) = &args.llm_api_base {
            self.llm.api_base = base.clone();
            tracing::info!("Override llm.api_base from CLI");
        }

        if let Some(url) = &args.retriever_url {
            self.retriever.url = url.clone();
            tracing::info!("Override retriever.url from CLI");
        }

        if let Some(enabled) = args.metrics_export_enabled {
            self.metrics_export.enabled = enabled;
            tracing::info!("Override metrics_export.enabled from CLI: {}", enabled);
        }
    }

    /// Validate configuration
    fn validate(&self) -> Result<(), anyhow::Error> {
        if self.server.port == 0 {
            anyhow::bail!("Server port cannot be 0");
        }

        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.quality.sync_hour > 23 {
            anyhow::bail!("quality.sync_hour must be in 0..=23");
        }

        if self.search.score_tie_threshold <= 0.0 || self.search.score_tie_threshold >= 1.0 {
            anyhow::bail!("search.score_tie_threshold must be in (0, 1)");
        }

        if self.search.minimum_confidence >= self.search.high_confidence {
            anyhow::bail!("search.minimum_confidence must be below search.high_confidence");
        }

        if self.metrics_export.interval_minutes == 0 {
            anyhow::bail!("metrics_export.interval_minutes must be > 0");
        }

        if self.metrics_export.batch_size == 0 {
            anyhow::bail!("metrics_export.batch_size must be > 0");
        }

        match self.metrics_export.method.as_str() {
            "object_store" | "stream" | "http" => {},
            other => anyhow::bail!("metrics_export.method '{}' is not supported", other),
        }

        if self.llm.enabled && self.llm.api_base.is_empty() {
            anyhow::bail!("llm.api_base is required when llm.enabled is true");
        }

        Ok(())
    }

    fn find_config_file() -> Option<String> {
        let possible_paths =
            ["conf/config.toml", "config.toml", "./conf/config.toml", "./config.toml"];

        for path in &possible_paths {
            if Path::new(path).exists() {
                return Some(path.to_string());
            }
        }
        None
    }

    fn from_toml(path: &str) -> Result<Self, anyhow::Error> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 8080, request_timeout_ms: 15_000 }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: "sqlite://data/faro.db".to_string() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info,faro=debug".to_string(),
            file: Some("logs/faro.log".to_string()),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            intent_cache_size: 10_000,
            intent_cache_ttl_days: 7,
            score_tie_threshold: 0.05,
            minimum_confidence: 0.40,
            high_confidence: 0.75,
            rerank_spread_threshold: 0.15,
            rerank_max_candidates: 10,
            action_use_table_threshold: 0.70,
        }
    }
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            sync_hour: 6,
            check_interval_hours: 1,
            max_stale_hours: 25.0,
            source_url: String::new(),
        }
    }
}

impl Default for MetricsExportConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            method: "object_store".to_string(),
            interval_minutes: 5,
            batch_size: 100,
            max_events: 10_000,
            object_store_endpoint: String::new(),
            object_store_bucket: "datamesh-metrics".to_string(),
            object_store_prefix: "agents/table-search/".to_string(),
            stream_endpoint: String::new(),
            stream_name: "agent-metrics".to_string(),
            http_endpoint: String::new(),
            http_api_key: String::new(),
        }
    }
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self { cache_ttl_minutes: 5, min_samples: 3 }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_base: String::new(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            timeout_seconds: 30,
            temperature: 0.0,
            max_tokens: 800,
        }
    }
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self { url: String::new(), timeout_seconds: 10 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.search.intent_cache_size, 10_000);
        assert_eq!(config.feedback.min_samples, 3);
        assert_eq!(config.quality.sync_hour, 6);
    }

    #[test]
    fn rejects_bad_export_method() {
        let mut config = Config::default();
        config.metrics_export.method = "carrier-pigeon".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_inverted_confidence_bounds() {
        let mut config = Config::default();
        config.search.minimum_confidence = 0.9;
        assert!(config.validate().is_err());
    }
}

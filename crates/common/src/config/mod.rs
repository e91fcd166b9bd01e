//! Configuration management for Recall services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default, config/{env}, config/local)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Embedding provider configuration
    pub embedding: EmbeddingConfig,

    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Retrieval tuning knobs
    pub retrieval: RetrievalConfig,

    /// Ranker weights and tables
    pub ranker: RankerWeightsConfig,

    /// CORS / frontend identity
    pub cors: CorsConfig,

    /// Observability configuration
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Database URL
    pub url: String,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: openai-compatible HTTP, or "mock"
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API key for the embedding service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model selector (EMBEDDING_MODEL)
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Vector width (EMBEDDING_DIMENSIONS)
    #[serde(default = "default_embedding_dimensions")]
    pub dimensions: usize,

    /// Documents pulled per pipeline batch (EMBEDDING_BATCH_SIZE)
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,

    /// Optional periodic trigger interval in seconds
    /// (EMBEDDING_CRON_SCHEDULE; unset disables the loop)
    pub cron_interval_secs: Option<u64>,

    /// Cost accounting rate (COST_PER_MILLION_TOKENS)
    #[serde(default = "default_cost_per_million")]
    pub cost_per_million_tokens: f64,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// API key for the generative service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Chat model selector (LLM_CHAT_MODEL)
    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// Sampling temperature (LLM_TEMPERATURE)
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Top-k sampling (LLM_TOP_K); omitted from requests when None
    pub top_k: Option<u32>,

    /// Nucleus sampling (LLM_TOP_P)
    #[serde(default = "default_top_p")]
    pub top_p: f64,

    /// Output cap (LLM_MAX_OUTPUT_TOKENS)
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    /// Keywords extracted per query (DEFAULT_TOP_N)
    #[serde(default = "default_top_n")]
    pub top_n_keywords: usize,

    /// Results requested from search (DEFAULT_TOP_K)
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Similarity cut-off (DEFAULT_MIN_SIMILARITY)
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f64,

    /// Fallback floor for relaxed retries (MIN_SIMILARITY_FLOOR)
    #[serde(default = "default_min_similarity_floor")]
    pub min_similarity_floor: f64,

    /// Context budget in estimated tokens (MAX_CONTEXT_TOKENS)
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,

    /// Keyword count at which hybrid search kicks in
    /// (HYBRID_KEYWORD_THRESHOLD)
    #[serde(default = "default_hybrid_keyword_threshold")]
    pub hybrid_keyword_threshold: usize,

    /// Jaccard overlap above which near-duplicates are dropped
    /// (DIVERSITY_THRESHOLD)
    #[serde(default = "default_diversity_threshold")]
    pub diversity_threshold: f64,

    /// Recency half-life in days (RECENCY_DECAY_DAYS)
    #[serde(default = "default_recency_decay_days")]
    pub recency_decay_days: f64,

    /// Minimum results before the relaxed fallback fires
    #[serde(default = "default_min_results")]
    pub min_results: usize,
}

/// Ranker weight overrides; each weight in [0, 1], summing to ~1
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RankerWeightsConfig {
    #[serde(default = "default_weight_vector")]
    pub vector: f64,

    #[serde(default = "default_weight_recency")]
    pub recency: f64,

    #[serde(default = "default_weight_keyword")]
    pub keyword: f64,

    #[serde(default = "default_weight_source")]
    pub source: f64,

    #[serde(default = "default_weight_length")]
    pub length: f64,

    /// Multiplier applied when query intent matches a document's source
    #[serde(default = "default_intent_boost")]
    pub intent_boost: f64,

    /// Per-source priority scores
    #[serde(default = "default_priority_email")]
    pub priority_email: f64,

    #[serde(default = "default_priority_calendar")]
    pub priority_calendar: f64,

    #[serde(default = "default_priority_music")]
    pub priority_music: f64,

    #[serde(default = "default_priority_other")]
    pub priority_default: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorsConfig {
    /// Frontend origin (FRONTEND_URL)
    pub frontend_url: Option<String>,

    /// Comma-separated list of allowed origins (CORS_ORIGIN)
    pub origins: Option<String>,
}

impl CorsConfig {
    /// All configured origins, frontend first
    pub fn allowed_origins(&self) -> Vec<String> {
        let mut origins = Vec::new();
        if let Some(ref frontend) = self.frontend_url {
            origins.push(frontend.clone());
        }
        if let Some(ref list) = self.origins {
            for origin in list.split(',') {
                let origin = origin.trim();
                if !origin.is_empty() && !origins.iter().any(|o| o == origin) {
                    origins.push(origin.to_string());
                }
            }
        }
        origins
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests per second
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_rate_limit_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 60 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_max_connections() -> u32 { 10 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 5 }
fn default_idle_timeout() -> u64 { 300 }
fn default_embedding_provider() -> String { "openai".to_string() }
fn default_embedding_model() -> String { crate::DEFAULT_EMBEDDING_MODEL.to_string() }
fn default_embedding_dimensions() -> usize { crate::DEFAULT_EMBEDDING_DIMENSIONS }
fn default_embedding_batch_size() -> usize { 50 }
fn default_cost_per_million() -> f64 { 0.02 }
fn default_embedding_timeout() -> u64 { 30 }
fn default_chat_model() -> String { "gpt-4o-mini".to_string() }
fn default_temperature() -> f64 { 0.7 }
fn default_top_p() -> f64 { 0.95 }
fn default_max_output_tokens() -> u32 { 2048 }
fn default_llm_timeout() -> u64 { 120 }
fn default_top_n() -> usize { 10 }
fn default_top_k() -> usize { 10 }
fn default_min_similarity() -> f64 { 0.5 }
fn default_min_similarity_floor() -> f64 { 0.25 }
fn default_max_context_tokens() -> usize { 28_000 }
fn default_hybrid_keyword_threshold() -> usize { 2 }
fn default_diversity_threshold() -> f64 { 0.85 }
fn default_recency_decay_days() -> f64 { 60.0 }
fn default_min_results() -> usize { 3 }
fn default_weight_vector() -> f64 { 0.45 }
fn default_weight_recency() -> f64 { 0.15 }
fn default_weight_keyword() -> f64 { 0.25 }
fn default_weight_source() -> f64 { 0.10 }
fn default_weight_length() -> f64 { 0.05 }
fn default_intent_boost() -> f64 { 1.3 }
fn default_priority_email() -> f64 { 1.0 }
fn default_priority_calendar() -> f64 { 0.95 }
fn default_priority_music() -> f64 { 0.80 }
fn default_priority_other() -> f64 { 0.5 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "recall".to_string() }
fn default_rate_limit() -> u32 { 50 }
fn default_burst() -> u32 { 100 }
fn default_rate_limit_enabled() -> bool { true }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with defaults
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__EMBEDDING__DIMENSIONS=768
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
                request_timeout_secs: default_request_timeout(),
                shutdown_timeout_secs: default_shutdown_timeout(),
            },
            database: DatabaseConfig {
                url: "postgres://localhost/recall".to_string(),
                max_connections: default_max_connections(),
                min_connections: default_min_connections(),
                connect_timeout_secs: default_connect_timeout(),
                idle_timeout_secs: default_idle_timeout(),
            },
            embedding: EmbeddingConfig {
                provider: default_embedding_provider(),
                api_key: None,
                api_base: None,
                model: default_embedding_model(),
                dimensions: default_embedding_dimensions(),
                batch_size: default_embedding_batch_size(),
                cron_interval_secs: None,
                cost_per_million_tokens: default_cost_per_million(),
                timeout_secs: default_embedding_timeout(),
            },
            llm: LlmConfig {
                api_key: None,
                api_base: None,
                chat_model: default_chat_model(),
                temperature: default_temperature(),
                top_k: None,
                top_p: default_top_p(),
                max_output_tokens: default_max_output_tokens(),
                timeout_secs: default_llm_timeout(),
            },
            retrieval: RetrievalConfig {
                top_n_keywords: default_top_n(),
                top_k: default_top_k(),
                min_similarity: default_min_similarity(),
                min_similarity_floor: default_min_similarity_floor(),
                max_context_tokens: default_max_context_tokens(),
                hybrid_keyword_threshold: default_hybrid_keyword_threshold(),
                diversity_threshold: default_diversity_threshold(),
                recency_decay_days: default_recency_decay_days(),
                min_results: default_min_results(),
            },
            ranker: RankerWeightsConfig {
                vector: default_weight_vector(),
                recency: default_weight_recency(),
                keyword: default_weight_keyword(),
                source: default_weight_source(),
                length: default_weight_length(),
                intent_boost: default_intent_boost(),
                priority_email: default_priority_email(),
                priority_calendar: default_priority_calendar(),
                priority_music: default_priority_music(),
                priority_default: default_priority_other(),
            },
            cors: CorsConfig {
                frontend_url: None,
                origins: None,
            },
            observability: ObservabilityConfig {
                log_level: default_log_level(),
                json_logging: default_json_logging(),
                metrics_port: default_metrics_port(),
                service_name: default_service_name(),
            },
            rate_limit: RateLimitConfig {
                requests_per_second: default_rate_limit(),
                burst: default_burst(),
                enabled: default_rate_limit_enabled(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.database.connect_timeout_secs, 5);
        assert_eq!(config.retrieval.max_context_tokens, 28_000);
    }

    #[test]
    fn test_ranker_weights_sum_to_one() {
        let config = AppConfig::default();
        let sum = config.ranker.vector
            + config.ranker.recency
            + config.ranker.keyword
            + config.ranker.source
            + config.ranker.length;
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cors_origin_list() {
        let cors = CorsConfig {
            frontend_url: Some("http://localhost:5173".to_string()),
            origins: Some("http://localhost:5173, https://recall.example".to_string()),
        };
        let origins = cors.allowed_origins();
        assert_eq!(origins.len(), 2);
        assert_eq!(origins[0], "http://localhost:5173");
    }
}

//! Embedding service abstraction
//!
//! Provides a unified interface over an external embedding model with
//! single-text and batch entry points, rate-limit-aware retries, and
//! token/cost estimation.

use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Conservative character budget applied before calling the model
const MAX_INPUT_CHARS: usize = 8_000;

/// Delay between sequential batch items, respects external quotas
const BATCH_ITEM_DELAY: Duration = Duration::from_millis(200);

/// Retries after the initial call for rate-limited requests
const MAX_RETRIES: u32 = 3;

/// A generated embedding with its token estimate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingOutput {
    pub vector: Vec<f32>,
    /// Estimate (1 token ~= 4 chars), used for cost accounting only
    pub tokens: usize,
}

/// Trait for embedding generation
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate an embedding for a single text
    async fn embed(&self, text: &str) -> Result<EmbeddingOutput>;

    /// Generate embeddings for multiple texts.
    ///
    /// Items are processed sequentially with a small inter-call delay;
    /// the batch aborts on the first non-rate-limit failure.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingOutput>> {
        let mut outputs = Vec::with_capacity(texts.len());
        for (i, text) in texts.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(BATCH_ITEM_DELAY).await;
            }
            outputs.push(self.embed(text).await?);
        }
        Ok(outputs)
    }

    /// Check that the provider is reachable
    async fn health_check(&self) -> Result<()>;

    /// Get the model name
    fn model_name(&self) -> &str;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;
}

/// Normalize whitespace and truncate to the provider character budget
fn prepare_input(text: &str) -> Result<String> {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.is_empty() {
        return Err(AppError::Validation {
            message: "Cannot embed empty text".to_string(),
            field: None,
        });
    }

    if normalized.chars().count() > MAX_INPUT_CHARS {
        Ok(normalized.chars().take(MAX_INPUT_CHARS).collect())
    } else {
        Ok(normalized)
    }
}

/// Cost in dollars for a token count at the configured rate
pub fn cost_for_tokens(tokens: u64, cost_per_million: f64) -> f64 {
    tokens as f64 / 1_000_000.0 * cost_per_million
}

/// HTTP embedding client (OpenAI-compatible `/embeddings` endpoint)
pub struct HttpEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dimension: usize,
    base_url: String,
}

#[derive(Serialize)]
struct EmbeddingRequest {
    input: Vec<String>,
    model: String,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl HttpEmbedder {
    /// Create a new HTTP embedder
    pub fn new(
        api_key: String,
        model: String,
        dimension: usize,
        base_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key,
            model,
            dimension,
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
        })
    }

    /// Make a request, retrying only on upstream throttling.
    ///
    /// Up to three retries after the first call, sleeping 2 s, 4 s, then
    /// 8 s before them; other errors propagate immediately.
    async fn request_with_retry(&self, text: &str) -> Result<Vec<f32>> {
        let mut last_error = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = Duration::from_secs(2u64.pow(attempt));
                tracing::warn!(
                    attempt = attempt + 1,
                    delay_secs = delay.as_secs(),
                    "Embedding rate limited, backing off"
                );
                tokio::time::sleep(delay).await;
            }

            match self.make_request(text).await {
                Ok(vector) => return Ok(vector),
                Err(e) if e.is_rate_limit() => last_error = Some(e),
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| AppError::EmbeddingError {
            message: "Unknown error after retries".to_string(),
        }))
    }

    async fn make_request(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/embeddings", self.base_url);

        let request = EmbeddingRequest {
            input: vec![text.to_string()],
            model: self.model.clone(),
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::EmbeddingError {
                message: format!("Request failed: {}", e),
            })?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(2);
            return Err(AppError::ExternalRateLimit {
                service: "embeddings".to_string(),
                retry_after_secs,
            });
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::EmbeddingError {
                message: format!("API error {}: {}", status, body),
            });
        }

        let result: EmbeddingResponse =
            response.json().await.map_err(|e| AppError::EmbeddingError {
                message: format!("Failed to parse response: {}", e),
            })?;

        result
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| AppError::EmbeddingError {
                message: "Empty response".to_string(),
            })
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<EmbeddingOutput> {
        let input = prepare_input(text)?;
        let tokens = crate::estimate_tokens(&input);
        let vector = self.request_with_retry(&input).await?;

        if vector.len() != self.dimension {
            return Err(AppError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        Ok(EmbeddingOutput { vector, tokens })
    }

    async fn health_check(&self) -> Result<()> {
        self.embed("health check").await.map(|_| ())
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Deterministic mock embedder for testing.
///
/// The vector is a pure function of the input text, so caching and
/// coverage invariants can be asserted exactly.
pub struct MockEmbedder {
    dimension: usize,
    calls: std::sync::atomic::AtomicUsize,
}

impl MockEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Number of embed calls made against this instance
    pub fn call_count(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }

    fn seed_for(text: &str) -> u64 {
        // FNV-1a over the bytes keeps the mock dependency-light
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in text.bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x1000_0000_01b3);
        }
        hash
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<EmbeddingOutput> {
        use rand::{rngs::StdRng, Rng, SeedableRng};

        let input = prepare_input(text)?;
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);

        let mut rng = StdRng::seed_from_u64(Self::seed_for(&input));
        let vector = (0..self.dimension).map(|_| rng.gen::<f32>()).collect();

        Ok(EmbeddingOutput {
            vector,
            tokens: crate::estimate_tokens(&input),
        })
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    fn model_name(&self) -> &str {
        "mock-embedding"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Create an embedder based on configuration
pub fn create_embedder(config: &crate::config::EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "openai" => {
            let key = config
                .api_key
                .clone()
                .ok_or_else(|| AppError::Configuration {
                    message: "Embedding API key required".to_string(),
                })?;
            Ok(Arc::new(HttpEmbedder::new(
                key,
                config.model.clone(),
                config.dimensions,
                config.api_base.clone(),
                Duration::from_secs(config.timeout_secs),
            )?))
        }
        "mock" => Ok(Arc::new(MockEmbedder::new(config.dimensions))),
        other => {
            tracing::warn!(provider = other, "Unknown embedding provider, using mock");
            Ok(Arc::new(MockEmbedder::new(config.dimensions)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_embedder_dimension() {
        let embedder = MockEmbedder::new(768);
        let output = embedder.embed("test text").await.unwrap();
        assert_eq!(output.vector.len(), 768);
        assert_eq!(output.tokens, crate::estimate_tokens("test text"));
    }

    #[tokio::test]
    async fn test_mock_embedder_is_deterministic() {
        let embedder = MockEmbedder::new(32);
        let a = embedder.embed("same text").await.unwrap();
        let b = embedder.embed("same text").await.unwrap();
        assert_eq!(a.vector, b.vector);

        let c = embedder.embed("other text").await.unwrap();
        assert_ne!(a.vector, c.vector);
    }

    #[tokio::test]
    async fn test_empty_input_rejected() {
        let embedder = MockEmbedder::new(8);
        let err = embedder.embed("   \n\t ").await.unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_batch_order_preserved() {
        let embedder = MockEmbedder::new(8);
        let texts = vec!["one".to_string(), "two".to_string()];
        let outputs = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(outputs.len(), 2);

        let one = embedder.embed("one").await.unwrap();
        assert_eq!(outputs[0].vector, one.vector);
    }

    #[test]
    fn test_prepare_input_normalizes_whitespace() {
        let prepared = prepare_input("  hello \n  world\t again ").unwrap();
        assert_eq!(prepared, "hello world again");
    }

    #[test]
    fn test_prepare_input_truncates() {
        let long = "word ".repeat(5_000);
        let prepared = prepare_input(&long).unwrap();
        assert_eq!(prepared.chars().count(), MAX_INPUT_CHARS);
    }

    #[test]
    fn test_cost_estimate() {
        let cost = cost_for_tokens(500_000, 0.02);
        assert!((cost - 0.01).abs() < 1e-12);
    }
}

//! LLM service abstraction
//!
//! Wraps an external generative model behind blocking, streaming, and
//! multi-turn chat interfaces. The model is treated as an opaque
//! text-in/text-out endpoint; cancellation propagates by dropping the
//! returned future or stream, which aborts the in-flight request.

use crate::errors::{AppError, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Retries after the initial call for rate-limited requests
const MAX_RETRIES: u32 = 3;

/// One prior `{role, content}` pair replayed to the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".to_string(), content: content.into() }
    }
}

/// Completed generation with token accounting
#[derive(Debug, Clone)]
pub struct Generation {
    pub text: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub duration: Duration,
    pub model: String,
}

/// One frame of a streaming generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamChunk {
    Text(String),
    Done,
}

/// Trait for generative model access
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// One-shot generation from a single prompt
    async fn generate(&self, prompt: &str) -> Result<Generation>;

    /// Streaming generation; the sequence ends with `StreamChunk::Done`
    async fn generate_stream(&self, prompt: &str) -> Result<BoxStream<'static, Result<StreamChunk>>>;

    /// Multi-turn generation replaying prior messages
    async fn chat(&self, messages: &[ChatMessage]) -> Result<Generation>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    temperature: f64,
    top_p: f64,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Serialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    model: Option<String>,
    choices: Vec<ChatChoice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: WireResponseMessage,
}

#[derive(Deserialize)]
struct WireResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Deserialize)]
struct StreamResponse {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

/// HTTP LLM client (OpenAI-compatible `/chat/completions` endpoint)
pub struct HttpLlmClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    config: crate::config::LlmConfig,
}

impl HttpLlmClient {
    /// Create a new HTTP LLM client
    pub fn new(config: crate::config::LlmConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
            message: "LLM API key required".to_string(),
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        let base_url = config
            .api_base
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());

        Ok(Self { client, api_key, base_url, config })
    }

    fn build_request(&self, messages: &[ChatMessage], stream: bool) -> ChatRequest<'_> {
        ChatRequest {
            model: &self.config.chat_model,
            messages: messages
                .iter()
                .map(|m| WireMessage { role: m.role.clone(), content: m.content.clone() })
                .collect(),
            temperature: self.config.temperature,
            top_p: self.config.top_p,
            max_tokens: self.config.max_output_tokens,
            top_k: self.config.top_k,
            stream,
        }
    }

    async fn send(&self, messages: &[ChatMessage], stream: bool) -> Result<reqwest::Response> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = self.build_request(messages, stream);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::LlmError {
                message: format!("Request failed: {}", e),
            })?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AppError::ExternalRateLimit {
                service: "llm".to_string(),
                retry_after_secs: 2,
            });
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::LlmError {
                message: format!("API error {}: {}", status, body),
            });
        }

        Ok(response)
    }

    /// Send a request, retrying only on upstream throttling.
    ///
    /// Up to three retries after the first call, sleeping 2 s, 4 s, then
    /// 8 s before them; other errors propagate immediately.
    async fn send_with_retry(
        &self,
        messages: &[ChatMessage],
        stream: bool,
    ) -> Result<reqwest::Response> {
        let mut last_error = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = Duration::from_secs(2u64.pow(attempt));
                tracing::warn!(
                    attempt = attempt + 1,
                    delay_secs = delay.as_secs(),
                    "LLM rate limited, backing off"
                );
                tokio::time::sleep(delay).await;
            }

            match self.send(messages, stream).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_rate_limit() => last_error = Some(e),
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| AppError::LlmError {
            message: "Unknown error after retries".to_string(),
        }))
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<Generation> {
        let start = Instant::now();
        let response = self.send_with_retry(messages, false).await?;

        let parsed: ChatResponse = response.json().await.map_err(|e| AppError::LlmError {
            message: format!("Failed to parse response: {}", e),
        })?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AppError::LlmError {
                message: "Empty response".to_string(),
            })?;

        let (prompt_tokens, completion_tokens) = parsed
            .usage
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or((0, 0));

        Ok(Generation {
            text,
            prompt_tokens,
            completion_tokens,
            duration: start.elapsed(),
            model: parsed.model.unwrap_or_else(|| self.config.chat_model.clone()),
        })
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn generate(&self, prompt: &str) -> Result<Generation> {
        self.complete(&[ChatMessage::user(prompt)]).await
    }

    async fn generate_stream(
        &self,
        prompt: &str,
    ) -> Result<BoxStream<'static, Result<StreamChunk>>> {
        let response = self.send_with_retry(&[ChatMessage::user(prompt)], true).await?;
        let mut bytes = response.bytes_stream();

        // Parse `data:` SSE lines from the byte stream; frames may split
        // across network chunks so a line buffer carries the remainder
        let stream = async_stream::stream! {
            let mut buffer = String::new();

            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        yield Err(AppError::LlmError {
                            message: format!("Stream error: {}", e),
                        });
                        return;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(newline) = buffer.find('\n') {
                    let line = buffer[..newline].trim().to_string();
                    buffer.drain(..=newline);

                    let Some(data) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let data = data.trim();

                    if data == "[DONE]" {
                        yield Ok(StreamChunk::Done);
                        return;
                    }

                    match serde_json::from_str::<StreamResponse>(data) {
                        Ok(frame) => {
                            let content = frame
                                .choices
                                .into_iter()
                                .next()
                                .and_then(|c| c.delta.content)
                                .unwrap_or_default();
                            if !content.is_empty() {
                                yield Ok(StreamChunk::Text(content));
                            }
                        }
                        Err(e) => {
                            tracing::debug!(error = %e, "Skipping unparseable stream frame");
                        }
                    }
                }
            }

            // Upstream closed without a done marker; still terminate cleanly
            yield Ok(StreamChunk::Done);
        };

        Ok(stream.boxed())
    }

    async fn chat(&self, messages: &[ChatMessage]) -> Result<Generation> {
        if messages.is_empty() {
            return Err(AppError::Validation {
                message: "Chat requires at least one message".to_string(),
                field: Some("messages".to_string()),
            });
        }
        self.complete(messages).await
    }

    fn model_name(&self) -> &str {
        &self.config.chat_model
    }
}

/// Mock LLM for testing; echoes a canned answer
pub struct MockLlm {
    answer: String,
}

impl MockLlm {
    pub fn new(answer: impl Into<String>) -> Self {
        Self { answer: answer.into() }
    }
}

impl Default for MockLlm {
    fn default() -> Self {
        Self::new("This is a mock answer citing [Document 1].")
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn generate(&self, prompt: &str) -> Result<Generation> {
        Ok(Generation {
            text: self.answer.clone(),
            prompt_tokens: crate::estimate_tokens(prompt) as u32,
            completion_tokens: crate::estimate_tokens(&self.answer) as u32,
            duration: Duration::from_millis(1),
            model: "mock-llm".to_string(),
        })
    }

    async fn generate_stream(
        &self,
        _prompt: &str,
    ) -> Result<BoxStream<'static, Result<StreamChunk>>> {
        let words: Vec<String> = self
            .answer
            .split_inclusive(' ')
            .map(|w| w.to_string())
            .collect();

        let stream = async_stream::stream! {
            for word in words {
                yield Ok(StreamChunk::Text(word));
            }
            yield Ok(StreamChunk::Done);
        };

        Ok(stream.boxed())
    }

    async fn chat(&self, messages: &[ChatMessage]) -> Result<Generation> {
        let prompt = messages.last().map(|m| m.content.as_str()).unwrap_or("");
        self.generate(prompt).await
    }

    fn model_name(&self) -> &str {
        "mock-llm"
    }
}

/// Create an LLM client based on configuration
pub fn create_llm_client(config: &crate::config::LlmConfig) -> Result<Arc<dyn LlmClient>> {
    if config.api_key.is_some() {
        Ok(Arc::new(HttpLlmClient::new(config.clone())?))
    } else {
        tracing::warn!("No LLM API key configured, using mock client");
        Ok(Arc::new(MockLlm::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_generate() {
        let llm = MockLlm::new("hello");
        let generation = llm.generate("prompt").await.unwrap();
        assert_eq!(generation.text, "hello");
        assert_eq!(generation.model, "mock-llm");
    }

    #[tokio::test]
    async fn test_mock_stream_terminates_with_done() {
        let llm = MockLlm::new("one two three");
        let mut stream = llm.generate_stream("prompt").await.unwrap();

        let mut collected = String::new();
        let mut saw_done = false;
        while let Some(chunk) = stream.next().await {
            match chunk.unwrap() {
                StreamChunk::Text(text) => collected.push_str(&text),
                StreamChunk::Done => {
                    saw_done = true;
                    break;
                }
            }
        }

        assert!(saw_done);
        assert_eq!(collected, "one two three");
    }

    #[tokio::test]
    async fn test_chat_replays_last_message() {
        let llm = MockLlm::default();
        let messages = vec![
            ChatMessage::system("be helpful"),
            ChatMessage::user("question"),
        ];
        let generation = llm.chat(&messages).await.unwrap();
        assert!(!generation.text.is_empty());
    }
}

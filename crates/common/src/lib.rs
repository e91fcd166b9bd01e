//! Recall Common Library
//!
//! Shared code for the Recall retrieval-augmented assistant:
//! - Database models and repository for the document store
//! - Embedding provider abstraction
//! - LLM provider abstraction
//! - Progress bus for streaming stage updates
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod config;
pub mod credentials;
pub mod db;
pub mod embeddings;
pub mod errors;
pub mod llm;
pub mod metrics;
pub mod progress;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::{DbPool, Repository};
pub use embeddings::Embedder;
pub use errors::{AppError, Result};
pub use llm::LlmClient;
pub use progress::ProgressBus;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Default embedding dimension
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 768;

/// Maximum characters kept in a normalized document body
pub const MAX_DOCUMENT_CHARS: usize = 32_000;

/// Marker appended when a document body is cut at [`MAX_DOCUMENT_CHARS`]
pub const TRUNCATION_MARKER: &str = "… [truncated]";

/// Estimate the token count of a text (1 token ~= 4 characters).
///
/// Used for cost accounting and context budgeting only, never for
/// correctness.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }
}

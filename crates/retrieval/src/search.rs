//! Vector search service
//!
//! Generates (and caches) query embeddings, clamps caller options, and
//! issues cosine-distance searches through the repository. Similarity is
//! rounded to 4 decimals before leaving this module.

use crate::cache::EmbeddingCache;
use recall_common::db::{Repository, SearchFilters, SearchHit};
use recall_common::embeddings::Embedder;
use recall_common::errors::{AppError, Result};
use std::sync::Arc;
use tracing::debug;

/// Results below this count trigger the expansion retry
const EXPANSION_MIN_RESULTS: usize = 3;

/// Relaxed similarity used by the expansion retry
const EXPANSION_MIN_SIMILARITY: f64 = 0.3;

/// Caller-facing search options; values are clamped, not rejected
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub top_k: usize,
    pub min_similarity: f64,
    pub filters: SearchFilters,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            top_k: 10,
            min_similarity: 0.5,
            filters: SearchFilters::default(),
        }
    }
}

impl SearchOptions {
    fn clamped_top_k(&self) -> usize {
        self.top_k.clamp(1, 100)
    }

    fn clamped_min_similarity(&self) -> f64 {
        self.min_similarity.clamp(0.0, 1.0)
    }
}

/// Search service over the document store
pub struct SearchService {
    repository: Repository,
    embedder: Arc<dyn Embedder>,
    cache: EmbeddingCache,
}

impl SearchService {
    pub fn new(repository: Repository, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            repository,
            embedder,
            cache: EmbeddingCache::default(),
        }
    }

    /// Embed a query, consulting the bounded LRU cache first.
    ///
    /// Byte-identical input (after trim + lowercase) within the TTL hits
    /// the cache and incurs no provider call.
    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let key = EmbeddingCache::key_for(query);
        if key.is_empty() {
            return Err(AppError::Validation {
                message: "Query must not be empty".to_string(),
                field: Some("query".to_string()),
            });
        }

        if let Some(vector) = self.cache.get(&key) {
            debug!("Query embedding cache hit");
            return Ok(vector);
        }

        let output = self.embedder.embed(&key).await?;
        self.cache.insert(key, output.vector.clone());
        Ok(output.vector)
    }

    /// Plain cosine search
    pub async fn search(
        &self,
        user_id: &str,
        query: &str,
        opts: &SearchOptions,
    ) -> Result<Vec<SearchHit>> {
        let embedding = self.embed_query(query).await?;
        let hits = self
            .repository
            .search(
                user_id,
                &embedding,
                &opts.filters,
                opts.clamped_top_k(),
                opts.clamped_min_similarity(),
            )
            .await?;

        Ok(round_similarities(hits))
    }

    /// Keyword-boosted hybrid search
    pub async fn hybrid_search(
        &self,
        user_id: &str,
        query: &str,
        keywords: &[String],
        opts: &SearchOptions,
    ) -> Result<Vec<SearchHit>> {
        let embedding = self.embed_query(query).await?;
        let hits = self
            .repository
            .hybrid_search(
                user_id,
                &embedding,
                keywords,
                &opts.filters,
                opts.clamped_top_k(),
                opts.clamped_min_similarity(),
            )
            .await?;

        Ok(round_similarities(hits))
    }

    /// Plain search that relaxes the similarity floor when too few
    /// results come back
    pub async fn search_with_expansion(
        &self,
        user_id: &str,
        query: &str,
        opts: &SearchOptions,
    ) -> Result<Vec<SearchHit>> {
        let hits = self.search(user_id, query, opts).await?;

        if hits.len() >= EXPANSION_MIN_RESULTS
            || opts.clamped_min_similarity() <= EXPANSION_MIN_SIMILARITY
        {
            return Ok(hits);
        }

        debug!(
            initial = hits.len(),
            relaxed_min = EXPANSION_MIN_SIMILARITY,
            "Expanding search with relaxed similarity"
        );

        let relaxed = SearchOptions {
            min_similarity: EXPANSION_MIN_SIMILARITY,
            ..opts.clone()
        };
        self.search(user_id, query, &relaxed).await
    }

    /// Nearest neighbours of a stored document
    pub async fn find_similar(
        &self,
        user_id: &str,
        document_id: &str,
        k: usize,
    ) -> Result<Vec<SearchHit>> {
        let hits = self
            .repository
            .find_similar(user_id, document_id, k.clamp(1, 100))
            .await?;
        Ok(round_similarities(hits))
    }
}

/// Round similarity to 4 decimals
fn round_similarities(mut hits: Vec<SearchHit>) -> Vec<SearchHit> {
    for hit in &mut hits {
        hit.similarity = (hit.similarity * 10_000.0).round() / 10_000.0;
    }
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn hit(similarity: f64) -> SearchHit {
        SearchHit {
            document_id: "email_m1".to_string(),
            source: "email".to_string(),
            doc_type: "message".to_string(),
            title: None,
            author: None,
            content: "body".to_string(),
            timestamp: Utc::now().into(),
            metadata: serde_json::json!({}),
            similarity,
            keyword_boost: 0.0,
        }
    }

    #[test]
    fn test_similarity_rounding() {
        let rounded = round_similarities(vec![hit(0.123456), hit(0.9999999)]);
        assert_eq!(rounded[0].similarity, 0.1235);
        assert_eq!(rounded[1].similarity, 1.0);
    }

    #[test]
    fn test_option_clamping() {
        let opts = SearchOptions {
            top_k: 5_000,
            min_similarity: 1.7,
            filters: SearchFilters::default(),
        };
        assert_eq!(opts.clamped_top_k(), 100);
        assert_eq!(opts.clamped_min_similarity(), 1.0);

        let opts = SearchOptions {
            top_k: 0,
            min_similarity: -0.4,
            filters: SearchFilters::default(),
        };
        assert_eq!(opts.clamped_top_k(), 1);
        assert_eq!(opts.clamped_min_similarity(), 0.0);
    }
}

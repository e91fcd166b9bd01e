//! RAG pipeline
//!
//! Glues query processing, search, ranking, and context formatting into
//! a single retrieval call, choosing the search strategy and falling
//! back with relaxed thresholds when too few results survive. Returns
//! the assembled prompt plus citations; calling the model is the
//! gateway's job.

use crate::context::{ContextFormatter, FormattedContext};
use crate::prompt::PromptTemplates;
use crate::query::{ProcessedQuery, QueryProcessor};
use crate::ranker::{RankedDocument, Ranker, RankerConfig};
use crate::search::{SearchOptions, SearchService};
use chrono::Utc;
use recall_common::config::RetrievalConfig;
use recall_common::db::SearchFilters;
use recall_common::errors::{AppError, Result};
use recall_common::progress::{channels, ProgressBus, ProgressEvent};
use serde::Serialize;
use tracing::{debug, info, instrument};

/// Diversity threshold used by the relaxed fallback pass
const FALLBACK_DIVERSITY_THRESHOLD: f64 = 0.95;

/// Search strategy chosen for a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    Hybrid,
    VectorWithExpansion,
}

/// Metadata about the retrieval pass, returned alongside the prompt
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalMetadata {
    pub strategy: SearchStrategy,
    pub candidates: usize,
    pub after_ranking: usize,
    pub selected: usize,
    pub fallback_used: bool,
}

/// Output of the pipeline
#[derive(Debug, Clone)]
pub struct RagOutput {
    pub prompt: String,
    pub context: FormattedContext,
    pub processed_query: ProcessedQuery,
    pub metadata: RetrievalMetadata,
}

/// RAG pipeline service
pub struct RagPipeline {
    processor: QueryProcessor,
    search: SearchService,
    ranker: Ranker,
    fallback_ranker: Ranker,
    formatter: ContextFormatter,
    templates: PromptTemplates,
    bus: ProgressBus,
    config: RetrievalConfig,
}

impl RagPipeline {
    pub fn new(
        processor: QueryProcessor,
        search: SearchService,
        ranker_config: RankerConfig,
        formatter: ContextFormatter,
        bus: ProgressBus,
        config: RetrievalConfig,
    ) -> Self {
        let fallback_ranker = Ranker::new(RankerConfig {
            diversity_threshold: FALLBACK_DIVERSITY_THRESHOLD,
            ..ranker_config.clone()
        });

        Self {
            processor,
            search,
            ranker: Ranker::new(ranker_config),
            fallback_ranker,
            formatter,
            templates: PromptTemplates,
            bus,
            config,
        }
    }

    /// Run retrieval end to end for one query
    #[instrument(skip(self, query), fields(query_id = %query_id))]
    pub async fn execute(
        &self,
        user_id: &str,
        query: &str,
        query_id: &str,
    ) -> Result<RagOutput> {
        if query.trim().is_empty() {
            return Err(AppError::Validation {
                message: "Query must not be empty".to_string(),
                field: Some("message".to_string()),
            });
        }

        let now = Utc::now();
        let processed = self.processor.process(query, now);

        self.emit(query_id, user_id, "query_processed", serde_json::json!({
            "intent": processed.intent.as_str(),
            "keywords": processed.keywords,
        }));

        // Hybrid when enough keywords were extracted, else plain search
        // with the expansion retry
        let strategy = if processed.keywords.len() >= self.config.hybrid_keyword_threshold {
            SearchStrategy::Hybrid
        } else {
            SearchStrategy::VectorWithExpansion
        };

        let opts = SearchOptions {
            top_k: self.config.top_k,
            min_similarity: self.config.min_similarity,
            filters: filters_from_query(&processed),
        };

        self.emit(query_id, user_id, "searching", serde_json::json!({
            "strategy": strategy,
        }));

        let hits = match strategy {
            SearchStrategy::Hybrid => {
                self.search
                    .hybrid_search(user_id, query, &processed.keywords, &opts)
                    .await?
            }
            SearchStrategy::VectorWithExpansion => {
                self.search.search_with_expansion(user_id, query, &opts).await?
            }
        };

        let candidates = hits.len();
        debug!(candidates, ?strategy, "Search complete");

        self.emit(query_id, user_id, "ranking", serde_json::json!({
            "candidates": candidates,
        }));

        let mut ranked = self.ranker.rank(hits, &processed, now);
        let mut fallback_used = false;

        // Relaxed pass: lower similarity floor, looser diversity
        if ranked.len() < self.config.min_results {
            fallback_used = true;
            let relaxed_opts = SearchOptions {
                min_similarity: self.config.min_similarity_floor,
                ..opts.clone()
            };

            debug!(
                after_first_pass = ranked.len(),
                floor = self.config.min_similarity_floor,
                "Falling back with relaxed thresholds"
            );

            let relaxed_hits = match strategy {
                SearchStrategy::Hybrid => {
                    self.search
                        .hybrid_search(user_id, query, &processed.keywords, &relaxed_opts)
                        .await?
                }
                SearchStrategy::VectorWithExpansion => {
                    self.search.search(user_id, query, &relaxed_opts).await?
                }
            };

            ranked = self.fallback_ranker.rank(relaxed_hits, &processed, now);
        }

        let after_ranking = ranked.len();

        self.emit(query_id, user_id, "formatting", serde_json::json!({
            "ranked": after_ranking,
        }));

        let context = self.formatter.format(&ranked);
        let prompt = self.templates.build(
            processed.query_type,
            &context.context,
            !context.is_empty(),
            query,
        );

        info!(
            candidates,
            after_ranking,
            selected = context.documents_selected,
            fallback_used,
            "Retrieval complete"
        );

        Ok(RagOutput {
            prompt,
            metadata: RetrievalMetadata {
                strategy,
                candidates,
                after_ranking,
                selected: context.documents_selected,
                fallback_used,
            },
            context,
            processed_query: processed,
        })
    }

    /// Ranked-result explanation passthrough for debug endpoints
    pub fn explain(&self, result: &RankedDocument) -> serde_json::Value {
        self.ranker.explain(result)
    }

    fn emit(&self, query_id: &str, user_id: &str, stage: &str, mut payload: serde_json::Value) {
        if let Some(object) = payload.as_object_mut() {
            object.insert("stage".to_string(), serde_json::json!(stage));
        }
        self.bus.publish(ProgressEvent::new(
            channels::RAG_PROGRESS,
            query_id,
            Some(user_id.to_string()),
            payload,
        ));
    }
}

/// SQL-level filters derived from the processed query.
///
/// The author predicate only applies when a person was explicitly
/// extracted; the softer `potential_author` hint stays a ranking signal
/// so it cannot exclude legitimate results.
fn filters_from_query(processed: &ProcessedQuery) -> SearchFilters {
    SearchFilters {
        source: processed.filters.source,
        doc_type: None,
        author: processed.filters.author.clone(),
        time_range: processed
            .filters
            .time_range
            .as_ref()
            .map(|range| (range.start, range.end)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryProcessor;
    use chrono::TimeZone;

    #[test]
    fn test_filters_from_query_maps_author_and_window() {
        let now = Utc.with_ymd_and_hms(2025, 10, 15, 12, 0, 0).unwrap();
        let processed =
            QueryProcessor::default().process("emails from Ravi about budget last week", now);

        let filters = filters_from_query(&processed);
        assert_eq!(filters.author.as_deref(), Some("Ravi"));
        assert!(filters.source.is_some());
        let (start, end) = filters.time_range.expect("time window");
        assert!(start < end);
    }

    #[test]
    fn test_potential_author_is_not_a_sql_filter() {
        let now = Utc.with_ymd_and_hms(2025, 10, 15, 12, 0, 0).unwrap();
        let processed = QueryProcessor::default().process("notes about Acme Corp", now);

        assert!(processed.filters.potential_author.is_some());
        let filters = filters_from_query(&processed);
        assert!(filters.author.is_none());
    }
}

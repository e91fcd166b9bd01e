//! Embedding pipeline
//!
//! Processes documents flagged `needs_embedding`: chunks them, calls the
//! embedding provider, and applies vector updates atomically per chunk.
//! Failed chunks are logged and skipped; each document stays
//! independently flagged, so partial progress is safe.

use recall_common::db::models::CostStatus;
use recall_common::db::{EmbeddingUpdate, Repository};
use recall_common::embeddings::{cost_for_tokens, Embedder};
use recall_common::errors::Result;
use recall_common::progress::{channels, ProgressBus, ProgressEvent};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Pipeline tuning knobs
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Documents pulled from the store per iteration
    pub batch_size: usize,

    /// Documents per provider call / transaction
    pub chunk_size: usize,

    /// Pause between chunks
    pub chunk_delay: Duration,

    /// Pause between drain-loop iterations
    pub drain_delay: Duration,

    /// Cost accounting rate
    pub cost_per_million_tokens: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            chunk_size: 10,
            chunk_delay: Duration::from_millis(400),
            drain_delay: Duration::from_millis(500),
            cost_per_million_tokens: 0.02,
        }
    }
}

/// Summary of one pipeline run
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub processed: usize,
    pub failed_chunks: usize,
    pub total_tokens: u64,
    pub estimated_cost: f64,
}

/// Embedding pipeline over the document store
pub struct EmbeddingPipeline {
    repository: Repository,
    embedder: Arc<dyn Embedder>,
    bus: ProgressBus,
    config: PipelineConfig,
}

impl EmbeddingPipeline {
    pub fn new(
        repository: Repository,
        embedder: Arc<dyn Embedder>,
        bus: ProgressBus,
        config: PipelineConfig,
    ) -> Self {
        Self {
            repository,
            embedder,
            bus,
            config,
        }
    }

    /// Process one batch of pending documents.
    ///
    /// Lightweight entry point for periodic runs.
    #[instrument(skip(self))]
    pub async fn process_pending(&self, limit: Option<usize>) -> Result<RunReport> {
        let limit = limit.unwrap_or(self.config.batch_size);
        let documents = self
            .repository
            .fetch_documents_needing_embedding(limit as u64)
            .await?;

        if documents.is_empty() {
            debug!("No documents pending embedding");
            return Ok(RunReport::default());
        }

        let scope_id = format!("embed_{}", Uuid::new_v4());
        let total = documents.len();
        let mut report = RunReport::default();

        self.process_documents(documents, total, 0, &scope_id, None, &mut report)
            .await;

        self.finish_run(&scope_id, None, &report, total).await;
        Ok(report)
    }

    /// Loop until no pending documents remain.
    ///
    /// Used after ingestion to guarantee eventual coverage; progress is
    /// reported on the caller's scope so it lands on the same stream.
    #[instrument(skip(self, scope_id, user_id))]
    pub async fn drain_all_pending(
        &self,
        scope_id: Option<String>,
        user_id: Option<String>,
    ) -> Result<RunReport> {
        let scope_id = scope_id.unwrap_or_else(|| format!("embed_{}", Uuid::new_v4()));
        let mut report = RunReport::default();
        let mut grand_total = 0usize;
        let mut first_iteration = true;

        loop {
            if !first_iteration {
                tokio::time::sleep(self.config.drain_delay).await;
            }
            first_iteration = false;

            // A fetch failure here is fatal: the store is unreachable
            let documents = self
                .repository
                .fetch_documents_needing_embedding(self.config.batch_size as u64)
                .await?;

            if documents.is_empty() {
                break;
            }

            // Running total: known-remaining plus what we already did
            grand_total = report.processed + documents.len();

            self.process_documents(
                documents,
                grand_total,
                report.processed,
                &scope_id,
                user_id.clone(),
                &mut report,
            )
            .await;
        }

        self.finish_run(&scope_id, user_id, &report, grand_total).await;
        Ok(report)
    }

    /// Embed a set of documents in paced transactional chunks
    async fn process_documents(
        &self,
        documents: Vec<recall_common::db::models::Document>,
        total: usize,
        already_processed: usize,
        scope_id: &str,
        user_id: Option<String>,
        report: &mut RunReport,
    ) {
        let start = Instant::now();
        let failed_before = report.failed_chunks;
        let mut processed = already_processed;

        for (chunk_index, chunk) in documents.chunks(self.config.chunk_size).enumerate() {
            if chunk_index > 0 {
                tokio::time::sleep(self.config.chunk_delay).await;
            }

            let texts: Vec<String> = chunk.iter().map(|d| d.content.clone()).collect();

            let outputs = match self.embedder.embed_batch(&texts).await {
                Ok(outputs) => outputs,
                Err(e) => {
                    // Chunk failures are swallowed after logging; every
                    // document stays flagged for the next run
                    error!(
                        error = %e,
                        chunk_size = chunk.len(),
                        "Embedding chunk failed, continuing with next chunk"
                    );
                    report.failed_chunks += 1;
                    continue;
                }
            };

            let chunk_tokens: u64 = outputs.iter().map(|o| o.tokens as u64).sum();

            let updates: Vec<EmbeddingUpdate> = chunk
                .iter()
                .zip(outputs.into_iter())
                .map(|(doc, output)| EmbeddingUpdate {
                    document_id: doc.document_id.clone(),
                    vector: output.vector,
                    tokens: output.tokens as i32,
                })
                .collect();

            if let Err(e) = self
                .repository
                .batch_update_embeddings(
                    &updates,
                    self.embedder.model_name(),
                    self.embedder.dimension(),
                )
                .await
            {
                error!(error = %e, "Failed to store embedding chunk, continuing");
                report.failed_chunks += 1;
                continue;
            }

            processed += updates.len();
            report.processed = processed;
            report.total_tokens += chunk_tokens;

            // Cap at 99 until the final complete event
            let percentage = if total == 0 {
                99
            } else {
                ((processed * 100 / total) as u32).min(99)
            };

            self.bus.publish(ProgressEvent::new(
                channels::EMBEDDINGS_PROGRESS,
                scope_id,
                user_id.clone(),
                serde_json::json!({
                    "stage": "embedding",
                    "processed": processed,
                    "total": total,
                    "percentage": percentage,
                }),
            ));
        }

        recall_common::metrics::record_embedding_batch(
            start.elapsed().as_secs_f64(),
            (report.processed - already_processed) as u64,
            (report.failed_chunks - failed_before) as u64,
        );
    }

    /// Emit the terminal progress event and write the cost row
    async fn finish_run(
        &self,
        scope_id: &str,
        user_id: Option<String>,
        report: &RunReport,
        total: usize,
    ) {
        let estimated_cost =
            cost_for_tokens(report.total_tokens, self.config.cost_per_million_tokens);

        self.bus.publish(ProgressEvent::new(
            channels::EMBEDDINGS_PROGRESS,
            scope_id,
            user_id,
            serde_json::json!({
                "stage": "complete",
                "processed": report.processed,
                "total": total,
                "percentage": 100,
                "failedChunks": report.failed_chunks,
            }),
        ));

        if report.processed == 0 && report.failed_chunks == 0 {
            return;
        }

        let status = if report.failed_chunks == 0 {
            CostStatus::Completed
        } else if report.processed > 0 {
            CostStatus::Partial
        } else {
            CostStatus::Failed
        };

        let batch_id = format!("batch_{}", Uuid::new_v4());
        if let Err(e) = self
            .repository
            .insert_embedding_cost(
                &batch_id,
                self.embedder.model_name(),
                report.processed as i32,
                report.total_tokens as i64,
                estimated_cost,
                status,
            )
            .await
        {
            warn!(error = %e, "Failed to record embedding cost row");
        }

        info!(
            processed = report.processed,
            failed_chunks = report.failed_chunks,
            tokens = report.total_tokens,
            cost = estimated_cost,
            "Embedding run finished"
        );
    }

    /// Provider health, surfaced by the status endpoint
    pub async fn provider_healthy(&self) -> bool {
        self.embedder.health_check().await.is_ok()
    }

    pub fn model_name(&self) -> &str {
        self.embedder.model_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_matches_pacing_contract() {
        let config = PipelineConfig::default();
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.chunk_size, 10);
        assert!(config.chunk_delay >= Duration::from_millis(300));
        assert!(config.chunk_delay <= Duration::from_millis(500));
        assert_eq!(config.drain_delay, Duration::from_millis(500));
    }

    #[test]
    fn test_percentage_capped_below_complete() {
        // Mirrors the in-loop computation: even a fully processed batch
        // reports at most 99 before the terminal event
        let processed = 50usize;
        let total = 50usize;
        let percentage = ((processed * 100 / total) as u32).min(99);
        assert_eq!(percentage, 99);
    }
}

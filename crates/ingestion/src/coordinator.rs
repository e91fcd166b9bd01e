//! Ingestion coordinator
//!
//! Orchestrates full and incremental syncs for a (user, source): fetch,
//! normalize, store with dedup by `document_id`, then hand off to the
//! embedding pipeline. The call is asynchronous: the sync log row is
//! created up front, the id returns immediately, and the run proceeds on
//! a background task.

use crate::connector::{ConnectorRegistry, FetchOptions};
use crate::errors::IngestError;
use chrono::{DateTime, Utc};
use recall_common::db::models::{Source, SyncLog, SyncStatus};
use recall_common::db::{CreateOutcome, NewDocument, Repository};
use recall_common::errors::{AppError, Result};
use recall_common::progress::{channels, ProgressBus, ProgressEvent};
use recall_embedding_worker::EmbeddingPipeline;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Progress is emitted at every phase boundary and every this many
/// documents within a phase
const PROGRESS_EVERY: usize = 10;

/// Sync mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    Full,
    Incremental,
}

impl SyncMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "full" => Some(SyncMode::Full),
            "incremental" => Some(SyncMode::Incremental),
            _ => None,
        }
    }
}

/// Linear phase machine; any phase may transition to failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncPhase {
    Fetching,
    Normalizing,
    Storing,
    EmbeddingStart,
    Embedding,
    Complete,
}

impl SyncPhase {
    fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::Fetching => "fetching",
            SyncPhase::Normalizing => "normalizing",
            SyncPhase::Storing => "storing",
            SyncPhase::EmbeddingStart => "embedding_start",
            SyncPhase::Embedding => "embedding",
            SyncPhase::Complete => "complete",
        }
    }

    /// Base percentage when the phase begins
    fn base_percentage(&self) -> u32 {
        match self {
            SyncPhase::Fetching => 5,
            SyncPhase::Normalizing => 20,
            SyncPhase::Storing => 40,
            SyncPhase::EmbeddingStart => 70,
            SyncPhase::Embedding => 75,
            SyncPhase::Complete => 100,
        }
    }
}

/// Running counters reported with progress and persisted at completion
#[derive(Debug, Clone, Copy, Default)]
struct Counters {
    fetched: usize,
    stored: usize,
    skipped: usize,
    failed: usize,
}

/// Ingestion coordinator service
pub struct SyncCoordinator {
    repository: Repository,
    connectors: ConnectorRegistry,
    pipeline: Arc<EmbeddingPipeline>,
    bus: ProgressBus,
    shutdown: CancellationToken,
}

impl SyncCoordinator {
    pub fn new(
        repository: Repository,
        connectors: ConnectorRegistry,
        pipeline: Arc<EmbeddingPipeline>,
        bus: ProgressBus,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            repository,
            connectors,
            pipeline,
            bus,
            shutdown,
        }
    }

    /// Start a sync run and return its id immediately.
    ///
    /// The run continues on a background task; progress streams over the
    /// bus and the final state lands in the sync log.
    pub async fn start_sync(
        self: &Arc<Self>,
        user_id: &str,
        source: Source,
        mode: SyncMode,
        since: Option<DateTime<Utc>>,
    ) -> Result<Uuid> {
        if user_id.is_empty() {
            return Err(AppError::MissingField {
                field: "userId".to_string(),
            });
        }

        let connector = self
            .connectors
            .get(source)
            .ok_or_else(|| AppError::Validation {
                message: format!("No connector registered for source {}", source),
                field: Some("source".to_string()),
            })?;

        let log = self.repository.create_sync_log(user_id, source).await?;
        let sync_id = log.id;

        info!(sync_id = %sync_id, user_id = %user_id, source = %source, ?mode, "Sync started");

        let coordinator = Arc::clone(self);
        let user_id = user_id.to_string();
        let cancel = self.shutdown.child_token();

        tokio::spawn(async move {
            let started = Instant::now();
            let result = coordinator
                .run_sync(sync_id, &user_id, source, connector, mode, since, &cancel)
                .await;

            match result {
                Ok(counters) => {
                    recall_common::metrics::record_sync(
                        started.elapsed().as_secs_f64(),
                        source.as_str(),
                        counters.stored as u64,
                        counters.skipped as u64,
                    );
                }
                Err(e) => {
                    let message = match &e {
                        IngestError::Cancelled => "cancelled".to_string(),
                        other => other.to_string(),
                    };
                    error!(sync_id = %sync_id, error = %message, "Sync failed");

                    coordinator.fail_sync(sync_id, &user_id, source, &message).await;
                }
            }
        });

        Ok(sync_id)
    }

    /// Run one sync to completion; partial progress is preserved since
    /// stored documents remain on failure
    #[instrument(skip_all, fields(sync_id = %sync_id, source = %source))]
    async fn run_sync(
        &self,
        sync_id: Uuid,
        user_id: &str,
        source: Source,
        connector: Arc<dyn crate::connector::SourceConnector>,
        mode: SyncMode,
        since: Option<DateTime<Utc>>,
        cancel: &CancellationToken,
    ) -> std::result::Result<Counters, IngestError> {
        let mut counters = Counters::default();

        connector.authenticate(user_id).await?;

        // ---- fetching ------------------------------------------------
        self.emit_progress(sync_id, user_id, source, SyncPhase::Fetching, &counters, None);

        let cursor = self.resolve_cursor(user_id, source, mode, since).await?;

        let raw_records = tokio::select! {
            _ = cancel.cancelled() => return Err(IngestError::Cancelled),
            records = self.fetch_records(&connector, user_id, mode, cursor) => records?,
        };

        counters.fetched = raw_records.len();
        info!(fetched = counters.fetched, "Fetch phase complete");

        // ---- normalizing ---------------------------------------------
        self.emit_progress(sync_id, user_id, source, SyncPhase::Normalizing, &counters, None);

        let mut documents: Vec<NewDocument> = Vec::with_capacity(raw_records.len());
        for (index, raw) in raw_records.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(IngestError::Cancelled);
            }

            match connector.normalize(user_id, raw) {
                Ok(Some(doc)) => documents.push(doc),
                Ok(None) => {
                    // Dropped with a warning by the connector
                    counters.skipped += 1;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to normalize record");
                    counters.failed += 1;
                }
            }

            if (index + 1) % PROGRESS_EVERY == 0 {
                self.emit_progress(
                    sync_id,
                    user_id,
                    source,
                    SyncPhase::Normalizing,
                    &counters,
                    Some((index + 1, raw_records.len())),
                );
            }
        }

        // ---- storing -------------------------------------------------
        self.emit_progress(sync_id, user_id, source, SyncPhase::Storing, &counters, None);

        let total_to_store = documents.len();
        for (index, doc) in documents.into_iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(IngestError::Cancelled);
            }

            let document_id = doc.document_id.clone();
            match self.repository.create_document(doc).await {
                Ok(CreateOutcome::Inserted(_)) => counters.stored += 1,
                Ok(CreateOutcome::Duplicate) => counters.skipped += 1,
                Err(e) => {
                    warn!(document_id = %document_id, error = %e, "Failed to store document");
                    counters.failed += 1;
                }
            }

            if (index + 1) % PROGRESS_EVERY == 0 {
                self.emit_progress(
                    sync_id,
                    user_id,
                    source,
                    SyncPhase::Storing,
                    &counters,
                    Some((index + 1, total_to_store)),
                );
            }
        }

        info!(
            stored = counters.stored,
            skipped = counters.skipped,
            failed = counters.failed,
            "Store phase complete"
        );

        // ---- embedding -----------------------------------------------
        self.emit_progress(sync_id, user_id, source, SyncPhase::EmbeddingStart, &counters, None);
        self.emit_progress(sync_id, user_id, source, SyncPhase::Embedding, &counters, None);

        // Same scope id: embedding progress lands on this sync's stream
        self.pipeline
            .drain_all_pending(Some(sync_id.to_string()), Some(user_id.to_string()))
            .await
            .map_err(IngestError::App)?;

        // ---- complete ------------------------------------------------
        self.repository
            .complete_sync_log(
                sync_id,
                recall_common::db::SyncOutcome {
                    status: SyncStatus::Success,
                    documents_fetched: counters.fetched as i32,
                    documents_stored: counters.stored as i32,
                    documents_skipped: counters.skipped as i32,
                    documents_failed: counters.failed as i32,
                    last_sync_timestamp: Some(Utc::now()),
                    error_message: None,
                },
            )
            .await
            .map_err(IngestError::App)?;

        self.bus.publish(ProgressEvent::new(
            channels::sync_complete(source),
            sync_id.to_string(),
            Some(user_id.to_string()),
            serde_json::json!({
                "stage": SyncPhase::Complete.as_str(),
                "percentage": SyncPhase::Complete.base_percentage(),
                "fetched": counters.fetched,
                "stored": counters.stored,
                "skipped": counters.skipped,
                "failed": counters.failed,
            }),
        ));

        info!("Sync complete");
        Ok(counters)
    }

    /// Translate mode and explicit cursor into the effective lower bound
    async fn resolve_cursor(
        &self,
        user_id: &str,
        source: Source,
        mode: SyncMode,
        since: Option<DateTime<Utc>>,
    ) -> std::result::Result<Option<DateTime<Utc>>, IngestError> {
        match (mode, since) {
            (_, Some(explicit)) => Ok(Some(explicit)),
            (SyncMode::Full, None) => Ok(None),
            (SyncMode::Incremental, None) => {
                // Most recent successful run's cursor
                let last = self
                    .repository
                    .last_successful_sync(user_id, source)
                    .await
                    .map_err(IngestError::App)?;
                Ok(last
                    .as_ref()
                    .and_then(|log: &SyncLog| log.last_sync_timestamp)
                    .map(|t| t.with_timezone(&Utc)))
            }
        }
    }

    async fn fetch_records(
        &self,
        connector: &Arc<dyn crate::connector::SourceConnector>,
        user_id: &str,
        mode: SyncMode,
        cursor: Option<DateTime<Utc>>,
    ) -> std::result::Result<Vec<serde_json::Value>, IngestError> {
        match (mode, cursor) {
            (SyncMode::Incremental, Some(since)) => connector.fetch_new(user_id, since).await,
            (_, since) => {
                let options = FetchOptions {
                    since,
                    max_records: None,
                };
                connector.fetch_all(user_id, &options).await
            }
        }
    }

    /// Transition the log to failed and emit the error event
    async fn fail_sync(&self, sync_id: Uuid, user_id: &str, source: Source, message: &str) {
        let outcome = recall_common::db::SyncOutcome {
            status: SyncStatus::Failed,
            documents_fetched: 0,
            documents_stored: 0,
            documents_skipped: 0,
            documents_failed: 0,
            last_sync_timestamp: None,
            error_message: Some(message.to_string()),
        };

        if let Err(e) = self.repository.complete_sync_log(sync_id, outcome).await {
            error!(sync_id = %sync_id, error = %e, "Failed to record sync failure");
        }

        self.bus.publish(ProgressEvent::new(
            channels::sync_error(source),
            sync_id.to_string(),
            Some(user_id.to_string()),
            serde_json::json!({
                "stage": "failed",
                "error": message,
            }),
        ));
    }

    fn emit_progress(
        &self,
        sync_id: Uuid,
        user_id: &str,
        source: Source,
        phase: SyncPhase,
        counters: &Counters,
        within_phase: Option<(usize, usize)>,
    ) {
        let percentage = phase_percentage(phase, within_phase);
        let message = match within_phase {
            Some((done, total)) => format!("{} ({}/{})", phase.as_str(), done, total),
            None => phase.as_str().to_string(),
        };

        self.bus.publish(ProgressEvent::new(
            channels::sync_progress(source),
            sync_id.to_string(),
            Some(user_id.to_string()),
            serde_json::json!({
                "stage": phase.as_str(),
                "message": message,
                "percentage": percentage,
                "fetched": counters.fetched,
                "stored": counters.stored,
                "skipped": counters.skipped,
                "failed": counters.failed,
            }),
        ));
    }

    /// Status row for the API
    pub async fn sync_status(&self, sync_id: Uuid) -> Result<SyncLog> {
        self.repository
            .find_sync_log(sync_id)
            .await?
            .ok_or_else(|| AppError::SyncNotFound {
                id: sync_id.to_string(),
            })
    }
}

/// Interpolate within a phase's percentage band
fn phase_percentage(phase: SyncPhase, within_phase: Option<(usize, usize)>) -> u32 {
    let base = phase.base_percentage();
    let next = match phase {
        SyncPhase::Fetching => SyncPhase::Normalizing.base_percentage(),
        SyncPhase::Normalizing => SyncPhase::Storing.base_percentage(),
        SyncPhase::Storing => SyncPhase::EmbeddingStart.base_percentage(),
        SyncPhase::EmbeddingStart => SyncPhase::Embedding.base_percentage(),
        SyncPhase::Embedding => 99,
        SyncPhase::Complete => 100,
    };

    match within_phase {
        Some((done, total)) if total > 0 => {
            let span = next.saturating_sub(base);
            base + (span * done as u32 / total as u32).min(span)
        }
        _ => base,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parse() {
        assert_eq!(SyncMode::parse("full"), Some(SyncMode::Full));
        assert_eq!(SyncMode::parse("incremental"), Some(SyncMode::Incremental));
        assert_eq!(SyncMode::parse("other"), None);
    }

    #[test]
    fn test_phase_order_is_linear() {
        let phases = [
            SyncPhase::Fetching,
            SyncPhase::Normalizing,
            SyncPhase::Storing,
            SyncPhase::EmbeddingStart,
            SyncPhase::Embedding,
            SyncPhase::Complete,
        ];

        let mut last = 0;
        for phase in phases {
            assert!(phase.base_percentage() > last || phase == SyncPhase::Fetching);
            last = phase.base_percentage();
        }
        assert_eq!(last, 100);
    }

    #[test]
    fn test_within_phase_percentage_stays_in_band() {
        let p0 = phase_percentage(SyncPhase::Storing, Some((0, 100)));
        let p_half = phase_percentage(SyncPhase::Storing, Some((50, 100)));
        let p_full = phase_percentage(SyncPhase::Storing, Some((100, 100)));

        assert_eq!(p0, 40);
        assert!(p0 <= p_half && p_half <= p_full);
        assert!(p_full <= 70);
    }

    #[test]
    fn test_embedding_band_caps_at_99() {
        assert!(phase_percentage(SyncPhase::Embedding, Some((1000, 1000))) <= 99);
    }
}

//! Repository pattern for database operations
//!
//! Provides a clean interface for all data access operations with proper
//! error handling and transaction support. Vector operations go through
//! raw SQL with `$n::vector` parameters; user-influenced values never get
//! interpolated into query text.

use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbBackend, EntityTrait, FromQueryResult,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, SqlErr, Statement,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Input for document creation
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub document_id: String,
    pub user_id: String,
    pub source: Source,
    pub doc_type: DocType,
    pub content: String,
    pub title: Option<String>,
    pub author: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

/// Outcome of an insert keyed by `document_id`
#[derive(Debug)]
pub enum CreateOutcome {
    Inserted(Document),
    /// Unique violation on `document_id`; not an error, re-ingest is idempotent
    Duplicate,
}

/// One embedding write within a transactional chunk
#[derive(Debug, Clone)]
pub struct EmbeddingUpdate {
    pub document_id: String,
    pub vector: Vec<f32>,
    pub tokens: i32,
}

/// Filters composed as parameterized predicates
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub source: Option<Source>,
    pub doc_type: Option<String>,
    pub author: Option<String>,
    pub time_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

/// Result from search operations
#[derive(Debug, Clone, Serialize, Deserialize, FromQueryResult)]
pub struct SearchHit {
    pub document_id: String,
    pub source: String,
    pub doc_type: String,
    pub title: Option<String>,
    pub author: Option<String>,
    pub content: String,
    pub timestamp: sea_orm::prelude::DateTimeWithTimeZone,
    pub metadata: serde_json::Value,
    /// Cosine similarity, `1 - distance`
    pub similarity: f64,
    /// Lexical boost applied by hybrid search (0 for plain search)
    pub keyword_boost: f64,
}

/// Final counters for a completed sync run
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub status: SyncStatus,
    pub documents_fetched: i32,
    pub documents_stored: i32,
    pub documents_skipped: i32,
    pub documents_failed: i32,
    pub last_sync_timestamp: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

/// Aggregate numbers for the embedding status endpoints
#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingStats {
    pub total_documents: i64,
    pub embedded_documents: i64,
    pub pending_documents: i64,
    pub embedded_last_day: i64,
    pub total_tokens: i64,
    pub estimated_cost: f64,
    /// Coverage broken down by the model that produced each vector
    pub models: Vec<PerModelStats>,
}

/// Embedding coverage for one model
#[derive(Debug, Clone, Serialize, FromQueryResult)]
pub struct PerModelStats {
    pub model: String,
    pub document_count: i64,
    pub total_tokens: i64,
}

/// Format a vector as the pgvector text literal, passed as a `$n::vector`
/// parameter
fn vector_param(vector: &[f32]) -> String {
    format!(
        "[{}]",
        vector
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(",")
    )
}

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> &sea_orm::DatabaseConnection {
        self.pool.conn()
    }

    // ========================================================================
    // Health Check
    // ========================================================================

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    // ========================================================================
    // Document Operations
    // ========================================================================

    /// Insert a document; unique violations on `document_id` surface as
    /// `CreateOutcome::Duplicate`
    pub async fn create_document(&self, doc: NewDocument) -> Result<CreateOutcome> {
        let now = Utc::now();
        let needs_embedding = !doc.content.is_empty();

        let model = DocumentActiveModel {
            id: Set(Uuid::new_v4()),
            document_id: Set(doc.document_id),
            user_id: Set(doc.user_id),
            source: Set(doc.source.as_str().to_string()),
            doc_type: Set(doc.doc_type.as_str().to_string()),
            content: Set(doc.content),
            title: Set(doc.title),
            author: Set(doc.author),
            timestamp: Set(doc.timestamp.into()),
            metadata: Set(doc.metadata),
            embedding: Set(None),
            needs_embedding: Set(needs_embedding),
            embedding_model: Set(None),
            embedding_tokens: Set(None),
            embedding_generated_at: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        match model.insert(self.conn()).await {
            Ok(inserted) => Ok(CreateOutcome::Inserted(inserted)),
            Err(err) => match err.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(_)) => Ok(CreateOutcome::Duplicate),
                _ => Err(err.into()),
            },
        }
    }

    /// Find a document by its globally unique `document_id`
    pub async fn find_document_by_id(&self, document_id: &str) -> Result<Option<Document>> {
        DocumentEntity::find()
            .filter(DocumentColumn::DocumentId.eq(document_id))
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Total persisted documents
    pub async fn count_documents(&self) -> Result<u64> {
        DocumentEntity::find()
            .count(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Documents still waiting on a vector
    pub async fn count_documents_needing_embedding(&self) -> Result<u64> {
        DocumentEntity::find()
            .filter(DocumentColumn::NeedsEmbedding.eq(true))
            .filter(DocumentColumn::Content.ne(""))
            .count(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Documents flagged for embedding, oldest first
    pub async fn fetch_documents_needing_embedding(&self, limit: u64) -> Result<Vec<Document>> {
        DocumentEntity::find()
            .filter(DocumentColumn::NeedsEmbedding.eq(true))
            .filter(DocumentColumn::Content.ne(""))
            .order_by_asc(DocumentColumn::CreatedAt)
            .limit(limit)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Apply a chunk of embedding updates atomically.
    ///
    /// Either every update in the chunk lands or none does; documents are
    /// flagged `needs_embedding = false` in the same statement.
    pub async fn batch_update_embeddings(
        &self,
        updates: &[EmbeddingUpdate],
        model: &str,
        expected_dimensions: usize,
    ) -> Result<()> {
        for update in updates {
            if update.vector.len() != expected_dimensions {
                return Err(AppError::DimensionMismatch {
                    expected: expected_dimensions,
                    actual: update.vector.len(),
                });
            }
        }

        let txn = self.conn().begin().await?;

        for update in updates {
            let stmt = Statement::from_sql_and_values(
                DbBackend::Postgres,
                r#"
                UPDATE documents
                SET embedding = $1::vector,
                    needs_embedding = FALSE,
                    embedding_model = $2,
                    embedding_tokens = $3,
                    embedding_generated_at = NOW(),
                    updated_at = NOW()
                WHERE document_id = $4
                "#,
                vec![
                    vector_param(&update.vector).into(),
                    model.into(),
                    update.tokens.into(),
                    update.document_id.clone().into(),
                ],
            );

            txn.execute(stmt).await?;
        }

        txn.commit().await?;
        Ok(())
    }

    /// Flag documents for re-embedding; `None` flags every document with
    /// content. Returns the number of rows flagged.
    pub async fn mark_for_reembedding(&self, document_ids: Option<&[String]>) -> Result<u64> {
        match document_ids {
            Some(ids) => {
                let txn = self.conn().begin().await?;
                let mut flagged = 0;

                for id in ids {
                    let stmt = Statement::from_sql_and_values(
                        DbBackend::Postgres,
                        r#"
                        UPDATE documents
                        SET needs_embedding = TRUE, updated_at = NOW()
                        WHERE document_id = $1 AND content <> ''
                        "#,
                        vec![id.clone().into()],
                    );
                    flagged += txn.execute(stmt).await?.rows_affected();
                }

                txn.commit().await?;
                Ok(flagged)
            }
            None => {
                let stmt = Statement::from_string(
                    DbBackend::Postgres,
                    r#"
                    UPDATE documents
                    SET needs_embedding = TRUE, updated_at = NOW()
                    WHERE content <> ''
                    "#,
                );
                let result = self.conn().execute(stmt).await?;
                Ok(result.rows_affected())
            }
        }
    }

    // ========================================================================
    // Search Operations
    // ========================================================================

    /// Cosine-distance search over a user's documents
    pub async fn search(
        &self,
        user_id: &str,
        embedding: &[f32],
        filters: &SearchFilters,
        limit: usize,
        min_similarity: f64,
    ) -> Result<Vec<SearchHit>> {
        let mut sql = String::from(
            r#"
            SELECT document_id, source, doc_type, title, author, content,
                   timestamp, metadata,
                   1 - (embedding <=> $1::vector) AS similarity,
                   0::float8 AS keyword_boost
            FROM documents
            WHERE user_id = $2
              AND embedding IS NOT NULL
              AND 1 - (embedding <=> $1::vector) >= $3
            "#,
        );

        let mut values: Vec<sea_orm::Value> = vec![
            vector_param(embedding).into(),
            user_id.into(),
            min_similarity.into(),
        ];

        append_filter_predicates(&mut sql, &mut values, filters);

        values.push((limit as i64).into());
        sql.push_str(&format!(
            " ORDER BY embedding <=> $1::vector LIMIT ${}",
            values.len()
        ));

        let stmt = Statement::from_sql_and_values(DbBackend::Postgres, &sql, values);
        SearchHit::find_by_statement(stmt)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Hybrid search: `similarity + keyword_boost`, where the boost is a
    /// small constant applied when any keyword substring-matches the
    /// document. Sorted descending by the sum.
    pub async fn hybrid_search(
        &self,
        user_id: &str,
        embedding: &[f32],
        keywords: &[String],
        filters: &SearchFilters,
        limit: usize,
        min_similarity: f64,
    ) -> Result<Vec<SearchHit>> {
        if keywords.is_empty() {
            return self
                .search(user_id, embedding, filters, limit, min_similarity)
                .await;
        }

        let mut values: Vec<sea_orm::Value> = vec![
            vector_param(embedding).into(),
            user_id.into(),
            min_similarity.into(),
        ];

        // One ILIKE pair per keyword, OR-joined; only placeholders reach
        // the query text
        let mut keyword_clauses = Vec::with_capacity(keywords.len());
        for keyword in keywords {
            values.push(format!("%{}%", keyword).into());
            let n = values.len();
            keyword_clauses.push(format!(
                "(content ILIKE ${n} OR COALESCE(title, '') ILIKE ${n})"
            ));
        }
        let boost_expr = format!(
            "CASE WHEN {} THEN 0.1 ELSE 0 END",
            keyword_clauses.join(" OR ")
        );

        let mut sql = format!(
            r#"
            SELECT document_id, source, doc_type, title, author, content,
                   timestamp, metadata,
                   1 - (embedding <=> $1::vector) AS similarity,
                   ({boost_expr})::float8 AS keyword_boost,
                   1 - (embedding <=> $1::vector) + ({boost_expr}) AS score
            FROM documents
            WHERE user_id = $2
              AND embedding IS NOT NULL
              AND 1 - (embedding <=> $1::vector) >= $3
            "#,
        );

        append_filter_predicates(&mut sql, &mut values, filters);

        values.push((limit as i64).into());
        sql.push_str(&format!(" ORDER BY score DESC LIMIT ${}", values.len()));

        let stmt = Statement::from_sql_and_values(DbBackend::Postgres, &sql, values);
        SearchHit::find_by_statement(stmt)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Nearest neighbours of a stored document, excluding the seed itself
    pub async fn find_similar(
        &self,
        user_id: &str,
        document_id: &str,
        k: usize,
    ) -> Result<Vec<SearchHit>> {
        let seed = self
            .find_document_by_id(document_id)
            .await?
            .ok_or_else(|| AppError::DocumentNotFound {
                id: document_id.to_string(),
            })?;

        if seed.embedding.is_none() {
            return Ok(Vec::new());
        }

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            SELECT d.document_id, d.source, d.doc_type, d.title, d.author,
                   d.content, d.timestamp, d.metadata,
                   1 - (d.embedding <=> seed.embedding) AS similarity,
                   0::float8 AS keyword_boost
            FROM documents d,
                 (SELECT embedding FROM documents WHERE document_id = $1) seed
            WHERE d.user_id = $2
              AND d.document_id <> $1
              AND d.embedding IS NOT NULL
            ORDER BY d.embedding <=> seed.embedding
            LIMIT $3
            "#,
            vec![
                document_id.into(),
                user_id.into(),
                (k as i64).into(),
            ],
        );

        SearchHit::find_by_statement(stmt)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Sync Log Operations
    // ========================================================================

    /// Open an in_progress sync log row
    pub async fn create_sync_log(&self, user_id: &str, source: Source) -> Result<SyncLog> {
        let log = SyncLogActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id.to_string()),
            source: Set(source.as_str().to_string()),
            status: Set(String::from(SyncStatus::InProgress)),
            started_at: Set(Utc::now().into()),
            completed_at: Set(None),
            documents_fetched: Set(0),
            documents_stored: Set(0),
            documents_skipped: Set(0),
            documents_failed: Set(0),
            last_sync_timestamp: Set(None),
            error_message: Set(None),
        };

        log.insert(self.conn()).await.map_err(Into::into)
    }

    /// Find sync log by ID
    pub async fn find_sync_log(&self, id: Uuid) -> Result<Option<SyncLog>> {
        SyncLogEntity::find_by_id(id)
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Transition a sync log to a terminal status with final counts.
    ///
    /// Terminal rows are immutable: completing an already terminal row is
    /// a no-op that returns the stored row.
    pub async fn complete_sync_log(&self, id: Uuid, outcome: SyncOutcome) -> Result<SyncLog> {
        let existing = self
            .find_sync_log(id)
            .await?
            .ok_or_else(|| AppError::SyncNotFound { id: id.to_string() })?;

        if existing.is_terminal() {
            return Ok(existing);
        }

        let mut log: SyncLogActiveModel = existing.into();
        log.status = Set(String::from(outcome.status));
        log.completed_at = Set(Some(Utc::now().into()));
        log.documents_fetched = Set(outcome.documents_fetched);
        log.documents_stored = Set(outcome.documents_stored);
        log.documents_skipped = Set(outcome.documents_skipped);
        log.documents_failed = Set(outcome.documents_failed);
        log.last_sync_timestamp = Set(outcome.last_sync_timestamp.map(Into::into));
        log.error_message = Set(outcome.error_message);

        log.update(self.conn()).await.map_err(Into::into)
    }

    /// Recent sync logs, optionally filtered by user and source
    pub async fn recent_sync_logs(
        &self,
        user_id: Option<&str>,
        source: Option<Source>,
        limit: u64,
    ) -> Result<Vec<SyncLog>> {
        let mut query = SyncLogEntity::find().order_by_desc(SyncLogColumn::StartedAt);

        if let Some(user_id) = user_id {
            query = query.filter(SyncLogColumn::UserId.eq(user_id));
        }
        if let Some(source) = source {
            query = query.filter(SyncLogColumn::Source.eq(source.as_str()));
        }

        query.limit(limit).all(self.conn()).await.map_err(Into::into)
    }

    /// Resume cursor: the most recent successful run for (user, source)
    pub async fn last_successful_sync(
        &self,
        user_id: &str,
        source: Source,
    ) -> Result<Option<SyncLog>> {
        SyncLogEntity::find()
            .filter(SyncLogColumn::UserId.eq(user_id))
            .filter(SyncLogColumn::Source.eq(source.as_str()))
            .filter(SyncLogColumn::Status.eq(String::from(SyncStatus::Success)))
            .order_by_desc(SyncLogColumn::CompletedAt)
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Embedding Cost Operations
    // ========================================================================

    /// Record one embedding batch in the audit trail
    pub async fn insert_embedding_cost(
        &self,
        batch_id: &str,
        model: &str,
        document_count: i32,
        total_tokens: i64,
        estimated_cost: f64,
        status: CostStatus,
    ) -> Result<EmbeddingCost> {
        let cost = EmbeddingCostActiveModel {
            id: Set(Uuid::new_v4()),
            batch_id: Set(batch_id.to_string()),
            model: Set(model.to_string()),
            document_count: Set(document_count),
            total_tokens: Set(total_tokens),
            estimated_cost: Set(estimated_cost),
            status: Set(String::from(status)),
            created_at: Set(Utc::now().into()),
        };

        cost.insert(self.conn()).await.map_err(Into::into)
    }

    /// Aggregate embedding coverage and cost numbers, with a per-model
    /// breakdown of generated vectors
    pub async fn embedding_stats(&self) -> Result<EmbeddingStats> {
        #[derive(FromQueryResult)]
        struct StatsRow {
            total_documents: i64,
            embedded_documents: i64,
            pending_documents: i64,
            embedded_last_day: i64,
        }

        #[derive(FromQueryResult)]
        struct CostRow {
            total_tokens: Option<i64>,
            estimated_cost: Option<f64>,
        }

        // Interval arithmetic stays parameterized
        let stats_stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            SELECT
                COUNT(*) AS total_documents,
                COUNT(*) FILTER (WHERE embedding IS NOT NULL) AS embedded_documents,
                COUNT(*) FILTER (WHERE needs_embedding) AS pending_documents,
                COUNT(*) FILTER (
                    WHERE embedding_generated_at > NOW() - INTERVAL '1 day' * $1
                ) AS embedded_last_day
            FROM documents
            "#,
            vec![1i32.into()],
        );

        let models_stmt = Statement::from_string(
            DbBackend::Postgres,
            r#"
            SELECT embedding_model AS model,
                   COUNT(*) AS document_count,
                   COALESCE(SUM(embedding_tokens), 0) AS total_tokens
            FROM documents
            WHERE embedding_model IS NOT NULL
            GROUP BY embedding_model
            ORDER BY embedding_model
            "#,
        );

        let cost_stmt = Statement::from_string(
            DbBackend::Postgres,
            r#"
            SELECT SUM(total_tokens) AS total_tokens,
                   SUM(estimated_cost) AS estimated_cost
            FROM embedding_costs
            "#,
        );

        let stats = StatsRow::find_by_statement(stats_stmt)
            .one(self.conn())
            .await?
            .ok_or_else(|| AppError::Internal {
                message: "Stats query returned no row".to_string(),
            })?;

        let models = PerModelStats::find_by_statement(models_stmt)
            .all(self.conn())
            .await?;

        let costs = CostRow::find_by_statement(cost_stmt)
            .one(self.conn())
            .await?;

        Ok(EmbeddingStats {
            total_documents: stats.total_documents,
            embedded_documents: stats.embedded_documents,
            pending_documents: stats.pending_documents,
            embedded_last_day: stats.embedded_last_day,
            total_tokens: costs.as_ref().and_then(|c| c.total_tokens).unwrap_or(0),
            estimated_cost: costs.and_then(|c| c.estimated_cost).unwrap_or(0.0),
            models,
        })
    }

    // ========================================================================
    // Conversation Operations
    // ========================================================================

    /// Allocate a new conversation
    pub async fn create_conversation(
        &self,
        user_id: &str,
        title: Option<String>,
    ) -> Result<Conversation> {
        let now = Utc::now();
        let conversation = ConversationActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id.to_string()),
            title: Set(title),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        conversation.insert(self.conn()).await.map_err(Into::into)
    }

    /// Find conversation by ID
    pub async fn find_conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        ConversationEntity::find_by_id(id)
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Append a query/answer pair to a conversation
    pub async fn append_turn(
        &self,
        conversation_id: Uuid,
        user_query: &str,
        assistant_answer: &str,
        metadata: serde_json::Value,
    ) -> Result<ConversationTurn> {
        self.find_conversation(conversation_id)
            .await?
            .ok_or_else(|| AppError::ConversationNotFound {
                id: conversation_id.to_string(),
            })?;

        let turn = ConversationTurnActiveModel {
            id: Set(Uuid::new_v4()),
            conversation_id: Set(conversation_id),
            user_query: Set(user_query.to_string()),
            assistant_answer: Set(assistant_answer.to_string()),
            metadata: Set(metadata),
            created_at: Set(Utc::now().into()),
        };

        turn.insert(self.conn()).await.map_err(Into::into)
    }

    /// Chronological turns for a conversation
    pub async fn conversation_history(
        &self,
        conversation_id: Uuid,
        limit: u64,
    ) -> Result<Vec<ConversationTurn>> {
        let mut turns = ConversationTurnEntity::find()
            .filter(ConversationTurnColumn::ConversationId.eq(conversation_id))
            .order_by_desc(ConversationTurnColumn::CreatedAt)
            .limit(limit)
            .all(self.conn())
            .await?;

        turns.reverse();
        Ok(turns)
    }

    // ========================================================================
    // Credential Operations
    // ========================================================================

    /// Find the credential row for (user, source)
    pub async fn find_credential(
        &self,
        user_id: &str,
        source: Source,
    ) -> Result<Option<Credential>> {
        CredentialEntity::find()
            .filter(CredentialColumn::UserId.eq(user_id))
            .filter(CredentialColumn::Source.eq(source.as_str()))
            .one(self.conn())
            .await
            .map_err(Into::into)
    }
}

/// Append parameterized predicates for the optional filters.
///
/// Each predicate pushes its value first so the placeholder index always
/// matches the values vector.
fn append_filter_predicates(
    sql: &mut String,
    values: &mut Vec<sea_orm::Value>,
    filters: &SearchFilters,
) {
    if let Some(source) = filters.source {
        values.push(source.as_str().into());
        sql.push_str(&format!(" AND source = ${}", values.len()));
    }

    if let Some(ref doc_type) = filters.doc_type {
        values.push(doc_type.clone().into());
        sql.push_str(&format!(" AND doc_type = ${}", values.len()));
    }

    if let Some(ref author) = filters.author {
        values.push(format!("%{}%", author).into());
        sql.push_str(&format!(" AND COALESCE(author, '') ILIKE ${}", values.len()));
    }

    if let Some((start, end)) = filters.time_range {
        values.push(start.into());
        sql.push_str(&format!(" AND timestamp >= ${}", values.len()));
        values.push(end.into());
        sql.push_str(&format!(" AND timestamp <= ${}", values.len()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_param_format() {
        let embedding = vec![0.1, 0.2, 0.3];
        assert_eq!(vector_param(&embedding), "[0.1,0.2,0.3]");
    }

    #[test]
    fn test_filter_predicates_are_parameterized() {
        let mut sql = String::from("SELECT 1 FROM documents WHERE user_id = $1");
        let mut values: Vec<sea_orm::Value> = vec!["u".into()];

        let filters = SearchFilters {
            source: Some(Source::Email),
            doc_type: None,
            author: Some("Ravi".to_string()),
            time_range: Some((Utc::now(), Utc::now())),
        };

        append_filter_predicates(&mut sql, &mut values, &filters);

        assert!(sql.contains("AND source = $2"));
        assert!(sql.contains("ILIKE $3"));
        assert!(sql.contains("timestamp >= $4"));
        assert!(sql.contains("timestamp <= $5"));
        assert_eq!(values.len(), 5);
        // No literal filter values leak into the query text
        assert!(!sql.contains("Ravi"));
        assert!(!sql.contains("email"));
    }

    #[test]
    fn test_empty_filters_add_nothing() {
        let mut sql = String::from("SELECT 1");
        let mut values: Vec<sea_orm::Value> = vec![];
        append_filter_predicates(&mut sql, &mut values, &SearchFilters::default());
        assert_eq!(sql, "SELECT 1");
        assert!(values.is_empty());
    }
}

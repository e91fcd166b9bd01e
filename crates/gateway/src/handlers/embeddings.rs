//! Embedding administration handlers

use crate::response::ApiResponse;
use crate::AppState;
use axum::{extract::State, Json};
use recall_common::errors::{AppError, Result};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    /// Documents to process in this batch; defaults to the configured
    /// batch size
    pub limit: Option<usize>,
}

/// POST /embedding/generate - run one batch now
pub async fn generate(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>> {
    let report = state.pipeline.process_pending(request.limit).await?;

    Ok(ApiResponse::ok(json!({
        "processed": report.processed,
        "failedChunks": report.failed_chunks,
        "totalTokens": report.total_tokens,
        "estimatedCost": report.estimated_cost,
    })))
}

/// GET /embedding/status
pub async fn status(State(state): State<AppState>) -> Result<Json<ApiResponse<serde_json::Value>>> {
    let total = state.repository.count_documents().await?;
    let pending = state.repository.count_documents_needing_embedding().await?;

    Ok(ApiResponse::ok(json!({
        "model": state.pipeline.model_name(),
        "totalDocuments": total,
        "pendingDocuments": pending,
        "periodicTrigger": state.config.embedding.cron_interval_secs.is_some(),
    })))
}

/// GET /embedding/stats
pub async fn stats(State(state): State<AppState>) -> Result<Json<ApiResponse<serde_json::Value>>> {
    let stats = state.repository.embedding_stats().await?;
    Ok(ApiResponse::ok(serde_json::to_value(stats)?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReprocessRequest {
    pub document_ids: Vec<String>,
}

/// POST /embedding/reprocess - flag specific documents and drain
pub async fn reprocess(
    State(state): State<AppState>,
    Json(request): Json<ReprocessRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>> {
    if request.document_ids.is_empty() {
        return Err(AppError::MissingField {
            field: "documentIds".to_string(),
        });
    }

    let flagged = state
        .repository
        .mark_for_reembedding(Some(&request.document_ids))
        .await?;

    // Drain in the background; progress streams over the bus
    let pipeline = state.pipeline.clone();
    tokio::spawn(async move {
        if let Err(e) = pipeline.drain_all_pending(None, None).await {
            tracing::error!(error = %e, "Reprocess drain failed");
        }
    });

    Ok(ApiResponse::ok(json!({
        "flagged": flagged,
        "status": "running",
    })))
}

/// POST /embedding/mark-pending - flag every document with content
pub async fn mark_pending(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<serde_json::Value>>> {
    let flagged = state.repository.mark_for_reembedding(None).await?;
    Ok(ApiResponse::ok(json!({ "flagged": flagged })))
}

/// GET /embedding/diagnose
pub async fn diagnose(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<serde_json::Value>>> {
    let stats = state.repository.embedding_stats().await?;
    let pending = state.repository.count_documents_needing_embedding().await?;
    let provider_healthy = state.pipeline.provider_healthy().await;

    Ok(ApiResponse::ok(json!({
        "provider": {
            "model": state.pipeline.model_name(),
            "healthy": provider_healthy,
        },
        "config": {
            "dimensions": state.config.embedding.dimensions,
            "batchSize": state.config.embedding.batch_size,
            "costPerMillionTokens": state.config.embedding.cost_per_million_tokens,
        },
        "store": {
            "totalDocuments": stats.total_documents,
            "embeddedDocuments": stats.embedded_documents,
            "pendingDocuments": pending,
            "embeddedLastDay": stats.embedded_last_day,
            "models": stats.models,
        },
        "costs": {
            "totalTokens": stats.total_tokens,
            "estimatedCost": stats.estimated_cost,
        },
    })))
}

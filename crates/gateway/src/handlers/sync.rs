//! Sync handlers

use crate::response::ApiResponse;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use recall_common::db::models::Source;
use recall_common::errors::{AppError, Result};
use recall_ingestion::SyncMode;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSyncRequest {
    pub user_id: String,

    /// "full" or "incremental"
    #[serde(default = "default_sync_type")]
    pub sync_type: String,

    /// Optional explicit cursor; date or RFC 3339 instant
    pub since_date: Option<String>,
}

fn default_sync_type() -> String {
    "incremental".to_string()
}

/// POST /sync/{source}
pub async fn start_sync(
    State(state): State<AppState>,
    Path(source): Path<String>,
    Json(request): Json<StartSyncRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>> {
    let source = Source::parse(&source).ok_or_else(|| AppError::Validation {
        message: format!("Unknown source: {}", source),
        field: Some("source".to_string()),
    })?;

    let mode = SyncMode::parse(&request.sync_type).ok_or_else(|| AppError::Validation {
        message: format!("Unknown sync type: {}", request.sync_type),
        field: Some("syncType".to_string()),
    })?;

    let since = request
        .since_date
        .as_deref()
        .map(parse_since)
        .transpose()?;

    let sync_id = state
        .coordinator
        .start_sync(&request.user_id, source, mode, since)
        .await?;

    Ok(ApiResponse::ok(json!({
        "syncId": sync_id.to_string(),
        "status": "running",
    })))
}

/// GET /sync/status/{sync_id}
pub async fn sync_status(
    State(state): State<AppState>,
    Path(sync_id): Path<Uuid>,
) -> Result<Json<ApiResponse<serde_json::Value>>> {
    let log = state.coordinator.sync_status(sync_id).await?;

    Ok(ApiResponse::ok(json!({
        "syncId": log.id.to_string(),
        "source": log.source,
        "status": log.status,
        "startedAt": log.started_at,
        "completedAt": log.completed_at,
        "documentsFetched": log.documents_fetched,
        "documentsStored": log.documents_stored,
        "documentsSkipped": log.documents_skipped,
        "documentsFailed": log.documents_failed,
        "lastSyncTimestamp": log.last_sync_timestamp,
        "errorMessage": log.error_message,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    pub user_id: Option<String>,
    pub source: Option<String>,
    pub limit: Option<u64>,
}

/// GET /sync/history
pub async fn sync_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<ApiResponse<serde_json::Value>>> {
    let source = query
        .source
        .as_deref()
        .map(|s| {
            Source::parse(s).ok_or_else(|| AppError::Validation {
                message: format!("Unknown source: {}", s),
                field: Some("source".to_string()),
            })
        })
        .transpose()?;

    let logs = state
        .repository
        .recent_sync_logs(query.user_id.as_deref(), source, query.limit.unwrap_or(20))
        .await?;

    let entries: Vec<serde_json::Value> = logs
        .iter()
        .map(|log| {
            json!({
                "syncId": log.id.to_string(),
                "source": log.source,
                "status": log.status,
                "startedAt": log.started_at,
                "completedAt": log.completed_at,
                "documentsFetched": log.documents_fetched,
                "documentsStored": log.documents_stored,
            })
        })
        .collect();

    Ok(ApiResponse::ok(json!({ "history": entries })))
}

/// Accept a plain date or a full RFC 3339 instant
fn parse_since(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Ok(instant.with_timezone(&Utc));
    }

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(start) = date.and_hms_opt(0, 0, 0) {
            return Ok(DateTime::from_naive_utc_and_offset(start, Utc));
        }
    }

    Err(AppError::InvalidFormat {
        message: format!("Unparseable sinceDate: {}", raw),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_since_date_only() {
        let parsed = parse_since("2025-09-01").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2025-09-01T00:00:00+00:00");
    }

    #[test]
    fn test_parse_since_rfc3339() {
        let parsed = parse_since("2025-09-01T10:30:00Z").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2025-09-01T10:30:00+00:00");
    }

    #[test]
    fn test_parse_since_rejects_garbage() {
        assert!(parse_since("next tuesday").is_err());
    }
}

//! Health handlers

use crate::response::ApiResponse;
use crate::AppState;
use axum::extract::State;
use axum::Json;
use serde_json::json;

/// Liveness: the process is up
pub async fn health() -> Json<ApiResponse<serde_json::Value>> {
    ApiResponse::ok(json!({
        "status": "ok",
        "version": recall_common::VERSION,
    }))
}

/// Readiness: dependencies are reachable
pub async fn ready(State(state): State<AppState>) -> Json<ApiResponse<serde_json::Value>> {
    let db_ok = state.repository.ping().await.is_ok();

    ApiResponse::ok(json!({
        "status": if db_ok { "ready" } else { "degraded" },
        "database": db_ok,
        "pushSubscribers": state.bus.subscriber_count(),
    }))
}

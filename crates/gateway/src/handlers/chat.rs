//! Chat handlers
//!
//! The question-answering surface: blocking and streaming message
//! endpoints, conversation allocation, and history retrieval. Retrieval
//! runs through the RAG pipeline; prior turns are replayed to the model
//! bounded by a token budget.

use crate::response::ApiResponse;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::{Stream, StreamExt};
use recall_common::db::models::ConversationTurn;
use recall_common::errors::{AppError, Result};
use recall_common::estimate_tokens;
use recall_common::llm::{ChatMessage, StreamChunk};
use recall_common::progress::{channels, ProgressEvent};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::{Duration, Instant};
use tracing::{error, info};
use uuid::Uuid;
use validator::Validate;

/// Estimated tokens of prior turns replayed to the model
const HISTORY_TOKEN_BUDGET: usize = 4_000;

/// Turns fetched per history lookup
const DEFAULT_HISTORY_LIMIT: u64 = 20;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[validate(length(min = 1, max = 4000))]
    pub message: String,

    pub conversation_id: Option<Uuid>,

    /// Owning principal; single-user deployments omit it
    #[serde(default = "default_user")]
    pub user_id: String,
}

fn default_user() -> String {
    "default".to_string()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub success: bool,
    pub query_id: String,
    pub response: String,
    pub context: ContextSummary,
    pub metadata: ResponseMetadata,
    pub conversation_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSummary {
    pub documents_used: usize,
    pub total_documents: usize,
    pub selected_documents: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    pub intent: String,
    pub tokens: TokenUsage,
    pub duration_ms: u64,
    pub model: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub prompt: u32,
    pub completion: u32,
}

/// POST /chat/message
pub async fn message(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>> {
    let start = Instant::now();
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let query_id = format!("query_{}", Uuid::new_v4());
    let conversation_id = resolve_conversation(&state, &request).await?;

    let output = state
        .rag
        .execute(&request.user_id, &request.message, &query_id)
        .await
        .inspect_err(|e| emit_rag_error(&state, &query_id, &request.user_id, e))?;

    let history = state
        .repository
        .conversation_history(conversation_id, DEFAULT_HISTORY_LIMIT)
        .await?;

    let generation = if history.is_empty() {
        state.llm.generate(&output.prompt).await
    } else {
        let messages = replay_history(&history, &output.prompt);
        state.llm.chat(&messages).await
    }
    .inspect_err(|e| emit_rag_error(&state, &query_id, &request.user_id, e))?;

    let metadata = json!({
        "queryId": query_id,
        "intent": output.processed_query.intent.as_str(),
        "model": generation.model,
        "promptTokens": generation.prompt_tokens,
        "completionTokens": generation.completion_tokens,
        "durationMs": generation.duration.as_millis() as u64,
        "retrieval": output.metadata,
    });

    state
        .repository
        .append_turn(conversation_id, &request.message, &generation.text, metadata)
        .await?;

    state.bus.publish(ProgressEvent::new(
        channels::RAG_COMPLETE,
        &query_id,
        Some(request.user_id.clone()),
        json!({
            "selected": output.context.documents_selected,
            "durationMs": start.elapsed().as_millis() as u64,
        }),
    ));

    recall_common::metrics::record_query(
        start.elapsed().as_secs_f64(),
        output.processed_query.intent.as_str(),
        output.context.documents_selected,
    );

    info!(
        query_id = %query_id,
        intent = output.processed_query.intent.as_str(),
        selected = output.context.documents_selected,
        latency_ms = start.elapsed().as_millis() as u64,
        "Chat message answered"
    );

    Ok(Json(ChatResponse {
        success: true,
        query_id,
        response: generation.text,
        context: ContextSummary {
            documents_used: output.metadata.after_ranking,
            total_documents: output.metadata.candidates,
            selected_documents: output.context.documents_selected,
        },
        metadata: ResponseMetadata {
            intent: output.processed_query.intent.as_str().to_string(),
            tokens: TokenUsage {
                prompt: generation.prompt_tokens,
                completion: generation.completion_tokens,
            },
            duration_ms: start.elapsed().as_millis() as u64,
            model: generation.model,
        },
        conversation_id: conversation_id.to_string(),
    }))
}

/// POST /chat/message/stream
///
/// SSE frames: one `context` frame, then `text` frames, a `done` frame,
/// and the literal `[DONE]` terminator. Errors emit a final `error`
/// frame then close.
pub async fn message_stream(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Sse<impl Stream<Item = std::result::Result<Event, std::convert::Infallible>>> {
    let query_id = format!("query_{}", Uuid::new_v4());

    let stream = async_stream::stream! {
        if request.message.trim().is_empty() {
            yield error_frame(&query_id, "Query must not be empty");
            yield Ok(Event::default().data("[DONE]"));
            return;
        }

        let conversation_id = match resolve_conversation(&state, &request).await {
            Ok(id) => id,
            Err(e) => {
                emit_rag_error(&state, &query_id, &request.user_id, &e);
                yield error_frame(&query_id, &e.to_string());
                yield Ok(Event::default().data("[DONE]"));
                return;
            }
        };

        let output = match state
            .rag
            .execute(&request.user_id, &request.message, &query_id)
            .await
        {
            Ok(output) => output,
            Err(e) => {
                emit_rag_error(&state, &query_id, &request.user_id, &e);
                yield error_frame(&query_id, &e.to_string());
                yield Ok(Event::default().data("[DONE]"));
                return;
            }
        };

        // Context frame first so clients can render citations while the
        // answer streams
        yield frame(&query_id, "context", json!({
            "citations": output.context.citations,
            "documentsUsed": output.metadata.after_ranking,
            "totalDocuments": output.metadata.candidates,
            "selectedDocuments": output.context.documents_selected,
        }));

        let mut llm_stream = match state.llm.generate_stream(&output.prompt).await {
            Ok(stream) => stream,
            Err(e) => {
                emit_rag_error(&state, &query_id, &request.user_id, &e);
                yield error_frame(&query_id, &e.to_string());
                yield Ok(Event::default().data("[DONE]"));
                return;
            }
        };

        let mut full_text = String::new();

        while let Some(chunk) = llm_stream.next().await {
            match chunk {
                Ok(StreamChunk::Text(text)) => {
                    full_text.push_str(&text);
                    yield frame(&query_id, "text", json!(text));
                }
                Ok(StreamChunk::Done) => break,
                Err(e) => {
                    emit_rag_error(&state, &query_id, &request.user_id, &e);
                    yield error_frame(&query_id, &e.to_string());
                    yield Ok(Event::default().data("[DONE]"));
                    return;
                }
            }
        }

        // Persist the turn before signalling completion
        let metadata = json!({
            "queryId": query_id,
            "intent": output.processed_query.intent.as_str(),
            "streamed": true,
            "retrieval": output.metadata,
        });
        if let Err(e) = state
            .repository
            .append_turn(conversation_id, &request.message, &full_text, metadata)
            .await
        {
            error!(error = %e, "Failed to persist streamed turn");
        }

        state.bus.publish(ProgressEvent::new(
            channels::RAG_COMPLETE,
            &query_id,
            Some(request.user_id.clone()),
            json!({"selected": output.context.documents_selected, "streamed": true}),
        ));

        yield frame(&query_id, "done", json!({
            "conversationId": conversation_id.to_string(),
        }));
        yield Ok(Event::default().data("[DONE]"));
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewConversationRequest {
    #[serde(default = "default_user")]
    pub user_id: String,
    pub title: Option<String>,
}

/// POST /chat/conversation
pub async fn create_conversation(
    State(state): State<AppState>,
    Json(request): Json<NewConversationRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>> {
    let conversation = state
        .repository
        .create_conversation(&request.user_id, request.title)
        .await?;

    Ok(ApiResponse::ok(json!({
        "conversationId": conversation.id.to_string(),
    })))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<u64>,
}

/// GET /chat/history/{conversation_id}
pub async fn history(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<ApiResponse<serde_json::Value>>> {
    state
        .repository
        .find_conversation(conversation_id)
        .await?
        .ok_or_else(|| AppError::ConversationNotFound {
            id: conversation_id.to_string(),
        })?;

    let turns = state
        .repository
        .conversation_history(conversation_id, query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT))
        .await?;

    let turns: Vec<serde_json::Value> = turns
        .iter()
        .map(|turn| {
            json!({
                "id": turn.id.to_string(),
                "query": turn.user_query,
                "answer": turn.assistant_answer,
                "metadata": turn.metadata,
                "createdAt": turn.created_at,
            })
        })
        .collect();

    Ok(ApiResponse::ok(json!({ "turns": turns })))
}

/// Use the supplied conversation or allocate a fresh one
async fn resolve_conversation(state: &AppState, request: &ChatRequest) -> Result<Uuid> {
    match request.conversation_id {
        Some(id) => {
            state
                .repository
                .find_conversation(id)
                .await?
                .ok_or_else(|| AppError::ConversationNotFound { id: id.to_string() })?;
            Ok(id)
        }
        None => {
            let conversation = state
                .repository
                .create_conversation(&request.user_id, None)
                .await?;
            Ok(conversation.id)
        }
    }
}

/// Replay prior turns newest-first under the token budget, then append
/// the prompt as the final user message
fn replay_history(history: &[ConversationTurn], prompt: &str) -> Vec<ChatMessage> {
    let mut budget = HISTORY_TOKEN_BUDGET;
    let mut replayed: Vec<ChatMessage> = Vec::new();

    for turn in history.iter().rev() {
        let cost = estimate_tokens(&turn.user_query) + estimate_tokens(&turn.assistant_answer);
        if cost > budget {
            break;
        }
        budget -= cost;
        replayed.push(ChatMessage::assistant(&turn.assistant_answer));
        replayed.push(ChatMessage::user(&turn.user_query));
    }

    replayed.reverse();
    replayed.push(ChatMessage::user(prompt));
    replayed
}

fn frame(
    query_id: &str,
    frame_type: &str,
    data: serde_json::Value,
) -> std::result::Result<Event, std::convert::Infallible> {
    Ok(Event::default().data(
        json!({
            "type": frame_type,
            "queryId": query_id,
            "data": data,
        })
        .to_string(),
    ))
}

fn error_frame(
    query_id: &str,
    message: &str,
) -> std::result::Result<Event, std::convert::Infallible> {
    frame(query_id, "error", json!(message))
}

fn emit_rag_error(state: &AppState, query_id: &str, user_id: &str, error: &AppError) {
    state.bus.publish(ProgressEvent::new(
        channels::RAG_ERROR,
        query_id,
        Some(user_id.to_string()),
        json!({"error": error.to_string()}),
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn turn(query: &str, answer: &str) -> ConversationTurn {
        ConversationTurn {
            id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            user_query: query.to_string(),
            assistant_answer: answer.to_string(),
            metadata: json!({}),
            created_at: Utc::now().into(),
        }
    }

    #[test]
    fn test_replay_history_orders_pairs_chronologically() {
        let history = vec![turn("first q", "first a"), turn("second q", "second a")];
        let messages = replay_history(&history, "the prompt");

        assert_eq!(messages.len(), 5);
        assert_eq!(messages[0].content, "first q");
        assert_eq!(messages[1].content, "first a");
        assert_eq!(messages[2].content, "second q");
        assert_eq!(messages[3].content, "second a");
        assert_eq!(messages[4].content, "the prompt");
        assert_eq!(messages[4].role, "user");
    }

    #[test]
    fn test_replay_history_respects_budget() {
        let big = "x".repeat(HISTORY_TOKEN_BUDGET * 4);
        let history = vec![turn(&big, "a"), turn("recent q", "recent a")];
        let messages = replay_history(&history, "prompt");

        // The oversized old turn falls out; the recent pair plus the
        // prompt remain
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].content, "recent q");
    }
}

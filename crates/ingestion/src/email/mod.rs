//! Email source connector
//!
//! Fetches messages from the upstream mail API, paging with a page-token
//! cursor and pulling bodies in bounded-concurrency sub-batches, then
//! normalizes each message into the unified document schema.

pub mod client;
pub mod normalize;

use crate::connector::{FetchOptions, SourceConnector};
use crate::errors::IngestError;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use client::EmailApiClient;
use futures::stream::{self, StreamExt};
use recall_common::credentials::CredentialStore;
use recall_common::db::models::{DocType, Source};
use recall_common::db::NewDocument;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Message bodies fetched per sub-batch
const SUB_BATCH_SIZE: usize = 50;

/// Concurrent body fetches within a sub-batch
const FETCH_CONCURRENCY: usize = 10;

/// Pause between pages and sub-batches
const PACING_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    id: String,
    thread_id: Option<String>,
    /// Epoch milliseconds as a string, upstream convention
    internal_date: Option<String>,
    snippet: Option<String>,
    #[serde(default)]
    label_ids: Vec<String>,
    payload: Option<MessagePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessagePart {
    mime_type: Option<String>,
    #[serde(default)]
    headers: Vec<Header>,
    body: Option<PartBody>,
    #[serde(default)]
    parts: Vec<MessagePart>,
}

#[derive(Debug, Deserialize)]
struct Header {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct PartBody {
    data: Option<String>,
}

/// Email connector over the upstream mail API
pub struct EmailConnector {
    client: EmailApiClient,
    credentials: Arc<dyn CredentialStore>,
}

impl EmailConnector {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        base_url: Option<String>,
    ) -> Result<Self, IngestError> {
        Ok(Self {
            client: EmailApiClient::new(base_url)?,
            credentials,
        })
    }

    async fn token(&self, user_id: &str) -> Result<String, IngestError> {
        self.credentials
            .access_token(user_id, Source::Email)
            .await
            .map_err(IngestError::App)
    }

    /// Page through the list endpoint and fetch bodies in sub-batches,
    /// skipping individual failures
    async fn fetch_messages(
        &self,
        user_id: &str,
        query: Option<String>,
        max_records: Option<usize>,
    ) -> Result<Vec<serde_json::Value>, IngestError> {
        let token = self.token(user_id).await?;
        let mut messages = Vec::new();
        let mut page_token: Option<String> = None;
        let mut first_page = true;

        loop {
            if !first_page {
                tokio::time::sleep(PACING_DELAY).await;
            }
            first_page = false;

            let page = self
                .client
                .list_page(&token, query.as_deref(), page_token.as_deref())
                .await?;

            debug!(
                page_messages = page.messages.len(),
                has_next = page.next_page_token.is_some(),
                "Fetched message list page"
            );

            let owned_batches: Vec<Vec<client::MessageRef>> = page
                .messages
                .chunks(SUB_BATCH_SIZE)
                .map(|c| c.to_vec())
                .collect();

            for (batch_index, batch) in owned_batches.into_iter().enumerate() {
                if batch_index > 0 {
                    tokio::time::sleep(PACING_DELAY).await;
                }

                let fetched: Vec<Option<serde_json::Value>> = stream::iter(batch)
                    .map(|message_ref| {
                        let token = token.clone();
                        let id = message_ref.id.clone();
                        let client = self.client.clone();
                        async move {
                            match client.fetch_message(&token, &id).await {
                                Ok(message) => Some(message),
                                Err(e) => {
                                    warn!(message_id = %id, error = %e, "Skipping failed message fetch");
                                    None
                                }
                            }
                        }
                    })
                    .buffer_unordered(FETCH_CONCURRENCY)
                    .collect()
                    .await;

                messages.extend(fetched.into_iter().flatten());

                if let Some(cap) = max_records {
                    if messages.len() >= cap {
                        messages.truncate(cap);
                        return Ok(messages);
                    }
                }
            }

            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        Ok(messages)
    }
}

#[async_trait::async_trait]
impl SourceConnector for EmailConnector {
    fn source(&self) -> Source {
        Source::Email
    }

    async fn authenticate(&self, user_id: &str) -> Result<(), IngestError> {
        self.token(user_id).await.map(|_| ())
    }

    async fn fetch_all(
        &self,
        user_id: &str,
        options: &FetchOptions,
    ) -> Result<Vec<serde_json::Value>, IngestError> {
        let query = options.since.map(after_date_query);
        self.fetch_messages(user_id, query, options.max_records).await
    }

    async fn fetch_new(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<serde_json::Value>, IngestError> {
        self.fetch_messages(user_id, Some(after_date_query(since)), None)
            .await
    }

    fn normalize(
        &self,
        user_id: &str,
        raw: &serde_json::Value,
    ) -> Result<Option<NewDocument>, IngestError> {
        normalize_message(user_id, raw)
    }

    async fn validate_connection(&self, user_id: &str) -> Result<bool, IngestError> {
        let token = self.token(user_id).await?;
        Ok(self.client.list_page(&token, None, None).await.is_ok())
    }
}

/// Translate a cursor into the upstream-native after-date query
fn after_date_query(since: DateTime<Utc>) -> String {
    format!("after:{}", since.format("%Y/%m/%d"))
}

/// Normalize one raw message into the unified schema.
///
/// Returns `None` when the body is empty after cleanup; such records are
/// dropped with a warning, not persisted.
fn normalize_message(
    user_id: &str,
    raw: &serde_json::Value,
) -> Result<Option<NewDocument>, IngestError> {
    let message: RawMessage = serde_json::from_value(raw.clone())
        .map_err(|e| IngestError::NormalizeFailed(format!("Malformed message: {}", e)))?;

    let payload = message.payload.as_ref();

    let subject = payload.and_then(|p| header_value(p, "Subject"));
    let from = payload.and_then(|p| header_value(p, "From"));
    let to = payload.and_then(|p| header_value(p, "To"));

    let content = payload
        .map(extract_body)
        .unwrap_or_default();

    if content.is_empty() {
        warn!(message_id = %message.id, "Dropping message with empty body after cleanup");
        return Ok(None);
    }

    let timestamp = message
        .internal_date
        .as_deref()
        .and_then(|ms| ms.parse::<i64>().ok())
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .unwrap_or_else(Utc::now);

    let metadata = serde_json::json!({
        "from": from,
        "to": to,
        "subject": subject,
        "labels": message.label_ids,
        "thread_id": message.thread_id,
        "snippet": message.snippet,
    });

    Ok(Some(NewDocument {
        document_id: format!("email_{}", message.id),
        user_id: user_id.to_string(),
        source: Source::Email,
        doc_type: DocType::Message,
        content,
        title: subject,
        author: from,
        timestamp,
        metadata,
    }))
}

fn header_value(part: &MessagePart, name: &str) -> Option<String> {
    part.headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.clone())
}

/// Extract a cleaned body, preferring a text/plain part over HTML
fn extract_body(payload: &MessagePart) -> String {
    if let Some(text) = find_part_data(payload, "text/plain") {
        let cleaned = normalize::clean_body(&text, false);
        if !cleaned.is_empty() {
            return cleaned;
        }
    }

    if let Some(html) = find_part_data(payload, "text/html") {
        let cleaned = normalize::clean_body(&html, true);
        if !cleaned.is_empty() {
            return cleaned;
        }
    }

    // Single-part message without an explicit mime match
    if let Some(data) = payload.body.as_ref().and_then(|b| b.data.as_deref()) {
        if let Some(text) = decode_body_data(data) {
            let is_html = payload
                .mime_type
                .as_deref()
                .is_some_and(|m| m.contains("html"));
            return normalize::clean_body(&text, is_html);
        }
    }

    String::new()
}

/// Depth-first search for a part with the wanted mime type
fn find_part_data(part: &MessagePart, mime_type: &str) -> Option<String> {
    if part.mime_type.as_deref() == Some(mime_type) {
        if let Some(data) = part.body.as_ref().and_then(|b| b.data.as_deref()) {
            return decode_body_data(data);
        }
    }

    for child in &part.parts {
        if let Some(found) = find_part_data(child, mime_type) {
            return Some(found);
        }
    }

    None
}

/// Decode the url-safe base64 body payload (padded or not)
fn decode_body_data(data: &str) -> Option<String> {
    let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
    let bytes = engine
        .decode(data.trim_end_matches('='))
        .ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(text: &str) -> String {
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(text)
    }

    fn raw_message(id: &str, subject: &str, plain: Option<&str>, html: Option<&str>) -> serde_json::Value {
        let mut parts = Vec::new();
        if let Some(text) = plain {
            parts.push(serde_json::json!({
                "mimeType": "text/plain",
                "body": {"data": encode(text)},
            }));
        }
        if let Some(markup) = html {
            parts.push(serde_json::json!({
                "mimeType": "text/html",
                "body": {"data": encode(markup)},
            }));
        }

        serde_json::json!({
            "id": id,
            "threadId": "t1",
            "internalDate": "1759276800000",
            "snippet": "snippet text",
            "labelIds": ["INBOX"],
            "payload": {
                "mimeType": "multipart/alternative",
                "headers": [
                    {"name": "Subject", "value": subject},
                    {"name": "From", "value": "Ravi Kumar <ravi@example.com>"},
                    {"name": "To", "value": "me@example.com"},
                ],
                "parts": parts,
            },
        })
    }

    #[test]
    fn test_normalize_prefers_text_plain() {
        let raw = raw_message(
            "m1",
            "Budget review",
            Some("Plain body here.\n-- \nRavi"),
            Some("<p>HTML body here</p>"),
        );

        let doc = normalize_message("u", &raw).unwrap().unwrap();
        assert_eq!(doc.document_id, "email_m1");
        assert_eq!(doc.content, "Plain body here.");
        assert_eq!(doc.title.as_deref(), Some("Budget review"));
        assert_eq!(doc.author.as_deref(), Some("Ravi Kumar <ravi@example.com>"));
        assert_eq!(doc.metadata["thread_id"], "t1");
        assert_eq!(doc.metadata["labels"][0], "INBOX");
    }

    #[test]
    fn test_normalize_falls_back_to_html() {
        let raw = raw_message("m2", "HTML only", None, Some("<p>Rendered <b>content</b></p>"));
        let doc = normalize_message("u", &raw).unwrap().unwrap();
        assert_eq!(doc.content, "Rendered content");
    }

    #[test]
    fn test_normalize_drops_empty_body() {
        let raw = raw_message("m3", "Empty", Some("   "), None);
        assert!(normalize_message("u", &raw).unwrap().is_none());
    }

    #[test]
    fn test_normalize_uses_internal_timestamp() {
        let raw = raw_message("m4", "Dated", Some("body"), None);
        let doc = normalize_message("u", &raw).unwrap().unwrap();
        assert_eq!(doc.timestamp.timestamp_millis(), 1_759_276_800_000);
    }

    #[test]
    fn test_after_date_query_format() {
        let since = Utc.with_ymd_and_hms(2025, 9, 1, 0, 0, 0).unwrap();
        assert_eq!(after_date_query(since), "after:2025/09/01");
    }

    #[test]
    fn test_malformed_message_is_an_error() {
        let raw = serde_json::json!({"threadId": 42});
        assert!(normalize_message("u", &raw).is_err());
    }
}

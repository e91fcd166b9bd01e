//! Email provider REST client
//!
//! Pages through the upstream list endpoint with a page-token cursor and
//! fetches full message bodies by id. Requests are paced to avoid
//! bursts against upstream quotas.

use crate::errors::IngestError;
use serde::Deserialize;
use std::time::Duration;

/// Messages per list page request
const PAGE_SIZE: usize = 100;

/// Default upstream endpoint
const DEFAULT_BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageListPage {
    #[serde(default)]
    pub messages: Vec<MessageRef>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    pub id: String,
}

/// Thin HTTP client over the mail API
#[derive(Clone)]
pub struct EmailApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl EmailApiClient {
    pub fn new(base_url: Option<String>) -> Result<Self, IngestError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| IngestError::FetchFailed(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        })
    }

    /// One page of message ids matching the query
    pub async fn list_page(
        &self,
        access_token: &str,
        query: Option<&str>,
        page_token: Option<&str>,
    ) -> Result<MessageListPage, IngestError> {
        let url = format!("{}/users/me/messages", self.base_url);

        let mut request = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .query(&[("maxResults", PAGE_SIZE.to_string())]);

        if let Some(q) = query {
            request = request.query(&[("q", q)]);
        }
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| IngestError::FetchFailed(format!("List request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(IngestError::FetchFailed(format!(
                "List API error {}: {}",
                status, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| IngestError::FetchFailed(format!("Failed to parse list page: {}", e)))
    }

    /// Fetch one full message as raw JSON
    pub async fn fetch_message(
        &self,
        access_token: &str,
        id: &str,
    ) -> Result<serde_json::Value, IngestError> {
        let url = format!("{}/users/me/messages/{}", self.base_url, id);

        let response = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .query(&[("format", "full")])
            .send()
            .await
            .map_err(|e| IngestError::FetchFailed(format!("Message request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(IngestError::FetchFailed(format!(
                "Message API error {} for id {}",
                status, id
            )));
        }

        response
            .json()
            .await
            .map_err(|e| IngestError::FetchFailed(format!("Failed to parse message {}: {}", id, e)))
    }
}

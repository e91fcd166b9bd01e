//! Source connector contract
//!
//! Each connected source implements this capability interface; the
//! coordinator holds a registry keyed by source name and dispatches
//! dynamically.

use crate::errors::IngestError;
use chrono::{DateTime, Utc};
use recall_common::db::models::Source;
use recall_common::db::NewDocument;
use std::collections::HashMap;
use std::sync::Arc;

/// Options for a full fetch
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Lower bound on upstream record creation time
    pub since: Option<DateTime<Utc>>,

    /// Soft cap on records returned; unset fetches everything upstream
    /// offers
    pub max_records: Option<usize>,
}

/// Abstract contract over an upstream data source.
///
/// Raw records are source-specific JSON blobs; `normalize` turns one into
/// the unified document schema, returning `None` for records that should
/// be dropped (e.g. an email whose body is empty after cleanup).
#[async_trait::async_trait]
pub trait SourceConnector: Send + Sync {
    /// The source this connector serves
    fn source(&self) -> Source;

    /// Verify that a currently valid credential exists for the user
    async fn authenticate(&self, user_id: &str) -> Result<(), IngestError>;

    /// Fetch all raw records within the options window
    async fn fetch_all(
        &self,
        user_id: &str,
        options: &FetchOptions,
    ) -> Result<Vec<serde_json::Value>, IngestError>;

    /// Fetch raw records created after the cursor
    async fn fetch_new(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<serde_json::Value>, IngestError>;

    /// Normalize one raw record into the unified schema
    fn normalize(
        &self,
        user_id: &str,
        raw: &serde_json::Value,
    ) -> Result<Option<NewDocument>, IngestError>;

    /// Cheap upstream reachability check
    async fn validate_connection(&self, user_id: &str) -> Result<bool, IngestError>;
}

/// Registry of connectors keyed by source
#[derive(Clone, Default)]
pub struct ConnectorRegistry {
    connectors: HashMap<Source, Arc<dyn SourceConnector>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, connector: Arc<dyn SourceConnector>) {
        self.connectors.insert(connector.source(), connector);
    }

    pub fn get(&self, source: Source) -> Option<Arc<dyn SourceConnector>> {
        self.connectors.get(&source).cloned()
    }

    pub fn sources(&self) -> Vec<Source> {
        self.connectors.keys().copied().collect()
    }
}

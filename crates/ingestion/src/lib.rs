//! Recall Ingestion
//!
//! Source connectors and the sync coordinator:
//! 1. Fetch raw records from an upstream source since a cursor
//! 2. Normalize them into the unified document schema
//! 3. Persist with at-least-once, resumable semantics
//! 4. Hand pending documents to the embedding pipeline

pub mod connector;
pub mod coordinator;
pub mod email;
pub mod errors;

pub use connector::{ConnectorRegistry, FetchOptions, SourceConnector};
pub use coordinator::{SyncCoordinator, SyncMode};
pub use errors::IngestError;

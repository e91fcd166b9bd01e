//! Recall Retrieval
//!
//! The query side of the system:
//! - Query processing (intent, keywords, entities, person, time range)
//! - Vector and hybrid search with a cached query embedding
//! - Multi-signal ranking with diversification
//! - Context packing under a token budget with citations
//! - RAG pipeline glue and prompt assembly

pub mod cache;
pub mod context;
pub mod pipeline;
pub mod prompt;
pub mod query;
pub mod ranker;
pub mod search;

pub use context::{Citation, ContextFormatter, FormattedContext};
pub use pipeline::{RagOutput, RagPipeline, RetrievalMetadata};
pub use query::{Intent, ProcessedQuery, QueryProcessor, QueryType};
pub use ranker::{RankedDocument, Ranker, RankerConfig};
pub use search::{SearchOptions, SearchService};

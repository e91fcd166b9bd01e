//! Recall Embedding Worker
//!
//! Pulls documents flagged for embedding, batches them against the
//! embedding provider, stores vectors transactionally, records cost, and
//! emits progress:
//! 1. Fetch pending documents from the store
//! 2. Generate vectors in paced chunks
//! 3. Apply updates atomically per chunk
//! 4. Write one cost row per run

pub mod pipeline;
pub mod scheduler;

pub use pipeline::{EmbeddingPipeline, PipelineConfig, RunReport};
pub use scheduler::run_periodic;

//! Ingestion error types

use recall_common::errors::AppError;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Source fetch failed: {0}")]
    FetchFailed(String),

    #[error("Normalization failed: {0}")]
    NormalizeFailed(String),

    #[error("Unknown source: {0}")]
    UnknownSource(String),

    #[error("Sync cancelled")]
    Cancelled,

    #[error(transparent)]
    App(#[from] AppError),
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::FetchFailed(message) => AppError::SourceError { message },
            IngestError::NormalizeFailed(message) => AppError::SourceError { message },
            IngestError::UnknownSource(source) => AppError::Validation {
                message: format!("Unknown source: {}", source),
                field: Some("source".to_string()),
            },
            IngestError::Cancelled => AppError::Cancelled {
                message: "sync cancelled".to_string(),
            },
            IngestError::App(inner) => inner,
        }
    }
}

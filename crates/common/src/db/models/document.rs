//! Normalized document entity with embedding provenance

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Connected data sources
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Email,
    Calendar,
    Music,
}

impl Source {
    /// Parse a source name; unknown names are rejected by callers
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "email" => Some(Source::Email),
            "calendar" => Some(Source::Calendar),
            "music" => Some(Source::Music),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Email => "email",
            Source::Calendar => "calendar",
            Source::Music => "music",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Document types produced by the connectors
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    Message,
    Event,
    Track,
}

impl DocType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "message" => Some(DocType::Message),
            "event" => Some(DocType::Event),
            "track" => Some(DocType::Track),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::Message => "message",
            DocType::Event => "event",
            DocType::Track => "track",
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "documents")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Globally unique id, convention `<source>_<source-native-id>`
    #[sea_orm(column_type = "Text", unique)]
    pub document_id: String,

    /// Owning principal; every query predicate is scoped by this
    #[sea_orm(column_type = "Text")]
    pub user_id: String,

    #[sea_orm(column_type = "Text")]
    pub source: String,

    #[sea_orm(column_type = "Text")]
    pub doc_type: String,

    /// Cleaned plain text, bounded and truncation-marked upstream
    #[sea_orm(column_type = "Text")]
    pub content: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub title: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub author: Option<String>,

    /// Instant the upstream record was created
    pub timestamp: DateTimeWithTimeZone,

    /// Source-specific structured blob
    pub metadata: Json,

    /// pgvector embedding stored as text for SeaORM compatibility.
    /// Actual vector operations go through raw SQL.
    #[sea_orm(column_type = "Text", nullable)]
    pub embedding: Option<String>,

    pub needs_embedding: bool,

    #[sea_orm(column_type = "Text", nullable)]
    pub embedding_model: Option<String>,

    pub embedding_tokens: Option<i32>,

    pub embedding_generated_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

pub use Model as Document;

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Parse embedding from stored text format to Vec<f32>
    pub fn parse_embedding(&self) -> Option<Vec<f32>> {
        self.embedding.as_ref().and_then(|s| {
            // Format: "[1.0,2.0,3.0,...]"
            let inner = s.trim_start_matches('[').trim_end_matches(']');
            inner
                .split(',')
                .map(|v| v.trim().parse::<f32>().ok())
                .collect()
        })
    }

    /// Parsed source enum
    pub fn source_kind(&self) -> Option<Source> {
        Source::parse(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_round_trip() {
        for s in ["email", "calendar", "music"] {
            assert_eq!(Source::parse(s).unwrap().as_str(), s);
        }
        assert!(Source::parse("unknown").is_none());
    }

    #[test]
    fn test_parse_embedding() {
        let doc = Model {
            id: Uuid::new_v4(),
            document_id: "email_m1".into(),
            user_id: "u".into(),
            source: "email".into(),
            doc_type: "message".into(),
            content: "hello".into(),
            title: None,
            author: None,
            timestamp: chrono::Utc::now().into(),
            metadata: serde_json::json!({}),
            embedding: Some("[0.5, -1.25, 3]".into()),
            needs_embedding: false,
            embedding_model: None,
            embedding_tokens: None,
            embedding_generated_at: None,
            created_at: chrono::Utc::now().into(),
            updated_at: chrono::Utc::now().into(),
        };
        assert_eq!(doc.parse_embedding(), Some(vec![0.5, -1.25, 3.0]));
    }
}

//! Context formatting
//!
//! Renders ranked documents into the context block handed to the model,
//! greedily packing under a token budget, and emits numbered citation
//! records the model uses to reference sources.

use crate::ranker::RankedDocument;
use recall_common::estimate_tokens;
use serde::{Deserialize, Serialize};

/// Sentinel emitted when no documents fit or none were supplied
pub const NO_CONTEXT_SENTINEL: &str = "No relevant documents were retrieved for this query.";

/// Separator between rendered documents
const DOCUMENT_SEPARATOR: &str = "\n---\n";

/// Numbered citation record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub id: usize,
    pub document_id: String,
    pub source: String,
    pub title: Option<String>,
    pub date: String,
    pub author: Option<String>,
}

/// Formatted context plus metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormattedContext {
    pub context: String,
    pub citations: Vec<Citation>,
    /// Estimated tokens across selected documents
    pub tokens_used: usize,
    /// Candidates offered to the formatter
    pub documents_considered: usize,
    /// Documents that made it into the context
    pub documents_selected: usize,
}

impl FormattedContext {
    pub fn is_empty(&self) -> bool {
        self.documents_selected == 0
    }
}

/// Formatter configuration
#[derive(Debug, Clone)]
pub struct FormatterConfig {
    /// Token budget for the whole context block, leaving room for the
    /// reply
    pub max_context_tokens: usize,
}

impl Default for FormatterConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: 28_000,
        }
    }
}

/// Context formatter
pub struct ContextFormatter {
    config: FormatterConfig,
}

impl ContextFormatter {
    pub fn new(config: FormatterConfig) -> Self {
        Self { config }
    }

    /// Pack ranked documents into a context block under the budget.
    ///
    /// Documents arrive in priority order; ones whose rendering alone
    /// exceeds the remaining budget are skipped, not split.
    pub fn format(&self, documents: &[RankedDocument]) -> FormattedContext {
        let considered = documents.len();

        if documents.is_empty() {
            return FormattedContext {
                context: NO_CONTEXT_SENTINEL.to_string(),
                citations: Vec::new(),
                tokens_used: 0,
                documents_considered: 0,
                documents_selected: 0,
            };
        }

        let mut sections: Vec<String> = Vec::new();
        let mut citations: Vec<Citation> = Vec::new();
        let mut tokens_used = 0usize;
        let mut source_counts: Vec<(String, usize)> = Vec::new();

        for doc in documents {
            let index = sections.len() + 1;
            let rendered = render_document(doc, index);
            let rendered_tokens = estimate_tokens(&rendered);

            if tokens_used + rendered_tokens > self.config.max_context_tokens {
                continue;
            }

            tokens_used += rendered_tokens;
            citations.push(citation_for(doc, index));
            bump_source_count(&mut source_counts, &doc.hit.source);
            sections.push(rendered);
        }

        if sections.is_empty() {
            return FormattedContext {
                context: NO_CONTEXT_SENTINEL.to_string(),
                citations: Vec::new(),
                tokens_used: 0,
                documents_considered: considered,
                documents_selected: 0,
            };
        }

        let footer = render_footer(sections.len(), &source_counts);
        let context = format!(
            "{}{}{}",
            sections.join(DOCUMENT_SEPARATOR),
            DOCUMENT_SEPARATOR,
            footer
        );

        FormattedContext {
            context,
            documents_selected: sections.len(),
            citations,
            tokens_used,
            documents_considered: considered,
        }
    }
}

impl Default for ContextFormatter {
    fn default() -> Self {
        Self::new(FormatterConfig::default())
    }
}

/// Render one document with its header lines and body
fn render_document(doc: &RankedDocument, index: usize) -> String {
    let hit = &doc.hit;
    let mut lines: Vec<String> = Vec::with_capacity(10);

    lines.push(format!("[Document {}]", index));

    if let Some(ref title) = hit.title {
        lines.push(format!("Title: {}", title));
    }
    lines.push(format!("Source: {}", hit.source));
    lines.push(format!("Date: {}", hit.timestamp.format("%Y-%m-%d")));
    if let Some(ref author) = hit.author {
        lines.push(format!("Author: {}", author));
    }
    lines.push(format!("Relevance: {:.2}", doc.score));

    for line in metadata_lines(hit) {
        lines.push(line);
    }

    lines.push(String::new());
    lines.push(hit.content.clone());

    lines.join("\n")
}

/// Source-specific metadata lines
fn metadata_lines(hit: &recall_common::db::SearchHit) -> Vec<String> {
    let meta = &hit.metadata;
    let mut lines = Vec::new();

    match hit.source.as_str() {
        "email" => {
            if let Some(to) = meta.get("to").and_then(|v| v.as_str()) {
                lines.push(format!("To: {}", to));
            }
            if let Some(labels) = meta.get("labels").and_then(|v| v.as_array()) {
                let labels: Vec<&str> = labels.iter().filter_map(|l| l.as_str()).collect();
                if !labels.is_empty() {
                    lines.push(format!("Labels: {}", labels.join(", ")));
                }
            }
        }
        "calendar" => {
            if let Some(attendees) = meta.get("attendees").and_then(|v| v.as_array()) {
                let attendees: Vec<&str> = attendees.iter().filter_map(|a| a.as_str()).collect();
                if !attendees.is_empty() {
                    lines.push(format!("Attendees: {}", attendees.join(", ")));
                }
            }
            if let Some(location) = meta.get("location").and_then(|v| v.as_str()) {
                lines.push(format!("Location: {}", location));
            }
        }
        "music" => {
            if let Some(artist) = meta.get("artist").and_then(|v| v.as_str()) {
                lines.push(format!("Artist: {}", artist));
            }
            if let Some(album) = meta.get("album").and_then(|v| v.as_str()) {
                lines.push(format!("Album: {}", album));
            }
        }
        _ => {}
    }

    lines
}

fn citation_for(doc: &RankedDocument, index: usize) -> Citation {
    Citation {
        id: index,
        document_id: doc.hit.document_id.clone(),
        source: doc.hit.source.clone(),
        title: doc.hit.title.clone(),
        date: doc.hit.timestamp.format("%Y-%m-%d").to_string(),
        author: doc.hit.author.clone(),
    }
}

fn bump_source_count(counts: &mut Vec<(String, usize)>, source: &str) {
    match counts.iter_mut().find(|(s, _)| s == source) {
        Some((_, count)) => *count += 1,
        None => counts.push((source.to_string(), 1)),
    }
}

fn render_footer(total: usize, source_counts: &[(String, usize)]) -> String {
    let breakdown: Vec<String> = source_counts
        .iter()
        .map(|(source, count)| format!("{}: {}", source, count))
        .collect();
    format!("Total: {} documents ({})", total, breakdown.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranker::{Ranker, RankerConfig};
    use crate::query::QueryProcessor;
    use chrono::{TimeZone, Utc};
    use recall_common::db::SearchHit;

    fn ranked(document_id: &str, source: &str, content: &str) -> RankedDocument {
        let hit = SearchHit {
            document_id: document_id.to_string(),
            source: source.to_string(),
            doc_type: "message".to_string(),
            title: Some("Budget notes".to_string()),
            author: Some("Ravi".to_string()),
            content: content.to_string(),
            timestamp: Utc.with_ymd_and_hms(2025, 10, 1, 9, 0, 0).unwrap().into(),
            metadata: serde_json::json!({
                "to": "me@example.com",
                "labels": ["INBOX", "finance"],
            }),
            similarity: 0.9,
            keyword_boost: 0.0,
        };

        let ranker = Ranker::new(RankerConfig::default());
        let query = QueryProcessor::default().process("budget", Utc::now());
        ranker
            .rank(vec![hit], &query, Utc::now())
            .into_iter()
            .next()
            .expect("one ranked document")
    }

    #[test]
    fn test_render_includes_headers_and_metadata() {
        let formatter = ContextFormatter::default();
        let result = formatter.format(&[ranked("email_m1", "email", "Body text")]);

        assert!(result.context.contains("[Document 1]"));
        assert!(result.context.contains("Title: Budget notes"));
        assert!(result.context.contains("Source: email"));
        assert!(result.context.contains("Date: 2025-10-01"));
        assert!(result.context.contains("To: me@example.com"));
        assert!(result.context.contains("Labels: INBOX, finance"));
        assert!(result.context.contains("Body text"));
        assert!(result.context.contains("Total: 1 documents (email: 1)"));
    }

    #[test]
    fn test_citation_indices_match_document_markers() {
        let formatter = ContextFormatter::default();
        let docs = vec![
            ranked("email_m1", "email", "First body"),
            ranked("email_m2", "email", "Second body, entirely different words"),
        ];
        let result = formatter.format(&docs);

        assert_eq!(result.citations.len(), result.documents_selected);
        for citation in &result.citations {
            assert!(result
                .context
                .contains(&format!("[Document {}]", citation.id)));
        }
        assert_eq!(result.citations[0].document_id, "email_m1");
        assert_eq!(result.citations[1].document_id, "email_m2");
    }

    #[test]
    fn test_budget_is_respected() {
        let formatter = ContextFormatter::new(FormatterConfig {
            max_context_tokens: 100,
        });

        let docs = vec![
            ranked("d1", "email", &"small body ".repeat(5)),
            ranked("d2", "email", &"x".repeat(10_000)),
            ranked("d3", "email", &"another small body ".repeat(4)),
        ];

        let result = formatter.format(&docs);

        assert!(result.tokens_used <= 100);
        // The oversized document was skipped, not split
        assert!(!result.context.contains(&"x".repeat(500)));
        assert_eq!(result.documents_considered, 3);
        assert!(result.documents_selected >= 1);
    }

    #[test]
    fn test_empty_input_yields_sentinel() {
        let formatter = ContextFormatter::default();
        let result = formatter.format(&[]);

        assert_eq!(result.context, NO_CONTEXT_SENTINEL);
        assert!(result.is_empty());
        assert!(result.citations.is_empty());
        assert_eq!(result.tokens_used, 0);
    }

    #[test]
    fn test_nothing_fits_yields_sentinel() {
        let formatter = ContextFormatter::new(FormatterConfig { max_context_tokens: 5 });
        let result = formatter.format(&[ranked("d1", "email", "a body that will not fit")]);

        assert_eq!(result.context, NO_CONTEXT_SENTINEL);
        assert_eq!(result.documents_considered, 1);
        assert_eq!(result.documents_selected, 0);
    }
}

//! Query processing
//!
//! Pure transformation of a natural-language query into intent,
//! keywords, entities, person, time range, and search filters. Pattern
//! lists are ordered; the first match wins.

pub mod time;

use chrono::{DateTime, Utc};
use recall_common::db::models::Source;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use self::time::{extract_time_range, TimeRange};

/// Detected query intent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    SearchEmail,
    SearchCalendar,
    SearchMusic,
    PatternAnalysis,
    Recommendation,
    GeneralSearch,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::SearchEmail => "search_email",
            Intent::SearchCalendar => "search_calendar",
            Intent::SearchMusic => "search_music",
            Intent::PatternAnalysis => "pattern_analysis",
            Intent::Recommendation => "recommendation",
            Intent::GeneralSearch => "general_search",
        }
    }

    /// Source implied by a search intent
    pub fn source(&self) -> Option<Source> {
        match self {
            Intent::SearchEmail => Some(Source::Email),
            Intent::SearchCalendar => Some(Source::Calendar),
            Intent::SearchMusic => Some(Source::Music),
            _ => None,
        }
    }
}

/// Coarse query class used for prompt selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    MemoryRecall,
    Pattern,
    Recommendation,
    General,
}

/// Filters assembled from the processed query
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryFilters {
    pub source: Option<Source>,
    pub time_range: Option<TimeRange>,
    /// Author filter when a person was explicitly extracted
    pub author: Option<String>,
    /// Soft hint from the first entity when no person matched
    pub potential_author: Option<String>,
}

/// Result of query processing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedQuery {
    pub original: String,
    pub intent: Intent,
    pub source: Option<Source>,
    pub keywords: Vec<String>,
    pub entities: Vec<String>,
    pub person: Option<String>,
    pub time_range: Option<TimeRange>,
    pub filters: QueryFilters,
    pub query_type: QueryType,
}

/// Query processor configuration
#[derive(Debug, Clone)]
pub struct QueryProcessorConfig {
    /// Maximum keywords returned
    pub max_keywords: usize,
}

impl Default for QueryProcessorConfig {
    fn default() -> Self {
        Self { max_keywords: 10 }
    }
}

/// Query processor
pub struct QueryProcessor {
    config: QueryProcessorConfig,
}

impl QueryProcessor {
    pub fn new(config: QueryProcessorConfig) -> Self {
        Self { config }
    }

    /// Process a query; `now` anchors relative time expressions
    pub fn process(&self, query: &str, now: DateTime<Utc>) -> ProcessedQuery {
        let intent = detect_intent(query);
        let source = intent.source();
        let keywords = extract_keywords(query, self.config.max_keywords);
        let entities = extract_entities(query);
        let person = extract_person(query);
        let time_range = extract_time_range(query, now);

        let filters = QueryFilters {
            source,
            time_range: time_range.clone(),
            author: person.clone(),
            potential_author: match person {
                Some(_) => None,
                None => entities.first().cloned(),
            },
        };

        let query_type = match intent {
            Intent::SearchEmail | Intent::SearchCalendar | Intent::SearchMusic => {
                QueryType::MemoryRecall
            }
            Intent::PatternAnalysis => QueryType::Pattern,
            Intent::Recommendation => QueryType::Recommendation,
            Intent::GeneralSearch => QueryType::General,
        };

        ProcessedQuery {
            original: query.to_string(),
            intent,
            source,
            keywords,
            entities,
            person,
            time_range,
            filters,
            query_type,
        }
    }
}

impl Default for QueryProcessor {
    fn default() -> Self {
        Self::new(QueryProcessorConfig::default())
    }
}

/// Ordered intent pattern lists; first match wins
fn detect_intent(query: &str) -> Intent {
    let lower = query.to_lowercase();

    const EMAIL_PATTERNS: [&str; 6] =
        ["email", "mail", "inbox", "message from", "sent me", "wrote to me"];
    const CALENDAR_PATTERNS: [&str; 6] =
        ["calendar", "meeting", "appointment", "schedule", "event", "invite"];
    const MUSIC_PATTERNS: [&str; 6] =
        ["music", "song", "listened", "track", "playlist", "artist"];
    const PATTERN_PATTERNS: [&str; 6] =
        ["how often", "how many times", "pattern", "trend", "usually", "typically"];
    const RECOMMENDATION_PATTERNS: [&str; 4] =
        ["recommend", "suggest", "what should i", "any good"];

    if EMAIL_PATTERNS.iter().any(|p| lower.contains(p)) {
        return Intent::SearchEmail;
    }
    if CALENDAR_PATTERNS.iter().any(|p| lower.contains(p)) {
        return Intent::SearchCalendar;
    }
    if MUSIC_PATTERNS.iter().any(|p| lower.contains(p)) {
        return Intent::SearchMusic;
    }
    if PATTERN_PATTERNS.iter().any(|p| lower.contains(p)) {
        return Intent::PatternAnalysis;
    }
    if RECOMMENDATION_PATTERNS.iter().any(|p| lower.contains(p)) {
        return Intent::Recommendation;
    }

    Intent::GeneralSearch
}

/// Words rejected as person captures
const PERSON_REJECTS: [&str; 16] = [
    "i", "me", "my", "you", "we", "us", "he", "she", "him", "her", "they", "them", "the", "a",
    "an", "it",
];

/// Trailing words stripped from a two-word capture
const PERSON_TRAILERS: [&str; 6] = ["about", "regarding", "yesterday", "today", "last", "this"];

/// Extract a person anchored on prepositions; first accepted capture wins
fn extract_person(query: &str) -> Option<String> {
    // Ordered: the most specific anchor first
    const ANCHORS: [&str; 4] = ["discussed with", "from", "with", "to"];

    for anchor in ANCHORS {
        let pattern = format!(
            r"\b{}\s+([A-Z][a-zA-Z]+(?:\s+[A-Z][a-zA-Z]+)?)",
            anchor
        );
        let Ok(re) = regex_lite::Regex::new(&pattern) else {
            continue;
        };

        for caps in re.captures_iter(query) {
            let capture = caps[1].to_string();
            if let Some(person) = accept_person(&capture) {
                return Some(person);
            }
        }
    }

    None
}

fn accept_person(capture: &str) -> Option<String> {
    let mut words: Vec<&str> = capture.split_whitespace().collect();

    // Strip trailing stop words that happen to be capitalized
    while let Some(last) = words.last() {
        if PERSON_TRAILERS.contains(&last.to_lowercase().as_str()) {
            words.pop();
        } else {
            break;
        }
    }

    let first = words.first()?;
    if PERSON_REJECTS.contains(&first.to_lowercase().as_str()) {
        return None;
    }

    Some(words.join(" "))
}

/// Sentence starters excluded from entity extraction
const ENTITY_STOP: [&str; 20] = [
    "what", "who", "when", "where", "why", "how", "did", "do", "does", "show", "find", "tell",
    "give", "list", "the", "a", "an", "is", "are", "was",
];

/// Capitalized token runs outside the sentence-starter stop list
fn extract_entities(query: &str) -> Vec<String> {
    let mut entities = Vec::new();
    let mut current: Vec<String> = Vec::new();

    for token in query.split_whitespace() {
        let word: String = token
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect();

        let is_capitalized = word
            .chars()
            .next()
            .is_some_and(|c| c.is_uppercase());

        if is_capitalized && !ENTITY_STOP.contains(&word.to_lowercase().as_str()) {
            current.push(word);
        } else if !current.is_empty() {
            entities.push(current.join(" "));
            current.clear();
        }
    }
    if !current.is_empty() {
        entities.push(current.join(" "));
    }

    entities.dedup();
    entities
}

/// Stop words removed before keyword ranking
const KEYWORD_STOP: [&str; 40] = [
    "the", "a", "an", "is", "are", "was", "were", "be", "been", "in", "on", "at", "to", "for",
    "of", "with", "by", "from", "and", "or", "but", "not", "this", "that", "these", "those",
    "it", "its", "as", "do", "does", "did", "has", "have", "had", "can", "could", "will",
    "would", "should",
];

/// Interrogatives dropped from keywords
const KEYWORD_INTERROGATIVES: [&str; 8] =
    ["what", "when", "where", "who", "why", "how", "show", "find"];

/// Lower-cased, stop-filtered keywords ranked by frequency
fn extract_keywords(query: &str, max: usize) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    for token in query.to_lowercase().split(|c: char| !c.is_alphanumeric()) {
        if token.len() < 3 {
            continue;
        }
        if KEYWORD_STOP.contains(&token) || KEYWORD_INTERROGATIVES.contains(&token) {
            continue;
        }

        let entry = counts.entry(token.to_string()).or_insert(0);
        if *entry == 0 {
            order.push(token.to_string());
        }
        *entry += 1;
    }

    // Frequency descending, first occurrence breaking ties
    let mut ranked: Vec<(usize, usize, String)> = order
        .into_iter()
        .enumerate()
        .map(|(position, word)| (counts[&word], position, word))
        .collect();
    ranked.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

    ranked.into_iter().take(max).map(|(_, _, word)| word).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 15, 12, 0, 0).unwrap()
    }

    fn process(query: &str) -> ProcessedQuery {
        QueryProcessor::default().process(query, now())
    }

    #[test]
    fn test_email_query_with_person_and_time() {
        let result = process("emails from Ravi about budget last week");

        assert_eq!(result.intent, Intent::SearchEmail);
        assert_eq!(result.source, Some(Source::Email));
        assert_eq!(result.person.as_deref(), Some("Ravi"));
        assert_eq!(
            result.time_range.as_ref().map(|r| r.label.as_str()),
            Some("last week")
        );
        assert_eq!(result.filters.author.as_deref(), Some("Ravi"));
        assert_eq!(result.filters.source, Some(Source::Email));
        assert!(result.filters.time_range.is_some());
        assert_eq!(result.query_type, QueryType::MemoryRecall);
        assert!(result.keywords.contains(&"budget".to_string()));
    }

    #[test]
    fn test_intent_order_first_match_wins() {
        // Contains both email and music markers; email patterns run first
        let result = process("emails about a song");
        assert_eq!(result.intent, Intent::SearchEmail);
    }

    #[test]
    fn test_calendar_and_music_intents() {
        assert_eq!(process("meetings next steps").intent, Intent::SearchCalendar);
        assert_eq!(process("what did I listen to, which artist").intent, Intent::SearchMusic);
    }

    #[test]
    fn test_pattern_and_recommendation_intents() {
        let result = process("how often do I get invoices");
        assert_eq!(result.intent, Intent::PatternAnalysis);
        assert_eq!(result.query_type, QueryType::Pattern);

        let result = process("recommend something to read");
        assert_eq!(result.intent, Intent::Recommendation);
        assert_eq!(result.query_type, QueryType::Recommendation);
    }

    #[test]
    fn test_general_fallback() {
        let result = process("summarize my week");
        assert_eq!(result.intent, Intent::GeneralSearch);
        assert_eq!(result.query_type, QueryType::General);
    }

    #[test]
    fn test_person_full_name() {
        let result = process("messages from Ravi Kumar please");
        assert_eq!(result.person.as_deref(), Some("Ravi Kumar"));
    }

    #[test]
    fn test_person_rejects_pronouns() {
        let result = process("emails from Me and the team");
        assert_eq!(result.person, None);
    }

    #[test]
    fn test_person_discussed_with_anchor() {
        let result = process("that plan discussed with Alice yesterday");
        assert_eq!(result.person.as_deref(), Some("Alice"));
    }

    #[test]
    fn test_potential_author_from_entities() {
        let result = process("updates about Acme Corp roadmap");
        assert_eq!(result.person, None);
        assert_eq!(result.filters.potential_author.as_deref(), Some("Acme Corp"));
    }

    #[test]
    fn test_entities_skip_sentence_starters() {
        let result = process("What did Alice send about Project Phoenix");
        assert!(!result.entities.iter().any(|e| e.contains("What")));
        assert!(result.entities.contains(&"Alice".to_string()));
        assert!(result.entities.contains(&"Project Phoenix".to_string()));
    }

    #[test]
    fn test_keywords_filtered_and_ranked() {
        let result = process("budget budget report from the finance team");
        assert_eq!(result.keywords.first().map(String::as_str), Some("budget"));
        assert!(result.keywords.contains(&"report".to_string()));
        assert!(result.keywords.contains(&"finance".to_string()));
        // Stop words and short words removed
        assert!(!result.keywords.iter().any(|k| k == "the" || k == "from"));
    }

    #[test]
    fn test_keyword_cap() {
        let processor = QueryProcessor::new(QueryProcessorConfig { max_keywords: 3 });
        let result = processor.process(
            "alpha beta gamma delta epsilon zeta eta theta",
            now(),
        );
        assert_eq!(result.keywords.len(), 3);
    }
}

//! Result ranking
//!
//! Re-scores search hits with a weighted combination of vector, recency,
//! keyword, source, and length signals, then diversifies near-duplicates
//! and applies the intent boost. Every sub-score lands in [0, 1] and the
//! final score is the dot product of weights and sub-scores, clamped.

use crate::query::ProcessedQuery;
use chrono::{DateTime, Utc};
use recall_common::config::RankerWeightsConfig;
use recall_common::db::models::Source;
use recall_common::db::SearchHit;
use serde::Serialize;
use std::collections::HashSet;

/// Characters of content considered by the diversification prefix
const DIVERSITY_PREFIX_CHARS: usize = 200;

/// Content length window scoring 1.0
const LENGTH_IDEAL_MIN: usize = 200;
const LENGTH_IDEAL_MAX: usize = 2000;

/// Ranker configuration; weights and tables come from config
#[derive(Debug, Clone)]
pub struct RankerConfig {
    pub weights: RankerWeightsConfig,
    /// Recency half-life in days
    pub decay_days: f64,
    /// Jaccard overlap above which a candidate is dropped
    pub diversity_threshold: f64,
    /// Diversification toggle
    pub diversify: bool,
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            weights: default_weights(),
            decay_days: 60.0,
            diversity_threshold: 0.85,
            diversify: true,
        }
    }
}

fn default_weights() -> RankerWeightsConfig {
    // Matches the config defaults; duplicated here so the ranker stands
    // alone in tests
    RankerWeightsConfig {
        vector: 0.45,
        recency: 0.15,
        keyword: 0.25,
        source: 0.10,
        length: 0.05,
        intent_boost: 1.3,
        priority_email: 1.0,
        priority_calendar: 0.95,
        priority_music: 0.80,
        priority_default: 0.5,
    }
}

/// Per-signal breakdown, exposed for debuggability
#[derive(Debug, Clone, Serialize)]
pub struct SignalBreakdown {
    pub vector: f64,
    pub recency: f64,
    pub keyword: f64,
    pub source: f64,
    pub length: f64,
    /// Weighted contributions in the same order
    pub weighted_vector: f64,
    pub weighted_recency: f64,
    pub weighted_keyword: f64,
    pub weighted_source: f64,
    pub weighted_length: f64,
    /// True when the intent boost multiplied the final score
    pub intent_boosted: bool,
}

/// A hit with its final score and signal breakdown
#[derive(Debug, Clone)]
pub struct RankedDocument {
    pub hit: SearchHit,
    pub score: f64,
    pub signals: SignalBreakdown,
}

/// Result ranker
pub struct Ranker {
    config: RankerConfig,
}

impl Ranker {
    pub fn new(config: RankerConfig) -> Self {
        Self { config }
    }

    /// Score, diversify, boost, and sort hits for a processed query.
    ///
    /// `now` anchors recency decay; production callers pass `Utc::now()`.
    pub fn rank(
        &self,
        hits: Vec<SearchHit>,
        query: &ProcessedQuery,
        now: DateTime<Utc>,
    ) -> Vec<RankedDocument> {
        let mut ranked: Vec<RankedDocument> = hits
            .into_iter()
            .map(|hit| self.score_hit(hit, query, now))
            .collect();

        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        if self.config.diversify {
            ranked = diversify(ranked, self.config.diversity_threshold);
        }

        self.apply_intent_boost(&mut ranked, query);

        ranked
    }

    /// Compute sub-scores and the weighted final score for one hit
    fn score_hit(&self, hit: SearchHit, query: &ProcessedQuery, now: DateTime<Utc>) -> RankedDocument {
        let weights = &self.config.weights;

        let vector = hit.similarity.clamp(0.0, 1.0);
        let recency = recency_score(hit.timestamp.with_timezone(&Utc), now, self.config.decay_days);
        let keyword = keyword_score(&hit, query);
        let source = self.source_priority(&hit.source);
        let length = length_score(hit.content.chars().count());

        let weighted_vector = weights.vector * vector;
        let weighted_recency = weights.recency * recency;
        let weighted_keyword = weights.keyword * keyword;
        let weighted_source = weights.source * source;
        let weighted_length = weights.length * length;

        let score = (weighted_vector
            + weighted_recency
            + weighted_keyword
            + weighted_source
            + weighted_length)
            .clamp(0.0, 1.0);

        RankedDocument {
            hit,
            score,
            signals: SignalBreakdown {
                vector,
                recency,
                keyword,
                source,
                length,
                weighted_vector,
                weighted_recency,
                weighted_keyword,
                weighted_source,
                weighted_length,
                intent_boosted: false,
            },
        }
    }

    fn source_priority(&self, source: &str) -> f64 {
        let weights = &self.config.weights;
        match Source::parse(source) {
            Some(Source::Email) => weights.priority_email,
            Some(Source::Calendar) => weights.priority_calendar,
            Some(Source::Music) => weights.priority_music,
            None => weights.priority_default,
        }
    }

    /// Multiply scores of documents whose source matches the query
    /// intent, then re-sort
    fn apply_intent_boost(&self, ranked: &mut [RankedDocument], query: &ProcessedQuery) {
        let Some(intent_source) = query.intent.source() else {
            return;
        };

        for doc in ranked.iter_mut() {
            if doc.hit.source == intent_source.as_str() {
                doc.score = (doc.score * self.config.weights.intent_boost).clamp(0.0, 1.0);
                doc.signals.intent_boosted = true;
            }
        }

        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    }

    /// Full per-signal breakdown for one ranked result
    pub fn explain(&self, result: &RankedDocument) -> serde_json::Value {
        serde_json::json!({
            "documentId": result.hit.document_id,
            "finalScore": result.score,
            "signals": result.signals,
            "weights": {
                "vector": self.config.weights.vector,
                "recency": self.config.weights.recency,
                "keyword": self.config.weights.keyword,
                "source": self.config.weights.source,
                "length": self.config.weights.length,
            },
        })
    }
}

impl Default for Ranker {
    fn default() -> Self {
        Self::new(RankerConfig::default())
    }
}

/// Exponential decay with a half-life of `decay_days`
fn recency_score(timestamp: DateTime<Utc>, now: DateTime<Utc>, decay_days: f64) -> f64 {
    let days_old = (now - timestamp).num_seconds() as f64 / 86_400.0;
    if days_old <= 0.0 {
        return 1.0;
    }
    (-days_old * std::f64::consts::LN_2 / decay_days).exp().clamp(0.0, 1.0)
}

/// Keyword signal: field hits per keyword, averaged, plus a raw-query
/// bonus; any boost already applied by hybrid search blends in at half
/// weight
fn keyword_score(hit: &SearchHit, query: &ProcessedQuery) -> f64 {
    let content_lower = hit.content.to_lowercase();
    let title_lower = hit.title.as_deref().unwrap_or("").to_lowercase();
    let author_lower = hit.author.as_deref().unwrap_or("").to_lowercase();

    let mut score = 0.0;

    if !query.keywords.is_empty() {
        let mut keyword_total = 0.0;
        for keyword in &query.keywords {
            if title_lower.contains(keyword) {
                keyword_total += 0.4;
            }
            if author_lower.contains(keyword) {
                keyword_total += 0.3;
            }
            if content_lower.contains(keyword) {
                keyword_total += 0.2;
            }
        }

        let raw_query = query.original.trim().to_lowercase();
        if !raw_query.is_empty() && content_lower.contains(&raw_query) {
            keyword_total += 0.5;
        }

        score = keyword_total / query.keywords.len() as f64;
    }

    score += hit.keyword_boost * 0.5;
    score.clamp(0.0, 1.0)
}

/// Length signal: 1.0 inside the ideal window, linear ramp below,
/// log-decay penalty above
fn length_score(chars: usize) -> f64 {
    if chars == 0 {
        return 0.0;
    }
    if chars < LENGTH_IDEAL_MIN {
        return chars as f64 / LENGTH_IDEAL_MIN as f64;
    }
    if chars <= LENGTH_IDEAL_MAX {
        return 1.0;
    }
    (1.0 / (1.0 + (chars as f64 / LENGTH_IDEAL_MAX as f64).ln())).clamp(0.0, 1.0)
}

/// Keep a result only when its content-prefix word overlap with every
/// kept result stays at or below the threshold
fn diversify(ranked: Vec<RankedDocument>, threshold: f64) -> Vec<RankedDocument> {
    let mut kept: Vec<RankedDocument> = Vec::with_capacity(ranked.len());
    let mut kept_prefixes: Vec<HashSet<String>> = Vec::new();

    for doc in ranked {
        let prefix = prefix_words(&doc.hit.content);
        let near_duplicate = kept_prefixes
            .iter()
            .any(|existing| jaccard(&prefix, existing) > threshold);

        if !near_duplicate {
            kept_prefixes.push(prefix);
            kept.push(doc);
        }
    }

    kept
}

fn prefix_words(content: &str) -> HashSet<String> {
    content
        .chars()
        .take(DIVERSITY_PREFIX_CHARS)
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .map(|w| w.to_string())
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    intersection as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryProcessor;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 15, 12, 0, 0).unwrap()
    }

    fn hit(
        document_id: &str,
        source: &str,
        content: &str,
        similarity: f64,
        age_days: i64,
    ) -> SearchHit {
        SearchHit {
            document_id: document_id.to_string(),
            source: source.to_string(),
            doc_type: "message".to_string(),
            title: Some("Weekly budget review".to_string()),
            author: Some("Ravi Kumar".to_string()),
            content: content.to_string(),
            timestamp: (now() - Duration::days(age_days)).into(),
            metadata: serde_json::json!({}),
            similarity,
            keyword_boost: 0.0,
        }
    }

    fn query(text: &str) -> ProcessedQuery {
        QueryProcessor::default().process(text, now())
    }

    #[test]
    fn test_score_bounds_and_dot_product() {
        let ranker = Ranker::default();
        let q = query("budget report");
        let body = "budget ".repeat(100);
        let ranked = ranker.rank(vec![hit("d1", "email", &body, 0.9, 5)], &q, now());

        let doc = &ranked[0];
        assert!(doc.score >= 0.0 && doc.score <= 1.0);

        let expected = doc.signals.weighted_vector
            + doc.signals.weighted_recency
            + doc.signals.weighted_keyword
            + doc.signals.weighted_source
            + doc.signals.weighted_length;
        // Intent boost may multiply afterwards; this query has email intent
        // only if it names email, which it does not
        assert!((doc.score - expected.clamp(0.0, 1.0)).abs() < 1e-9);
    }

    #[test]
    fn test_recency_half_life() {
        let score_now = recency_score(now(), now(), 60.0);
        let score_half = recency_score(now() - Duration::days(60), now(), 60.0);
        let score_old = recency_score(now() - Duration::days(600), now(), 60.0);

        assert!((score_now - 1.0).abs() < 1e-9);
        assert!((score_half - 0.5).abs() < 1e-6);
        assert!(score_old < 0.01);
    }

    #[test]
    fn test_future_timestamp_clamps_to_one() {
        let score = recency_score(now() + Duration::days(3), now(), 60.0);
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_length_score_boundaries() {
        // Exactly 200 and exactly 2000 characters score 1.0
        assert!((length_score(200) - 1.0).abs() < 1e-9);
        assert!((length_score(2000) - 1.0).abs() < 1e-9);

        assert!((length_score(100) - 0.5).abs() < 1e-9);
        assert_eq!(length_score(0), 0.0);

        let long = length_score(20_000);
        assert!(long < 1.0 && long > 0.0);
        // Monotonic decay above the window
        assert!(length_score(5_000) > length_score(50_000));
    }

    #[test]
    fn test_keyword_score_fields() {
        let q = query("budget review");
        let mut h = hit("d1", "email", "nothing relevant here", 0.5, 1);
        h.title = Some("Budget review".to_string());
        h.author = None;

        // Both keywords hit the title (0.4 each), "review" also misses
        // content; total 0.8 / 2 keywords = 0.4
        let score = keyword_score(&h, &q);
        assert!((score - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_raw_query_bonus() {
        let q = query("budget review");
        let mut h = hit("d1", "email", "the budget review happened", 0.5, 1);
        h.title = None;
        h.author = None;

        // content hits: 0.2 + 0.2, raw query bonus 0.5 => 0.9 / 2
        let score = keyword_score(&h, &q);
        assert!((score - 0.45).abs() < 1e-9);
    }

    #[test]
    fn test_hybrid_boost_blends_at_half_weight() {
        let q = query("zzz yyy");
        let mut h = hit("d1", "email", "unrelated", 0.5, 1);
        h.title = None;
        h.author = None;
        h.keyword_boost = 0.1;

        let score = keyword_score(&h, &q);
        assert!((score - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_source_priorities() {
        let ranker = Ranker::default();
        assert!((ranker.source_priority("email") - 1.0).abs() < 1e-9);
        assert!((ranker.source_priority("calendar") - 0.95).abs() < 1e-9);
        assert!((ranker.source_priority("music") - 0.80).abs() < 1e-9);
        assert!((ranker.source_priority("unknown") - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_intent_boost_reorders() {
        let ranker = Ranker::default();
        // Email intent query
        let q = query("emails about the budget");

        let email_body = "budget numbers attached for the quarter review meeting".repeat(5);
        let music_body = "a fresh playlist of ambient focus tracks for work sessions".repeat(5);

        let hits = vec![
            hit("music_1", "music", &music_body, 0.95, 1),
            hit("email_1", "email", &email_body, 0.80, 1),
        ];

        let ranked = ranker.rank(hits, &q, now());
        assert_eq!(ranked[0].hit.document_id, "email_1");
        assert!(ranked[0].signals.intent_boosted);
        assert!(!ranked[1].signals.intent_boosted);
        assert!(ranked[0].score <= 1.0);
    }

    #[test]
    fn test_diversification_drops_near_duplicates() {
        let ranker = Ranker::default();
        let q = query("budget");

        let body = "identical content prefix repeated for the diversity check window";
        let hits = vec![
            hit("d1", "email", body, 0.9, 1),
            hit("d2", "email", body, 0.85, 1),
            hit("d3", "email", "completely different text about travel plans", 0.8, 1),
        ];

        let ranked = ranker.rank(hits, &q, now());
        let ids: Vec<&str> = ranked.iter().map(|r| r.hit.document_id.as_str()).collect();
        assert!(ids.contains(&"d1"));
        assert!(!ids.contains(&"d2"));
        assert!(ids.contains(&"d3"));
    }

    #[test]
    fn test_diversification_can_be_disabled() {
        let ranker = Ranker::new(RankerConfig {
            diversify: false,
            ..RankerConfig::default()
        });
        let q = query("budget");

        let body = "identical content for both documents in this test";
        let ranked = ranker.rank(
            vec![hit("d1", "email", body, 0.9, 1), hit("d2", "email", body, 0.8, 1)],
            &q,
            now(),
        );
        assert_eq!(ranked.len(), 2);
    }

    #[test]
    fn test_explain_exposes_breakdown() {
        let ranker = Ranker::default();
        let q = query("budget");
        let ranked = ranker.rank(vec![hit("d1", "email", "budget text", 0.7, 2)], &q, now());

        let explanation = ranker.explain(&ranked[0]);
        assert_eq!(explanation["documentId"], "d1");
        assert!(explanation["signals"]["vector"].as_f64().is_some());
        assert!(explanation["weights"]["keyword"].as_f64().is_some());
    }

    #[test]
    fn test_jaccard_edges() {
        let a: HashSet<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();
        let b: HashSet<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();
        let c: HashSet<String> = ["x"].iter().map(|s| s.to_string()).collect();

        assert!((jaccard(&a, &b) - 1.0).abs() < 1e-9);
        assert_eq!(jaccard(&a, &c), 0.0);
    }
}

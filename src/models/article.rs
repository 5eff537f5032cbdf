use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A discovered/enriched article, uniquely identified by its canonical URI.
/// URI is the sole natural key; re-ingest is always an upsert (§3.1).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Article {
    pub uri: String,
    pub title: String,
    pub news_source: String,
    pub publication_date: Option<String>,
    pub submission_date: DateTime<Utc>,
    pub topic: String,

    // analyzer outputs (C6)
    pub summary: Option<String>,
    pub category: Option<String>,
    pub sentiment: Option<String>,
    pub sentiment_explanation: Option<String>,
    pub future_signal: Option<String>,
    pub future_signal_explanation: Option<String>,
    pub time_to_impact: Option<String>,
    pub time_to_impact_explanation: Option<String>,
    pub driver_type: Option<String>,
    pub driver_type_explanation: Option<String>,
    pub tags: Vec<String>,
    pub analyzed: bool,

    // media-bias fields (C5)
    pub bias: Option<String>,
    pub factual_reporting: Option<String>,
    pub mbfc_credibility_rating: Option<String>,
    pub bias_source: Option<String>,
    pub bias_country: Option<String>,
    pub press_freedom: Option<String>,
    pub media_type: Option<String>,
    pub popularity: Option<String>,

    // relevance fields (C7)
    pub topic_alignment_score: Option<f64>,
    pub keyword_relevance_score: Option<f64>,
    pub confidence_score: Option<f64>,
    pub overall_match_explanation: Option<String>,
    pub extracted_article_topics: Vec<String>,
    pub extracted_article_keywords: Vec<String>,

    // auto-ingest fields (C11)
    pub auto_ingested: bool,
    pub ingest_status: IngestStatus,
    pub quality_score: Option<f64>,
    pub quality_issues: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IngestStatus {
    Pending,
    Approved,
    Failed,
    Manual,
}

impl Default for IngestStatus {
    fn default() -> Self {
        IngestStatus::Pending
    }
}

impl Article {
    /// Minimal article as inserted by the keyword monitor (§4.7) on first
    /// observation of a URI: title/source/publication_date/summary/topic only.
    pub fn minimal(uri: impl Into<String>, title: impl Into<String>, news_source: impl Into<String>, publication_date: Option<String>, summary: Option<String>, topic: impl Into<String>) -> Self {
        Article {
            uri: uri.into(),
            title: title.into(),
            news_source: news_source.into(),
            publication_date,
            submission_date: Utc::now(),
            topic: topic.into(),
            summary,
            category: None,
            sentiment: None,
            sentiment_explanation: None,
            future_signal: None,
            future_signal_explanation: None,
            time_to_impact: None,
            time_to_impact_explanation: None,
            driver_type: None,
            driver_type_explanation: None,
            tags: Vec::new(),
            analyzed: false,
            bias: None,
            factual_reporting: None,
            mbfc_credibility_rating: None,
            bias_source: None,
            bias_country: None,
            press_freedom: None,
            media_type: None,
            popularity: None,
            topic_alignment_score: None,
            keyword_relevance_score: None,
            confidence_score: None,
            overall_match_explanation: None,
            extracted_article_topics: Vec::new(),
            extracted_article_keywords: Vec::new(),
            auto_ingested: false,
            ingest_status: IngestStatus::Pending,
            quality_score: None,
            quality_issues: Vec::new(),
        }
    }

    /// Best-available text for embedding, per §4.1: raw > summary > title.
    pub fn best_text<'a>(&'a self, raw: Option<&'a str>) -> Option<&'a str> {
        raw.filter(|s| !s.is_empty())
            .or_else(|| self.summary.as_deref().filter(|s| !s.is_empty()))
            .or_else(|| Some(self.title.as_str()).filter(|s| !s.is_empty()))
    }
}

/// URI → full scraped document text, one-to-one with Article (§3.1).
/// Truncated to `max_chars` before storage and before any LLM call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawArticle {
    pub uri: String,
    pub raw_markdown: String,
    pub topic: String,
}

pub const MAX_RAW_TEXT_CHARS: usize = 65_000;

/// Truncate at a word boundary where possible, per §4.4/§4.6.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    match truncated.rfind(char::is_whitespace) {
        Some(idx) if idx > max_chars / 2 => truncated[..idx].to_string(),
        _ => truncated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn best_text_prefers_raw_over_summary_over_title() {
        let mut a = Article::minimal("u1", "Title", "src", None, Some("summary".into()), "topic");
        assert_eq!(a.best_text(Some("raw text")), Some("raw text"));
        assert_eq!(a.best_text(None), Some("summary"));
        a.summary = None;
        assert_eq!(a.best_text(None), Some("Title"));
    }

    #[test]
    fn truncate_prefers_word_boundary() {
        let text = "one two three four five";
        let out = truncate(text, 10);
        assert!(!out.is_empty());
        assert!(out.len() <= 10 || out == text);
    }

    #[test]
    fn truncate_is_noop_under_budget() {
        assert_eq!(truncate("short", 65_000), "short");
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named set of keywords sharing a topic, scheduled together (§3.1).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeywordGroup {
    pub id: String,
    pub name: String,
    pub topic: String,
}

/// A literal query string belonging to a group, many-to-one (§3.1).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Keyword {
    pub id: String,
    pub group_id: String,
    pub keyword: String,
    pub last_checked: Option<DateTime<Utc>>,
}

/// A `(keyword, article)` match recorded during a monitor tick. Unique on
/// `(keyword_set, article_uri)`; the queue that feeds C11 (§3.1).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Alert {
    pub id: String,
    pub keyword_ids: Vec<String>,
    pub article_uri: String,
    pub detected_at: DateTime<Utc>,
    pub is_read: bool,
}

impl Alert {
    pub fn new(keyword_id: impl Into<String>, article_uri: impl Into<String>) -> Self {
        Alert {
            id: uuid::Uuid::new_v4().to_string(),
            keyword_ids: vec![keyword_id.into()],
            article_uri: article_uri.into(),
            detected_at: Utc::now(),
            is_read: false,
        }
    }
}

/// Domain-keyed media-bias entry (§3.1). A domain appears at most once;
/// disabled sources are auto-enabled on first successful lookup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaBiasSource {
    pub id: String,
    pub source: String,
    pub country: Option<String>,
    pub bias: Option<String>,
    pub factual_reporting: Option<String>,
    pub press_freedom: Option<String>,
    pub media_type: Option<String>,
    pub popularity: Option<String>,
    pub mbfc_credibility_rating: Option<String>,
    pub enabled: bool,
}

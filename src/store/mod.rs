mod surreal;

pub use surreal::SurrealStore;

use async_trait::async_trait;

use crate::error::AppResult;
use crate::models::{
    Alert, Article, KeywordGroup, KeywordMonitorSettings, KeywordMonitorStatus, MediaBiasSource,
    RawArticle,
};
use crate::models::keyword::Keyword;

/// Durable state for articles, raw content, keyword groups, alerts, settings
/// and media-bias sources (C1, §4 / §6.2). One SurrealDB table per logical
/// table named in §6.2, keyed by typed record ids in the teacher's
/// `Thing`/`RecordId` idiom.
#[async_trait]
pub trait RelationalStore: Send + Sync {
    // --- articles ---
    async fn upsert_article(&self, article: Article) -> AppResult<()>;
    async fn get_article(&self, uri: &str) -> AppResult<Option<Article>>;
    async fn list_articles_by_topic(&self, topic: &str) -> AppResult<Vec<Article>>;

    // --- raw articles ---
    async fn upsert_raw_article(&self, raw: RawArticle) -> AppResult<()>;
    async fn get_raw_article(&self, uri: &str) -> AppResult<Option<RawArticle>>;

    // --- keyword groups / keywords ---
    async fn upsert_keyword_group(&self, group: KeywordGroup) -> AppResult<()>;
    async fn get_keyword_group(&self, id: &str) -> AppResult<Option<KeywordGroup>>;
    async fn list_keyword_groups(&self) -> AppResult<Vec<KeywordGroup>>;

    async fn upsert_keyword(&self, keyword: Keyword) -> AppResult<()>;
    /// Enabled keywords, in id order (§5 ordering guarantee), optionally
    /// filtered to a single group.
    async fn list_keywords(&self, group_id: Option<&str>) -> AppResult<Vec<Keyword>>;
    async fn set_keyword_last_checked(&self, id: &str, when: chrono::DateTime<chrono::Utc>) -> AppResult<()>;

    // --- alerts ---
    /// Insert `(keyword_id, article_uri)` with `ON CONFLICT DO NOTHING`
    /// semantics; returns `true` iff a new row was actually inserted.
    async fn insert_alert_if_absent(&self, keyword_id: &str, article_uri: &str) -> AppResult<bool>;
    async fn list_alerts(&self, show_read: bool) -> AppResult<Vec<Alert>>;
    /// Unread, not-yet-auto-ingested alerts, in detection order, capped at `limit`.
    async fn list_pending_alerts(&self, limit: usize) -> AppResult<Vec<Alert>>;
    async fn mark_alert_read(&self, id: &str, read: bool) -> AppResult<()>;

    // --- media bias ---
    async fn get_media_bias(&self, domain: &str) -> AppResult<Option<MediaBiasSource>>;
    async fn upsert_media_bias(&self, source: MediaBiasSource) -> AppResult<()>;
    async fn enable_media_bias(&self, domain: &str) -> AppResult<()>;

    // --- settings / status singletons ---
    async fn get_settings(&self) -> AppResult<KeywordMonitorSettings>;
    async fn save_settings(&self, settings: KeywordMonitorSettings) -> AppResult<()>;
    async fn get_status(&self) -> AppResult<KeywordMonitorStatus>;
    async fn save_status(&self, status: KeywordMonitorStatus) -> AppResult<()>;
    /// Atomic single-row increment of `requests_today`, per §5/§9's decision
    /// to rely on SurrealDB row-level atomicity rather than an app mutex.
    /// Returns the post-increment count.
    async fn increment_requests_today(&self) -> AppResult<u32>;
}

use async_trait::async_trait;
use chrono::Utc;
use surrealdb::engine::any::{self, Any};
use surrealdb::opt::RecordId;
use surrealdb::Surreal;

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::metrics::{OperationType, PerformanceMonitor};
use crate::models::keyword::Keyword;
use crate::models::{
    Alert, Article, KeywordGroup, KeywordMonitorSettings, KeywordMonitorStatus, MediaBiasSource,
    RawArticle,
};

use super::RelationalStore;

const NS: &str = "newsradar";
const DB: &str = "newsradar";

const SETTINGS_ID: &str = "singleton";
const STATUS_ID: &str = "singleton";

/// Embedded-SurrealDB-backed relational store (C1). Connects via the `any`
/// engine so the same code path serves both the in-memory (`mem://`, used in
/// tests) and on-disk RocksDB (`rocksdb://path`, used in production) engines,
/// matching `DataStore`'s `Thing`/`RecordId` conventions in the teacher's
/// `surrealdb_types.rs`/`conversions.rs`.
pub struct SurrealStore {
    db: Surreal<Any>,
    metrics: std::sync::Arc<PerformanceMonitor>,
}

fn article_rid(uri: &str) -> RecordId {
    RecordId::from(("articles", uri_key(uri)))
}

fn raw_article_rid(uri: &str) -> RecordId {
    RecordId::from(("raw_articles", uri_key(uri)))
}

/// SurrealDB record-id keys must not contain arbitrary URI characters;
/// percent-decode-free normalization keeps the mapping reversible enough for
/// lookups while avoiding record-id parse errors on `:`/`/`.
fn uri_key(uri: &str) -> String {
    uri.replace(['/', ':', '?', '#', '.'], "_")
}

impl SurrealStore {
    pub async fn connect(config: &AppConfig, metrics: std::sync::Arc<PerformanceMonitor>) -> AppResult<Self> {
        let endpoint = match config.db_type.as_str() {
            "rocksdb" => format!("rocksdb://{}", config.db_name),
            _ => "mem://".to_string(),
        };
        let db = any::connect(endpoint)
            .await
            .map_err(|e| AppError::Internal(format!("surrealdb connect: {e}")))?;
        db.use_ns(NS).use_db(DB).await?;
        Ok(SurrealStore { db, metrics })
    }

    fn timer(&self, op: OperationType) -> crate::metrics::OperationTimer {
        self.metrics.start_operation(op)
    }
}

#[async_trait]
impl RelationalStore for SurrealStore {
    async fn upsert_article(&self, article: Article) -> AppResult<()> {
        let timer = self.timer(OperationType::DbWrite);
        let rid = article_rid(&article.uri);
        let res: AppResult<()> = async {
            let _: Option<Article> = self.db.upsert(rid).content(article).await?;
            Ok(())
        }
        .await;
        match &res {
            Ok(_) => timer.complete_success(),
            Err(e) => timer.complete_error(e.to_string()),
        }
        res
    }

    async fn get_article(&self, uri: &str) -> AppResult<Option<Article>> {
        let timer = self.timer(OperationType::DbRead);
        let res: AppResult<Option<Article>> = async {
            let article: Option<Article> = self.db.select(article_rid(uri)).await?;
            Ok(article)
        }
        .await;
        match &res {
            Ok(_) => timer.complete_success(),
            Err(e) => timer.complete_error(e.to_string()),
        }
        res
    }

    async fn list_articles_by_topic(&self, topic: &str) -> AppResult<Vec<Article>> {
        let timer = self.timer(OperationType::DbRead);
        let res: AppResult<Vec<Article>> = async {
            let mut response = self
                .db
                .query("SELECT * FROM articles WHERE topic = $topic")
                .bind(("topic", topic.to_string()))
                .await?;
            let articles: Vec<Article> = response.take(0)?;
            Ok(articles)
        }
        .await;
        match &res {
            Ok(_) => timer.complete_success(),
            Err(e) => timer.complete_error(e.to_string()),
        }
        res
    }

    async fn upsert_raw_article(&self, raw: RawArticle) -> AppResult<()> {
        let rid = raw_article_rid(&raw.uri);
        let _: Option<RawArticle> = self.db.upsert(rid).content(raw).await?;
        Ok(())
    }

    async fn get_raw_article(&self, uri: &str) -> AppResult<Option<RawArticle>> {
        let raw: Option<RawArticle> = self.db.select(raw_article_rid(uri)).await?;
        Ok(raw)
    }

    async fn upsert_keyword_group(&self, group: KeywordGroup) -> AppResult<()> {
        let rid = RecordId::from(("keyword_groups", group.id.clone()));
        let _: Option<KeywordGroup> = self.db.upsert(rid).content(group).await?;
        Ok(())
    }

    async fn get_keyword_group(&self, id: &str) -> AppResult<Option<KeywordGroup>> {
        let group: Option<KeywordGroup> = self.db.select(("keyword_groups", id)).await?;
        Ok(group)
    }

    async fn list_keyword_groups(&self) -> AppResult<Vec<KeywordGroup>> {
        let groups: Vec<KeywordGroup> = self.db.select("keyword_groups").await?;
        Ok(groups)
    }

    async fn upsert_keyword(&self, keyword: Keyword) -> AppResult<()> {
        let rid = RecordId::from(("monitored_keywords", keyword.id.clone()));
        let _: Option<Keyword> = self.db.upsert(rid).content(keyword).await?;
        Ok(())
    }

    async fn list_keywords(&self, group_id: Option<&str>) -> AppResult<Vec<Keyword>> {
        let mut all: Vec<Keyword> = self.db.select("monitored_keywords").await?;
        if let Some(gid) = group_id {
            all.retain(|k| k.group_id == gid);
        }
        // §5 ordering guarantee: iterate keywords in id order within a tick.
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }

    async fn set_keyword_last_checked(&self, id: &str, when: chrono::DateTime<chrono::Utc>) -> AppResult<()> {
        let mut response = self
            .db
            .query("UPDATE monitored_keywords SET last_checked = $when WHERE id = $id")
            .bind(("when", when))
            .bind(("id", RecordId::from(("monitored_keywords", id.to_string()))))
            .await?;
        let _: Vec<Keyword> = response.take(0)?;
        Ok(())
    }

    async fn insert_alert_if_absent(&self, keyword_id: &str, article_uri: &str) -> AppResult<bool> {
        let existing: Option<Alert> = {
            let mut response = self
                .db
                .query(
                    "SELECT * FROM keyword_article_matches WHERE article_uri = $uri AND $kid IN keyword_ids LIMIT 1",
                )
                .bind(("uri", article_uri.to_string()))
                .bind(("kid", keyword_id.to_string()))
                .await?;
            let rows: Vec<Alert> = response.take(0)?;
            rows.into_iter().next()
        };
        if existing.is_some() {
            return Ok(false);
        }
        let alert = Alert::new(keyword_id, article_uri);
        let rid = RecordId::from(("keyword_article_matches", alert.id.clone()));
        let _: Option<Alert> = self.db.create(rid).content(alert).await?;
        Ok(true)
    }

    async fn list_alerts(&self, show_read: bool) -> AppResult<Vec<Alert>> {
        let mut all: Vec<Alert> = self.db.select("keyword_article_matches").await?;
        if !show_read {
            all.retain(|a| !a.is_read);
        }
        all.sort_by_key(|a| a.detected_at);
        Ok(all)
    }

    async fn list_pending_alerts(&self, limit: usize) -> AppResult<Vec<Alert>> {
        let mut response = self
            .db
            .query(
                "SELECT * FROM keyword_article_matches WHERE is_read = false \
                 AND article_uri NOT IN (SELECT VALUE uri FROM articles WHERE auto_ingested = true) \
                 ORDER BY detected_at",
            )
            .await?;
        let mut rows: Vec<Alert> = response.take(0)?;
        rows.truncate(limit);
        Ok(rows)
    }

    async fn mark_alert_read(&self, id: &str, read: bool) -> AppResult<()> {
        let mut response = self
            .db
            .query("UPDATE keyword_article_matches SET is_read = $read WHERE id = $id")
            .bind(("read", read))
            .bind(("id", RecordId::from(("keyword_article_matches", id.to_string()))))
            .await?;
        let _: Vec<Alert> = response.take(0)?;
        Ok(())
    }

    async fn get_media_bias(&self, domain: &str) -> AppResult<Option<MediaBiasSource>> {
        let mut response = self
            .db
            .query("SELECT * FROM mediabias WHERE source = $domain LIMIT 1")
            .bind(("domain", domain.to_string()))
            .await?;
        let rows: Vec<MediaBiasSource> = response.take(0)?;
        Ok(rows.into_iter().next())
    }

    async fn upsert_media_bias(&self, source: MediaBiasSource) -> AppResult<()> {
        let rid = RecordId::from(("mediabias", source.id.clone()));
        let _: Option<MediaBiasSource> = self.db.upsert(rid).content(source).await?;
        Ok(())
    }

    async fn enable_media_bias(&self, domain: &str) -> AppResult<()> {
        // Single-row UPDATE, no read-modify-write lock (§5).
        let mut response = self
            .db
            .query("UPDATE mediabias SET enabled = true WHERE source = $domain")
            .bind(("domain", domain.to_string()))
            .await?;
        let _: Vec<MediaBiasSource> = response.take(0)?;
        Ok(())
    }

    async fn get_settings(&self) -> AppResult<KeywordMonitorSettings> {
        let settings: Option<KeywordMonitorSettings> =
            self.db.select(("keyword_monitor_settings", SETTINGS_ID)).await?;
        Ok(settings.unwrap_or_default())
    }

    async fn save_settings(&self, settings: KeywordMonitorSettings) -> AppResult<()> {
        let _: Option<KeywordMonitorSettings> = self
            .db
            .upsert(("keyword_monitor_settings", SETTINGS_ID))
            .content(settings)
            .await?;
        Ok(())
    }

    async fn get_status(&self) -> AppResult<KeywordMonitorStatus> {
        let status: Option<KeywordMonitorStatus> =
            self.db.select(("keyword_monitor_status", STATUS_ID)).await?;
        Ok(status.unwrap_or_default())
    }

    async fn save_status(&self, status: KeywordMonitorStatus) -> AppResult<()> {
        let _: Option<KeywordMonitorStatus> = self
            .db
            .upsert(("keyword_monitor_status", STATUS_ID))
            .content(status)
            .await?;
        Ok(())
    }

    async fn increment_requests_today(&self) -> AppResult<u32> {
        let today = Utc::now().date_naive();
        let mut status = self.get_status().await?;
        status.roll_day_if_needed(today);
        status.requests_today += 1;
        self.save_status(status.clone()).await?;
        Ok(status.requests_today)
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use newsradar::config::AppConfig;
use newsradar::error::{AppError, AppResult};
use newsradar::metrics::PerformanceMonitor;
use newsradar::models::keyword::Keyword;
use newsradar::models::{KeywordGroup, KeywordMonitorSettings, KeywordMonitorStatus};
use newsradar::providers::{ProviderArticle, ProviderCollector, RateLimitedCollector};
use newsradar::store::{RelationalStore, SurrealStore};
use newsradar::{KeywordMonitor, TickSummary};

struct FakeCollector {
    articles: Vec<ProviderArticle>,
}

#[async_trait]
impl ProviderCollector for FakeCollector {
    async fn search_raw(&self, _query: &str, _topic: &str, _max_results: usize, _since_ts: Option<DateTime<Utc>>) -> AppResult<Vec<ProviderArticle>> {
        Ok(self.articles.clone())
    }

    fn name(&self) -> &str {
        "fake"
    }
}

struct FailingCollector;

#[async_trait]
impl ProviderCollector for FailingCollector {
    async fn search_raw(&self, _query: &str, _topic: &str, _max_results: usize, _since_ts: Option<DateTime<Utc>>) -> AppResult<Vec<ProviderArticle>> {
        Err(AppError::ProviderError("upstream unavailable".to_string()))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

async fn memory_store() -> Arc<SurrealStore> {
    let config = AppConfig::default();
    let metrics = Arc::new(PerformanceMonitor::with_defaults());
    Arc::new(SurrealStore::connect(&config, metrics).await.unwrap())
}

async fn seed_keyword(store: &Arc<SurrealStore>, group_id: &str, keyword_id: &str, keyword: &str) {
    store
        .upsert_keyword_group(KeywordGroup { id: group_id.to_string(), name: "AI Policy".to_string(), topic: "ai-policy".to_string() })
        .await
        .unwrap();
    store
        .upsert_keyword(Keyword { id: keyword_id.to_string(), group_id: group_id.to_string(), keyword: keyword.to_string(), last_checked: None })
        .await
        .unwrap();
}

#[tokio::test]
async fn new_article_tick_inserts_article_and_alert() {
    let store = memory_store().await;
    seed_keyword(&store, "g1", "k1", "artificial intelligence").await;

    let collector: Arc<dyn ProviderCollector> = Arc::new(FakeCollector {
        articles: vec![ProviderArticle {
            url: "https://example.com/a1".to_string(),
            title: "AI regulation advances".to_string(),
            source: "example.com".to_string(),
            published_date: Some("2025-01-01".to_string()),
            summary: Some("A new bill on AI regulation.".to_string()),
        }],
    });
    let rate_limited = Arc::new(RateLimitedCollector::new(collector, store.clone()));
    let monitor = KeywordMonitor::new(store.clone(), rate_limited);

    let summary: TickSummary = monitor.check_keywords(None).await.unwrap();
    assert_eq!(summary.new_articles, 1);
    assert_eq!(summary.new_alerts, 1);
    assert!(!summary.aborted_early);

    let article = store.get_article("https://example.com/a1").await.unwrap();
    assert!(article.is_some());
}

#[tokio::test]
async fn second_tick_does_not_duplicate_alert_for_same_article() {
    let store = memory_store().await;
    seed_keyword(&store, "g1", "k1", "artificial intelligence").await;

    let article = ProviderArticle {
        url: "https://example.com/a2".to_string(),
        title: "Same article".to_string(),
        source: "example.com".to_string(),
        published_date: Some("2025-01-02".to_string()),
        summary: None,
    };

    let collector: Arc<dyn ProviderCollector> = Arc::new(FakeCollector { articles: vec![article.clone()] });
    let rate_limited = Arc::new(RateLimitedCollector::new(collector, store.clone()));
    let monitor = KeywordMonitor::new(store.clone(), rate_limited);

    let first = monitor.check_keywords(None).await.unwrap();
    assert_eq!(first.new_alerts, 1);

    let second = monitor.check_keywords(None).await.unwrap();
    assert_eq!(second.new_articles, 0, "article already known, no re-insert");
    assert_eq!(second.new_alerts, 0, "alert already recorded, must not duplicate");
}

#[tokio::test]
async fn provider_error_aborts_tick_and_records_last_error() {
    let store = memory_store().await;
    seed_keyword(&store, "g1", "k1", "artificial intelligence").await;

    let collector: Arc<dyn ProviderCollector> = Arc::new(FailingCollector);
    let rate_limited = Arc::new(RateLimitedCollector::new(collector, store.clone()));
    let monitor = KeywordMonitor::new(store.clone(), rate_limited);

    let summary = monitor.check_keywords(None).await.unwrap();
    assert!(summary.aborted_early);
    assert_eq!(summary.keywords_checked, 0);

    let status = store.get_status().await.unwrap();
    assert!(status.last_error.is_some());
}

#[tokio::test]
async fn rate_limited_collector_blocks_before_calling_provider() {
    let store = memory_store().await;

    let mut settings = KeywordMonitorSettings::default();
    settings.daily_request_limit = 1;
    store.save_settings(settings).await.unwrap();

    let mut status = KeywordMonitorStatus::default();
    status.requests_today = 1;
    store.save_status(status).await.unwrap();

    let collector: Arc<dyn ProviderCollector> = Arc::new(FakeCollector { articles: vec![] });
    let rate_limited = RateLimitedCollector::new(collector, store.clone());

    let result = rate_limited.search("ai", "ai-policy", 10, None).await;
    assert!(matches!(result, Err(AppError::RateLimited(_))));
}

#[tokio::test]
async fn increment_requests_today_rolls_over_on_new_day() {
    let store = memory_store().await;

    let mut status = KeywordMonitorStatus::default();
    status.requests_today = 5;
    status.last_reset_date = chrono::NaiveDate::from_ymd_opt(2000, 1, 1).unwrap();
    store.save_status(status).await.unwrap();

    let count = store.increment_requests_today().await.unwrap();
    assert_eq!(count, 1, "stale day's counter must reset before incrementing");
}

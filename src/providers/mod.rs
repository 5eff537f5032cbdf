pub mod newsapi;

pub use newsapi::NewsApiCollector;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{AppError, AppResult};
use crate::store::RelationalStore;

#[derive(Debug, Clone)]
pub struct ProviderArticle {
    pub url: String,
    pub title: String,
    pub source: String,
    pub published_date: Option<String>,
    pub summary: Option<String>,
}

/// Query external news APIs with rate limiting and date windowing (C9,
/// §4.7). Each collector is rate-limited by the shared daily-request
/// counter; exceeding the limit fails `search` with `RateLimited` before any
/// external call is made.
#[async_trait]
pub trait ProviderCollector: Send + Sync {
    async fn search_raw(&self, query: &str, topic: &str, max_results: usize, since_ts: Option<DateTime<Utc>>) -> AppResult<Vec<ProviderArticle>>;
    fn name(&self) -> &str;
}

/// Wraps any `ProviderCollector` with the shared rate-limit gate so the
/// check happens uniformly regardless of which concrete provider is active.
pub struct RateLimitedCollector {
    inner: Arc<dyn ProviderCollector>,
    store: Arc<dyn RelationalStore>,
}

impl RateLimitedCollector {
    pub fn new(inner: Arc<dyn ProviderCollector>, store: Arc<dyn RelationalStore>) -> Self {
        RateLimitedCollector { inner, store }
    }

    pub async fn search(&self, query: &str, topic: &str, max_results: usize, since_ts: Option<DateTime<Utc>>) -> AppResult<Vec<ProviderArticle>> {
        let settings = self.store.get_settings().await?;
        let status = self.store.get_status().await?;
        if status.is_rate_limited(settings.daily_request_limit) {
            return Err(AppError::RateLimited(format!(
                "daily request limit of {} reached",
                settings.daily_request_limit
            )));
        }

        self.store.increment_requests_today().await?;
        self.inner.search_raw(query, topic, max_results, since_ts).await
    }
}

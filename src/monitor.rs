use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info};

use crate::error::AppResult;
use crate::models::Article;
use crate::providers::RateLimitedCollector;
use crate::store::RelationalStore;

#[derive(Debug, Clone, Default)]
pub struct TickSummary {
    pub new_articles: usize,
    pub new_alerts: usize,
    pub keywords_checked: usize,
    pub aborted_early: bool,
}

/// Periodic scheduler: iterates keyword groups, calls the provider
/// collector, emits alerts (C10, §4.7). A provider error aborts the current
/// tick and is recorded in `last_error`; the next tick retries from scratch.
pub struct KeywordMonitor {
    store: Arc<dyn RelationalStore>,
    collector: Arc<RateLimitedCollector>,
}

impl KeywordMonitor {
    pub fn new(store: Arc<dyn RelationalStore>, collector: Arc<RateLimitedCollector>) -> Self {
        KeywordMonitor { store, collector }
    }

    /// Manual trigger; may target a single `group_id` (§4.7).
    pub async fn check_keywords(&self, group_id: Option<&str>) -> AppResult<TickSummary> {
        let tick_start = Utc::now();
        let mut summary = TickSummary::default();

        let keywords = self.store.list_keywords(group_id).await?;
        let mut groups_by_id = HashMap::new();
        for keyword in &keywords {
            if !groups_by_id.contains_key(&keyword.group_id) {
                if let Some(group) = self.store.get_keyword_group(&keyword.group_id).await? {
                    groups_by_id.insert(keyword.group_id.clone(), group);
                }
            }
        }

        for keyword in &keywords {
            let Some(group) = groups_by_id.get(&keyword.group_id) else {
                continue;
            };

            let settings = self.store.get_settings().await?;
            let since = keyword.last_checked;
            let search_result = self
                .collector
                .search(&keyword.keyword, &group.topic, settings.check_interval.max(1) as usize * 10, since)
                .await;

            let articles = match search_result {
                Ok(articles) => articles,
                Err(e) => {
                    error!(error = %e, keyword = %keyword.keyword, "provider error; aborting tick");
                    let mut status = self.store.get_status().await?;
                    status.last_error = Some(e.to_string());
                    self.store.save_status(status).await?;
                    summary.aborted_early = true;
                    return Ok(summary);
                }
            };

            for provider_article in articles {
                let is_new = self.store.get_article(&provider_article.url).await?.is_none();
                if is_new {
                    let article = Article::minimal(
                        provider_article.url.clone(),
                        provider_article.title,
                        provider_article.source,
                        provider_article.published_date,
                        provider_article.summary,
                        group.topic.clone(),
                    );
                    // New-article insert must occur before alert insert (§5 FK ordering).
                    self.store.upsert_article(article).await?;
                    summary.new_articles += 1;
                }

                if self.store.insert_alert_if_absent(&keyword.id, &provider_article.url).await? {
                    summary.new_alerts += 1;
                }
            }

            self.store.set_keyword_last_checked(&keyword.id, tick_start).await?;
            summary.keywords_checked += 1;
        }

        let mut status = self.store.get_status().await?;
        status.last_run_time = Some(tick_start);
        status.last_error = None;
        self.store.save_status(status).await?;

        info!(
            new_articles = summary.new_articles,
            new_alerts = summary.new_alerts,
            keywords_checked = summary.keywords_checked,
            "keyword monitor tick complete"
        );

        Ok(summary)
    }
}

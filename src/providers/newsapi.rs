use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::{AppError, AppResult};

use super::{ProviderArticle, ProviderCollector};

const PROVIDER_CALL_DEADLINE: Duration = Duration::from_secs(30);

/// NewsAPI-style HTTP collector: query, date window, page size. Provider
/// credentials are opaque to the core (§6.4).
pub struct NewsApiCollector {
    client: reqwest::Client,
    api_key: String,
}

#[derive(Deserialize)]
struct NewsApiResponse {
    articles: Vec<NewsApiArticle>,
}

#[derive(Deserialize)]
struct NewsApiArticle {
    url: String,
    title: String,
    #[serde(rename = "publishedAt")]
    published_at: Option<String>,
    description: Option<String>,
    source: NewsApiSource,
}

#[derive(Deserialize)]
struct NewsApiSource {
    name: String,
}

impl NewsApiCollector {
    pub fn new(client: reqwest::Client, api_key: String) -> Self {
        NewsApiCollector { client, api_key }
    }
}

#[async_trait]
impl ProviderCollector for NewsApiCollector {
    async fn search_raw(&self, query: &str, _topic: &str, max_results: usize, since_ts: Option<DateTime<Utc>>) -> AppResult<Vec<ProviderArticle>> {
        let mut request = self
            .client
            .get("https://newsapi.org/v2/everything")
            .header("X-Api-Key", &self.api_key)
            .query(&[("q", query), ("pageSize", &max_results.to_string())]);

        if let Some(since) = since_ts {
            request = request.query(&[("from", since.to_rfc3339())]);
        }

        let resp = tokio::time::timeout(PROVIDER_CALL_DEADLINE, request.send())
            .await
            .map_err(|_| AppError::Timeout(PROVIDER_CALL_DEADLINE))??
            .error_for_status()?;

        let parsed: NewsApiResponse = resp.json().await?;
        Ok(parsed
            .articles
            .into_iter()
            .map(|a| ProviderArticle {
                url: a.url,
                title: a.title,
                source: a.source.name,
                published_date: a.published_at,
                summary: a.description,
            })
            .collect())
    }

    fn name(&self) -> &str {
        "newsapi"
    }
}

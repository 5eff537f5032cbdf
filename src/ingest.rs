use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::analyzer::{AnalysisConfig, ArticleAnalyzer};
use crate::error::AppResult;
use crate::llm::{LlmClient, LlmRequestConfig};
use crate::mediabias::MediaBiasRegistry;
use crate::models::{Article, IngestStatus, RawArticle};
use crate::prompts::PromptRegistry;
use crate::relevance::RelevanceCalculator;
use crate::scraper::Scraper;
use crate::store::RelationalStore;
use crate::vector::VectorStore;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum QualityRecommendation {
    Approve,
    Review,
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QualityReview {
    pub quality_score: f64,
    pub issues_detected: Vec<String>,
    pub recommendation: QualityRecommendation,
    pub explanation: String,
    pub content_type: String,
}

impl QualityReview {
    /// Conservative default on JSON-parse failure (§4.8.1); never fails the
    /// pipeline.
    fn conservative_default() -> Self {
        QualityReview {
            quality_score: 0.3,
            issues_detected: vec!["quality review response could not be parsed".to_string()],
            recommendation: QualityRecommendation::Review,
            explanation: "defaulted after parse failure".to_string(),
            content_type: "other".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum RejectionReason {
    Relevance,
    Quality,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestResultDetail {
    pub uri: String,
    pub status: Option<IngestStatus>,
    pub rejection_reason: Option<RejectionReason>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestRunResult {
    pub processed: usize,
    pub ingested: usize,
    pub rejected_relevance: usize,
    pub rejected_quality: usize,
    pub errors: usize,
    pub details: Vec<IngestResultDetail>,
    pub no_op: bool,
}

/// Orchestrates C8→C6→C7→C5→C1→C2 over unread alerts (C11, §4.8). At most
/// one run at a time across the process, enforced by an `AtomicBool`
/// "already running" flag (§5) — the same guard shape the background task
/// manager uses for its own concurrency cap.
pub struct AutoIngestService {
    store: Arc<dyn RelationalStore>,
    vector_store: Arc<dyn VectorStore>,
    scraper: Arc<Scraper>,
    analyzer: Arc<ArticleAnalyzer>,
    relevance: Arc<RelevanceCalculator>,
    media_bias: Arc<MediaBiasRegistry>,
    llm: Arc<LlmClient>,
    prompts: Arc<PromptRegistry>,
    running: AtomicBool,
}

impl AutoIngestService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn RelationalStore>,
        vector_store: Arc<dyn VectorStore>,
        scraper: Arc<Scraper>,
        analyzer: Arc<ArticleAnalyzer>,
        relevance: Arc<RelevanceCalculator>,
        media_bias: Arc<MediaBiasRegistry>,
        llm: Arc<LlmClient>,
        prompts: Arc<PromptRegistry>,
    ) -> Self {
        AutoIngestService {
            store,
            vector_store,
            scraper,
            analyzer,
            relevance,
            media_bias,
            llm,
            prompts,
            running: AtomicBool::new(false),
        }
    }

    pub async fn run(&self, analysis_cfg: &AnalysisConfig) -> AppResult<IngestRunResult> {
        let settings = self.store.get_settings().await?;
        if !settings.auto_ingest_enabled {
            return Ok(IngestRunResult { no_op: true, ..Default::default() });
        }

        if self.running.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            return Ok(IngestRunResult { no_op: true, ..Default::default() });
        }

        let result = self.run_inner(&settings, analysis_cfg).await;
        self.running.store(false, Ordering::SeqCst);
        result
    }

    async fn run_inner(&self, settings: &crate::models::KeywordMonitorSettings, analysis_cfg: &AnalysisConfig) -> AppResult<IngestRunResult> {
        let pending = self.store.list_pending_alerts(usize::MAX).await?;

        let mut result = IngestRunResult::default();

        let batches: Vec<Vec<_>> = pending.chunks(settings.batch_size.max(1)).map(|c| c.to_vec()).collect();

        let batch_results: Vec<Vec<IngestResultDetail>> = stream::iter(batches.into_iter().map(|batch| {
            let this = self;
            let settings = settings.clone();
            let analysis_cfg = analysis_cfg.clone();
            async move { this.run_batch(batch, &settings, &analysis_cfg).await }
        }))
        .buffer_unordered(settings.max_concurrent_batches.max(1))
        .collect()
        .await;

        for details in batch_results {
            for detail in details {
                result.processed += 1;
                match &detail.status {
                    Some(IngestStatus::Approved) => result.ingested += 1,
                    Some(IngestStatus::Failed) => {
                        if detail.error.is_some() {
                            result.errors += 1;
                        } else {
                            match detail.rejection_reason {
                                Some(RejectionReason::Quality) => result.rejected_quality += 1,
                                _ => result.rejected_relevance += 1,
                            }
                        }
                    }
                    _ => {}
                }
                result.details.push(detail);
            }
        }

        Ok(result)
    }

    /// Runs articles sequentially within a batch; batches themselves may run
    /// concurrently up to `max_concurrent_batches` (§4.8 step 3).
    async fn run_batch(&self, batch: Vec<crate::models::Alert>, settings: &crate::models::KeywordMonitorSettings, analysis_cfg: &AnalysisConfig) -> Vec<IngestResultDetail> {
        let mut details = Vec::with_capacity(batch.len());
        for alert in batch {
            let detail = self.process_one(&alert.article_uri, settings, analysis_cfg).await;
            details.push(detail);
        }
        details
    }

    async fn process_one(&self, uri: &str, settings: &crate::models::KeywordMonitorSettings, analysis_cfg: &AnalysisConfig) -> IngestResultDetail {
        match self.process_one_inner(uri, settings, analysis_cfg).await {
            Ok((status, rejection_reason)) => IngestResultDetail { uri: uri.to_string(), status: Some(status), rejection_reason, error: None },
            Err(e) => {
                warn!(uri, error = %e, "auto-ingest article failed");
                IngestResultDetail { uri: uri.to_string(), status: Some(IngestStatus::Failed), rejection_reason: None, error: Some(e.to_string()) }
            }
        }
    }

    /// Collects the keywords belonging to every group scheduled against
    /// `topic` — the keyword list C7 scores relevance against (§4.5/§4.8).
    async fn topic_keywords(&self, topic: &str) -> Vec<String> {
        let groups = match self.store.list_keyword_groups().await {
            Ok(groups) => groups,
            Err(e) => {
                warn!(topic, error = %e, "could not load keyword groups for relevance scoring");
                return Vec::new();
            }
        };

        let mut keywords = Vec::new();
        for group in groups.iter().filter(|g| g.topic == topic) {
            match self.store.list_keywords(Some(&group.id)).await {
                Ok(ks) => keywords.extend(ks.into_iter().map(|k| k.keyword)),
                Err(e) => warn!(topic, group_id = %group.id, error = %e, "could not load keywords for group"),
            }
        }
        keywords
    }

    async fn process_one_inner(&self, uri: &str, settings: &crate::models::KeywordMonitorSettings, analysis_cfg: &AnalysisConfig) -> AppResult<(IngestStatus, Option<RejectionReason>)> {
        let Some(mut article) = self.store.get_article(uri).await? else {
            return Err(crate::error::AppError::NotFound(format!("article '{uri}'")));
        };

        // a. enrich with bias — failure does not abort the pipeline.
        if let Ok(Some(bias)) = self.media_bias.lookup(&article.news_source, uri).await {
            article.bias = bias.bias;
            article.factual_reporting = bias.factual_reporting;
            article.mbfc_credibility_rating = bias.mbfc_credibility_rating;
            article.bias_source = Some(bias.source);
            article.bias_country = bias.country;
            article.press_freedom = bias.press_freedom;
            article.media_type = bias.media_type;
            article.popularity = bias.popularity;
        }

        // b. scrape raw content — failure is tolerated, analysis proceeds on summary.
        let raw_text = match self.scraper.fetch(uri).await {
            Ok(doc) => {
                let truncated = crate::models::truncate(&doc.content, crate::models::MAX_RAW_TEXT_CHARS);
                let _ = self
                    .store
                    .upsert_raw_article(RawArticle { uri: uri.to_string(), raw_markdown: truncated.clone(), topic: article.topic.clone() })
                    .await;
                Some(truncated)
            }
            Err(e) => {
                warn!(uri, error = %e, "scrape failed; analysis proceeds on summary only");
                None
            }
        };

        // c. analyze
        let text_for_analysis = raw_text.clone().or_else(|| article.summary.clone()).unwrap_or_default();
        let analysis = self
            .analyzer
            .analyze(&text_for_analysis, &article.title, &article.news_source, uri, analysis_cfg, &settings.default_llm_model)
            .await?;

        article.summary = Some(analysis.summary);
        article.category = Some(analysis.category);
        article.sentiment = Some(analysis.sentiment);
        article.sentiment_explanation = Some(analysis.sentiment_explanation);
        article.future_signal = Some(analysis.future_signal);
        article.future_signal_explanation = Some(analysis.future_signal_explanation);
        article.time_to_impact = Some(analysis.time_to_impact);
        article.time_to_impact_explanation = Some(analysis.time_to_impact_explanation);
        article.driver_type = Some(analysis.driver_type);
        article.driver_type_explanation = Some(analysis.driver_type_explanation);
        article.tags = analysis.tags;
        article.analyzed = true;
        if article.publication_date.is_none() {
            article.publication_date = analysis.publication_date;
        }

        // d. score relevance against the topic's monitored keywords, not the
        // (still-empty, only populated below) extracted-keywords field.
        let keywords = self.topic_keywords(&article.topic).await;
        let relevance = self
            .relevance
            .analyze(&article.title, &article.news_source, &text_for_analysis, &article.topic, &keywords)
            .await;

        article.topic_alignment_score = Some(relevance.topic_alignment_score);
        article.keyword_relevance_score = Some(relevance.keyword_relevance_score);
        article.confidence_score = Some(relevance.confidence_score);
        article.overall_match_explanation = Some(relevance.overall_match_explanation);
        article.extracted_article_topics = relevance.extracted_article_topics;
        article.extracted_article_keywords = relevance.extracted_article_keywords;

        // e. decision — relevance filtering strictly before quality review (§5).
        let overall_relevance = (relevance.topic_alignment_score + relevance.keyword_relevance_score + relevance.confidence_score) / 3.0;
        let (status, rejection_reason) = if overall_relevance < settings.min_relevance_threshold {
            (IngestStatus::Failed, Some(RejectionReason::Relevance))
        } else if settings.quality_control_enabled {
            let review = self.review_quality(&text_for_analysis, &settings.default_llm_model).await;
            article.quality_score = Some(review.quality_score);
            article.quality_issues = review.issues_detected;
            match review.recommendation {
                QualityRecommendation::Reject => (IngestStatus::Failed, Some(RejectionReason::Quality)),
                // "review" has no terminal status of its own (§8 invariant: ingest_status
                // is approved|failed). auto_save_approved_only restricts saves to strictly
                // approved recommendations; "review" only clears the bar when the operator
                // has relaxed that restriction (§9).
                QualityRecommendation::Review if settings.auto_save_approved_only => (IngestStatus::Failed, Some(RejectionReason::Quality)),
                QualityRecommendation::Review => (IngestStatus::Approved, None),
                QualityRecommendation::Approve => (IngestStatus::Approved, None),
            }
        } else {
            (IngestStatus::Approved, None)
        };

        article.auto_ingested = true;
        article.ingest_status = status;

        // f. persist strictly before vector indexing (§5).
        self.store.upsert_article(article.clone()).await?;

        // g. index — vector failure is logged, not fatal (§4.1/§4.8).
        if let Err(e) = self.vector_store.upsert(&article, raw_text.as_deref()).await {
            warn!(uri, error = %e, "vector indexing failed; article write stands");
        }

        Ok((status, rejection_reason))
    }

    async fn review_quality(&self, content: &str, model_name: &str) -> QualityReview {
        let messages = vec![
            crate::prompts::ChatMessage {
                role: "system",
                content: "Assess content quality and respond with a single strict JSON object: {\"quality_score\": 0-1, \"issues_detected\": [], \"recommendation\": \"approve|review|reject\", \"explanation\": \"\", \"content_type\": \"article|cookie_notice|paywall|error_page|navigation|other\"}.".to_string(),
            },
            crate::prompts::ChatMessage { role: "user", content: content.to_string() },
        ];
        let mut cfg = LlmRequestConfig::default();
        cfg.model = model_name.to_string();

        let response = match self.llm.complete(&messages, &cfg).await {
            Ok(r) => r,
            Err(_) => return QualityReview::conservative_default(),
        };

        parse_quality_review(&response).unwrap_or_else(|_| QualityReview::conservative_default())
    }
}

fn parse_quality_review(response: &str) -> AppResult<QualityReview> {
    let start = response.find('{').ok_or_else(|| crate::error::AppError::ParseError("no JSON object in quality review".to_string()))?;
    let end = response.rfind('}').ok_or_else(|| crate::error::AppError::ParseError("unterminated JSON object in quality review".to_string()))?;
    let value: serde_json::Value = serde_json::from_str(&response[start..=end])?;

    let quality_score = value.get("quality_score").and_then(|v| v.as_f64()).unwrap_or(0.3).clamp(0.0, 1.0);
    let issues_detected = value
        .get("issues_detected")
        .and_then(|v| v.as_array())
        .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();
    let recommendation = match value.get("recommendation").and_then(|v| v.as_str()).unwrap_or("review") {
        "approve" => QualityRecommendation::Approve,
        "reject" => QualityRecommendation::Reject,
        _ => QualityRecommendation::Review,
    };
    let explanation = value.get("explanation").and_then(|v| v.as_str()).unwrap_or_default().to_string();
    let content_type = value.get("content_type").and_then(|v| v.as_str()).unwrap_or("other").to_string();

    Ok(QualityReview { quality_score, issues_detected, recommendation, explanation, content_type })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_review_parse_failure_yields_conservative_default() {
        let err = parse_quality_review("not json");
        assert!(err.is_err());
        let fallback = QualityReview::conservative_default();
        assert_eq!(fallback.quality_score, 0.3);
        assert_eq!(fallback.recommendation, QualityRecommendation::Review);
    }

    #[test]
    fn quality_review_parses_well_formed_json() {
        let response = r#"{"quality_score": 0.9, "issues_detected": [], "recommendation": "approve", "explanation": "fine", "content_type": "article"}"#;
        let review = parse_quality_review(response).unwrap();
        assert_eq!(review.recommendation, QualityRecommendation::Approve);
        assert_eq!(review.quality_score, 0.9);
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cache::{AnalysisCache, CacheKey};
use crate::error::{AppError, AppResult};
use crate::llm::{LlmClient, LlmRequestConfig};
use crate::models::truncate;
use crate::prompts::PromptRegistry;

const TITLE_EXTRACT_CHARS: usize = 2_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisConfig {
    pub summary_length: usize,
    pub summary_voice: String,
    pub summary_type: String,
    pub categories: Vec<String>,
    pub future_signals: Vec<String>,
    pub sentiment_options: Vec<String>,
    pub time_to_impact_options: Vec<String>,
    pub driver_types: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Analysis {
    pub title: String,
    pub summary: String,
    pub category: String,
    pub future_signal: String,
    pub future_signal_explanation: String,
    pub sentiment: String,
    pub sentiment_explanation: String,
    pub time_to_impact: String,
    pub time_to_impact_explanation: String,
    pub driver_type: String,
    pub driver_type_explanation: String,
    pub tags: Vec<String>,
    pub publication_date: Option<String>,
    pub uri: String,
    pub model_name: String,
}

const REQUIRED_KEYS: &[&str] = &[
    "title", "summary", "category", "future_signal", "future_signal_explanation",
    "sentiment", "time_to_impact", "driver_type", "tags",
];

/// Given raw article text, produces a structured analysis via the LLM,
/// backed by the analysis cache for idempotent, deterministic re-runs
/// (C6, §4.4).
pub struct ArticleAnalyzer {
    llm: Arc<LlmClient>,
    prompts: Arc<PromptRegistry>,
    cache: Arc<AnalysisCache<Analysis>>,
}

impl ArticleAnalyzer {
    pub fn new(llm: Arc<LlmClient>, prompts: Arc<PromptRegistry>, cache: Arc<AnalysisCache<Analysis>>) -> Self {
        ArticleAnalyzer { llm, prompts, cache }
    }

    pub async fn extract_title(&self, text: &str) -> AppResult<String> {
        let clipped = truncate(text, TITLE_EXTRACT_CHARS);
        let messages = self.prompts.format_title_extraction(&clipped).await?;
        let response = self.llm.complete(&messages, &LlmRequestConfig::default()).await?;
        Ok(response.trim().trim_matches('"').to_string())
    }

    pub async fn extract_publication_date(&self, text: &str) -> AppResult<String> {
        let messages = self.prompts.format_date_extraction(text).await?;
        let response = self.llm.complete(&messages, &LlmRequestConfig::default()).await?;
        let candidate = response.trim();
        match NaiveDate::parse_from_str(candidate, "%Y-%m-%d") {
            Ok(d) => Ok(d.format("%Y-%m-%d").to_string()),
            Err(_) => {
                warn!(raw_response = candidate, "publication date did not parse as YYYY-MM-DD; falling back to today");
                Ok(chrono::Utc::now().format("%Y-%m-%d").to_string())
            }
        }
    }

    pub async fn analyze(
        &self,
        text: &str,
        title: &str,
        source: &str,
        uri: &str,
        cfg: &AnalysisConfig,
        model_name: &str,
    ) -> AppResult<Analysis> {
        if text.trim().is_empty() {
            return Err(AppError::Validation("empty article text".to_string()));
        }

        let truncated = truncate(text, crate::models::MAX_RAW_TEXT_CHARS);
        let content_hash = AnalysisCache::<Analysis>::content_hash(&truncated);
        let template_hash = self.prompts.bundle_hash().await;
        let key = CacheKey { uri: uri.to_string(), model_name: model_name.to_string() };

        if let Some(mut cached) = self.cache.get(&key, &content_hash, &template_hash) {
            cached.uri = uri.to_string();
            return Ok(cached);
        }

        let messages = self.prompts.format_content_analysis(&truncated, title, source).await?;
        let mut llm_cfg = LlmRequestConfig::default();
        llm_cfg.model = model_name.to_string();
        let response = self.llm.complete(&messages, &llm_cfg).await?;

        let fallback_title = if title.is_empty() { self.extract_title(&truncated).await.ok() } else { None };
        let mut analysis = parse_analysis_response(&response, uri, model_name, fallback_title.as_deref())?;
        apply_config_defaults(&mut analysis, cfg);

        self.cache.set(key, content_hash, analysis.clone(), template_hash);
        Ok(analysis)
    }
}

fn apply_config_defaults(analysis: &mut Analysis, cfg: &AnalysisConfig) {
    if !cfg.categories.is_empty() && !cfg.categories.iter().any(|c| c == &analysis.category) {
        // Model drifted outside the configured ontology; keep its answer but
        // note it rather than silently coercing, matching the parser's
        // generally-tolerant posture.
        analysis.tags.push(format!("uncategorized:{}", analysis.category));
    }
}

/// Tolerant line-oriented `Key: value` parser (§4.4). Keys may have
/// surrounding asterisks, values may span continuation lines, and `tags`
/// may be a JSON-bracketed list or a comma-separated string.
fn parse_analysis_response(response: &str, uri: &str, model_name: &str, fallback_title: Option<&str>) -> AppResult<Analysis> {
    let fields = parse_key_value_block(response);

    let get = |key: &str| fields.get(key).cloned().unwrap_or_default();
    let title = fields.get("title").cloned().or_else(|| fallback_title.map(|s| s.to_string()));

    let missing: Vec<&str> = REQUIRED_KEYS
        .iter()
        .filter(|k| **k != "title" && !fields.contains_key(**k))
        .copied()
        .collect();

    if title.is_none() || !missing.is_empty() {
        let mut missing_all = missing;
        if title.is_none() {
            missing_all.push("title");
        }
        return Err(AppError::ParseError(format!("missing required analysis keys: {}", missing_all.join(", "))));
    }

    Ok(Analysis {
        title: title.unwrap(),
        summary: get("summary"),
        category: get("category"),
        future_signal: get("future_signal"),
        future_signal_explanation: get("future_signal_explanation"),
        sentiment: get("sentiment"),
        sentiment_explanation: get("sentiment_explanation"),
        time_to_impact: get("time_to_impact"),
        time_to_impact_explanation: get("time_to_impact_explanation"),
        driver_type: get("driver_type"),
        driver_type_explanation: get("driver_type_explanation"),
        tags: parse_tags(&get("tags")),
        publication_date: fields.get("publication_date").cloned(),
        uri: uri.to_string(),
        model_name: model_name.to_string(),
    })
}

fn parse_key_value_block(response: &str) -> HashMap<String, String> {
    let key_line = Regex::new(r"^\*{0,2}([A-Za-z_ ]+)\*{0,2}\s*:\s*(.*)$").unwrap();
    let mut fields: HashMap<String, String> = HashMap::new();
    let mut current_key: Option<String> = None;

    for line in response.lines() {
        if let Some(caps) = key_line.captures(line) {
            let key = normalize_key(&caps[1]);
            let value = caps[2].trim().to_string();
            fields.insert(key.clone(), value);
            current_key = Some(key);
        } else if let Some(key) = &current_key {
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                fields.entry(key.clone()).and_modify(|v| {
                    v.push(' ');
                    v.push_str(trimmed);
                });
            }
        }
    }
    fields
}

fn normalize_key(raw: &str) -> String {
    raw.trim().to_lowercase().replace(' ', "_")
}

fn parse_tags(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if let Ok(list) = serde_json::from_str::<Vec<String>>(trimmed) {
        return list;
    }
    let stripped = trimmed.trim_start_matches('[').trim_end_matches(']');
    stripped
        .split(',')
        .map(|s| s.trim().trim_matches('"').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_key_value_block() {
        let response = "Title: AGI soon\nSummary: Something happened\nCategory: AI\nFuture_Signal: positive\nFuture_Signal_Explanation: because reasons\nSentiment: neutral\nTime_To_Impact: short\nDriver_Type: technology\nTags: [\"ai\", \"agi\"]\n";
        let analysis = parse_analysis_response(response, "u1", "m1", None).unwrap();
        assert_eq!(analysis.title, "AGI soon");
        assert_eq!(analysis.tags, vec!["ai".to_string(), "agi".to_string()]);
    }

    #[test]
    fn tolerates_asterisks_and_comma_separated_tags() {
        let response = "**Title**: A title\nSummary: sum\nCategory: cat\nFuture_Signal: pos\nFuture_Signal_Explanation: exp\nSentiment: neutral\nTime_To_Impact: short\nDriver_Type: tech\nTags: ai, policy\n";
        let analysis = parse_analysis_response(response, "u1", "m1", None).unwrap();
        assert_eq!(analysis.tags, vec!["ai".to_string(), "policy".to_string()]);
    }

    #[test]
    fn missing_title_falls_back_to_extracted_title() {
        let response = "Summary: sum\nCategory: cat\nFuture_Signal: pos\nFuture_Signal_Explanation: exp\nSentiment: neutral\nTime_To_Impact: short\nDriver_Type: tech\nTags: ai\n";
        let analysis = parse_analysis_response(response, "u1", "m1", Some("fallback title")).unwrap();
        assert_eq!(analysis.title, "fallback title");
    }

    #[test]
    fn missing_required_key_without_title_fallback_errors() {
        let response = "Title: t\nSummary: s\n";
        let err = parse_analysis_response(response, "u1", "m1", None).unwrap_err();
        assert!(matches!(err, AppError::ParseError(_)));
    }

    #[test]
    fn continuation_lines_are_appended_to_current_key() {
        let response = "Title: t\nSummary: first line\nsecond line\nCategory: cat\nFuture_Signal: pos\nFuture_Signal_Explanation: exp\nSentiment: neutral\nTime_To_Impact: short\nDriver_Type: tech\nTags: ai\n";
        let analysis = parse_analysis_response(response, "u1", "m1", None).unwrap();
        assert_eq!(analysis.summary, "first line second line");
    }
}

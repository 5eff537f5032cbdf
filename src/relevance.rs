use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::llm::{LlmClient, LlmRequestConfig};
use crate::prompts::PromptRegistry;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelevanceResult {
    pub topic_alignment_score: f64,
    pub keyword_relevance_score: f64,
    pub confidence_score: f64,
    pub overall_match_explanation: String,
    pub extracted_article_topics: Vec<String>,
    pub extracted_article_keywords: Vec<String>,
}

impl RelevanceResult {
    fn zero(explanation: impl Into<String>) -> Self {
        RelevanceResult {
            topic_alignment_score: 0.0,
            keyword_relevance_score: 0.0,
            confidence_score: 0.0,
            overall_match_explanation: explanation.into(),
            extracted_article_topics: Vec::new(),
            extracted_article_keywords: Vec::new(),
        }
    }
}

/// Scores each article against the topic + keyword list driving the alert
/// (C7, §4.5). Parsing failures never throw to callers — they yield an
/// all-zero record with an explanation.
pub struct RelevanceCalculator {
    llm: Arc<LlmClient>,
    prompts: Arc<PromptRegistry>,
}

impl RelevanceCalculator {
    pub fn new(llm: Arc<LlmClient>, prompts: Arc<PromptRegistry>) -> Self {
        RelevanceCalculator { llm, prompts }
    }

    pub async fn analyze(&self, title: &str, source: &str, content: &str, topic: &str, keywords: &[String]) -> RelevanceResult {
        let keyword_list = keywords.join(", ");
        let messages = match self.prompts.format_relevance_analysis(title, source, content, topic, &keyword_list).await {
            Ok(m) => m,
            Err(e) => return RelevanceResult::zero(format!("prompt formatting failed: {e}")),
        };

        let response = match self.llm.complete(&messages, &LlmRequestConfig::default()).await {
            Ok(r) => r,
            Err(e) => return RelevanceResult::zero(format!("LLM call failed: {e}")),
        };

        match parse_relevance_response(&response) {
            Ok(result) => result,
            Err(e) => RelevanceResult::zero(format!("parse error: {e}")),
        }
    }

    /// Per-article errors become all-zero records; the batch call never
    /// fails as a whole (§4.5).
    pub async fn analyze_batch(&self, articles: &[(String, String, String)], topic: &str, keywords: &[String]) -> Vec<RelevanceResult> {
        let mut results = Vec::with_capacity(articles.len());
        for (title, source, content) in articles {
            results.push(self.analyze(title, source, content, topic, keywords).await);
        }
        results
    }
}

fn clamp01(v: f64) -> f64 {
    v.clamp(0.0, 1.0)
}

/// Locates the first `{...}` JSON object in the response, stripping fenced
/// code blocks and surrounding prose first (§4.5/§7).
fn extract_json_object(response: &str) -> AppResult<String> {
    let fence = Regex::new(r"```(?:json)?\s*([\s\S]*?)```").unwrap();
    let candidate = if let Some(caps) = fence.captures(response) {
        caps[1].to_string()
    } else {
        response.to_string()
    };

    let start = candidate.find('{').ok_or_else(|| crate::error::AppError::ParseError("no JSON object found".to_string()))?;
    let mut depth = 0i32;
    for (i, c) in candidate[start..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(candidate[start..start + i + 1].to_string());
                }
            }
            _ => {}
        }
    }
    Err(crate::error::AppError::ParseError("unterminated JSON object".to_string()))
}

fn coerce_list(value: &serde_json::Value) -> Vec<String> {
    match value {
        serde_json::Value::Array(items) => items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect(),
        serde_json::Value::String(s) if !s.is_empty() => s.split(',').map(|p| p.trim().to_string()).collect(),
        _ => Vec::new(),
    }
}

fn parse_relevance_response(response: &str) -> AppResult<RelevanceResult> {
    let json_str = extract_json_object(response)?;
    let value: serde_json::Value = serde_json::from_str(&json_str)?;

    let topic_alignment_score = clamp01(value.get("topic_alignment_score").and_then(|v| v.as_f64()).unwrap_or(0.0));
    let keyword_relevance_score = clamp01(value.get("keyword_relevance_score").and_then(|v| v.as_f64()).unwrap_or(0.0));
    let confidence_score = clamp01(value.get("confidence_score").and_then(|v| v.as_f64()).unwrap_or(0.0));
    let overall_match_explanation = value
        .get("overall_match_explanation")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let extracted_article_topics = value.get("extracted_article_topics").map(coerce_list).unwrap_or_default();
    let extracted_article_keywords = value.get("extracted_article_keywords").map(coerce_list).unwrap_or_default();

    Ok(RelevanceResult {
        topic_alignment_score,
        keyword_relevance_score,
        confidence_score,
        overall_match_explanation,
        extracted_article_topics,
        extracted_article_keywords,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_clean_json() {
        let response = r#"{"topic_alignment_score": 0.9, "keyword_relevance_score": 0.8, "confidence_score": 0.7, "overall_match_explanation": "good fit", "extracted_article_topics": ["ai"], "extracted_article_keywords": ["agi"]}"#;
        let result = parse_relevance_response(response).unwrap();
        assert_eq!(result.topic_alignment_score, 0.9);
        assert_eq!(result.extracted_article_topics, vec!["ai".to_string()]);
    }

    #[test]
    fn strips_fenced_code_block_and_surrounding_prose() {
        let response = "Here is the analysis:\n```json\n{\"topic_alignment_score\": 1.5, \"keyword_relevance_score\": -0.2, \"confidence_score\": 0.5, \"overall_match_explanation\": \"x\", \"extracted_article_topics\": \"ai, ml\", \"extracted_article_keywords\": []}\n```\nThanks!";
        let result = parse_relevance_response(response).unwrap();
        assert_eq!(result.topic_alignment_score, 1.0);
        assert_eq!(result.keyword_relevance_score, 0.0);
        assert_eq!(result.extracted_article_topics, vec!["ai".to_string(), "ml".to_string()]);
    }

    #[test]
    fn garbage_response_never_panics_and_errors() {
        assert!(parse_relevance_response("not json at all").is_err());
    }

    #[test]
    fn scores_clamp_to_unit_interval() {
        let response = r#"{"topic_alignment_score": 5.0, "keyword_relevance_score": -3.0, "confidence_score": 0.5, "overall_match_explanation": "", "extracted_article_topics": [], "extracted_article_keywords": []}"#;
        let result = parse_relevance_response(response).unwrap();
        assert_eq!(result.topic_alignment_score, 1.0);
        assert_eq!(result.keyword_relevance_score, 0.0);
    }
}

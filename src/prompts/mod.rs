use std::collections::HashMap;
use std::path::Path;

use semver::Version;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::warn;

use crate::error::{AppError, AppResult};

pub const TITLE_EXTRACTION: &str = "title_extraction";
pub const CONTENT_ANALYSIS: &str = "content_analysis";
pub const RELEVANCE_ANALYSIS: &str = "relevance_analysis";
pub const DATE_EXTRACTION: &str = "date_extraction";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub name: String,
    pub version: Version,
    pub system_prompt: String,
    pub user_prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

/// Named, versioned prompt templates with a content-hash fingerprint (C3,
/// §4.2). Grounded on the `PromptRegistry`/`Prompt` shape from the pack's
/// prompt-management crate: `RwLock`-guarded store, `semver::Version`
/// per template, JSON-loadable custom templates.
pub struct PromptRegistry {
    templates: RwLock<HashMap<String, PromptTemplate>>,
}

impl PromptRegistry {
    pub fn with_defaults() -> Self {
        let mut templates = HashMap::new();
        for (name, system, user) in default_templates() {
            templates.insert(
                name.to_string(),
                PromptTemplate {
                    name: name.to_string(),
                    version: Version::new(1, 0, 0),
                    system_prompt: system.to_string(),
                    user_prompt: user.to_string(),
                },
            );
        }
        PromptRegistry { templates: RwLock::new(templates) }
    }

    pub async fn current(&self, name: &str) -> AppResult<PromptTemplate> {
        self.templates
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("prompt template '{name}'")))
    }

    /// Writes a new version; bumps the patch component unless the prior
    /// template for `name` doesn't exist, in which case the version starts
    /// at `1.0.0`.
    pub async fn save(&self, name: &str, system_prompt: String, user_prompt: String) -> AppResult<()> {
        let mut templates = self.templates.write().await;
        let version = match templates.get(name) {
            Some(existing) => {
                let mut v = existing.version.clone();
                v.patch += 1;
                v
            }
            None => Version::new(1, 0, 0),
        };
        templates.insert(
            name.to_string(),
            PromptTemplate { name: name.to_string(), version, system_prompt, user_prompt },
        );
        Ok(())
    }

    /// Loads custom templates from a JSON file; invalid entries are skipped
    /// with a warning rather than aborting the load (§4.2).
    pub async fn load_custom_from_json(&self, path: &Path) -> AppResult<usize> {
        let contents = std::fs::read_to_string(path)?;
        let raw: Vec<serde_json::Value> = serde_json::from_str(&contents)?;
        let mut loaded = 0;
        for entry in raw {
            let name = entry.get("name").and_then(|v| v.as_str());
            let system_prompt = entry.get("system_prompt").and_then(|v| v.as_str());
            let user_prompt = entry.get("user_prompt").and_then(|v| v.as_str());
            match (name, system_prompt, user_prompt) {
                (Some(name), Some(system_prompt), Some(user_prompt)) => {
                    self.save(name, system_prompt.to_string(), user_prompt.to_string()).await?;
                    loaded += 1;
                }
                _ => warn!(?entry, "skipping invalid custom prompt template entry"),
            }
        }
        Ok(loaded)
    }

    /// SHA-256 over the canonical JSON of all current templates, truncated
    /// to 16 hex chars (§3.1); used by C4 to invalidate cache on template
    /// change.
    pub async fn bundle_hash(&self) -> String {
        let templates = self.templates.read().await;
        let mut entries: Vec<&PromptTemplate> = templates.values().collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        let canonical = serde_json::to_string(&entries).unwrap_or_default();
        let digest = Sha256::digest(canonical.as_bytes());
        hex_prefix(&digest, 16)
    }

    fn fill(template: &str, slots: &HashMap<&str, String>) -> AppResult<String> {
        let mut out = template.to_string();
        for (key, value) in slots {
            out = out.replace(&format!("{{{key}}}"), value);
        }
        if out.contains('{') && out.contains('}') {
            if let Some(start) = out.find('{') {
                if let Some(end) = out[start..].find('}') {
                    let missing = &out[start..start + end + 1];
                    return Err(AppError::Validation(format!("missing prompt slot {missing}")));
                }
            }
        }
        Ok(out)
    }

    pub async fn format_title_extraction(&self, text: &str) -> AppResult<Vec<ChatMessage>> {
        let t = self.current(TITLE_EXTRACTION).await?;
        let mut slots = HashMap::new();
        slots.insert("text", text.to_string());
        Ok(vec![
            ChatMessage { role: "system", content: t.system_prompt },
            ChatMessage { role: "user", content: Self::fill(&t.user_prompt, &slots)? },
        ])
    }

    pub async fn format_content_analysis(&self, text: &str, title: &str, source: &str) -> AppResult<Vec<ChatMessage>> {
        let t = self.current(CONTENT_ANALYSIS).await?;
        let mut slots = HashMap::new();
        slots.insert("text", text.to_string());
        slots.insert("title", title.to_string());
        slots.insert("source", source.to_string());
        Ok(vec![
            ChatMessage { role: "system", content: t.system_prompt },
            ChatMessage { role: "user", content: Self::fill(&t.user_prompt, &slots)? },
        ])
    }

    pub async fn format_relevance_analysis(&self, title: &str, source: &str, content: &str, topic: &str, keywords: &str) -> AppResult<Vec<ChatMessage>> {
        let t = self.current(RELEVANCE_ANALYSIS).await?;
        let mut slots = HashMap::new();
        slots.insert("title", title.to_string());
        slots.insert("source", source.to_string());
        slots.insert("content", content.to_string());
        slots.insert("topic", topic.to_string());
        slots.insert("keywords", keywords.to_string());
        Ok(vec![
            ChatMessage { role: "system", content: t.system_prompt },
            ChatMessage { role: "user", content: Self::fill(&t.user_prompt, &slots)? },
        ])
    }

    pub async fn format_date_extraction(&self, text: &str) -> AppResult<Vec<ChatMessage>> {
        let t = self.current(DATE_EXTRACTION).await?;
        let mut slots = HashMap::new();
        slots.insert("text", text.to_string());
        Ok(vec![
            ChatMessage { role: "system", content: t.system_prompt },
            ChatMessage { role: "user", content: Self::fill(&t.user_prompt, &slots)? },
        ])
    }
}

fn hex_prefix(bytes: &[u8], len: usize) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect::<String>().chars().take(len).collect()
}

fn default_templates() -> Vec<(&'static str, &'static str, &'static str)> {
    vec![
        (
            TITLE_EXTRACTION,
            "You extract a concise, accurate headline from article text.",
            "Extract the title from this text:\n\n{text}",
        ),
        (
            CONTENT_ANALYSIS,
            "You are a news analyst. Respond with a line-oriented Key: value block only.",
            "Title: {title}\nSource: {source}\n\nText:\n{text}",
        ),
        (
            RELEVANCE_ANALYSIS,
            "You score article relevance to a topic and keyword set. Respond with a single JSON object only.",
            "Topic: {topic}\nKeywords: {keywords}\nTitle: {title}\nSource: {source}\n\nContent:\n{content}",
        ),
        (
            DATE_EXTRACTION,
            "You extract the publication date of an article as YYYY-MM-DD.",
            "Text:\n{text}",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bundle_hash_is_stable_without_changes() {
        let registry = PromptRegistry::with_defaults();
        let h1 = registry.bundle_hash().await;
        let h2 = registry.bundle_hash().await;
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 16);
    }

    #[tokio::test]
    async fn bundle_hash_changes_after_save() {
        let registry = PromptRegistry::with_defaults();
        let before = registry.bundle_hash().await;
        registry.save(TITLE_EXTRACTION, "new system".into(), "new user {text}".into()).await.unwrap();
        let after = registry.bundle_hash().await;
        assert_ne!(before, after);
    }

    #[tokio::test]
    async fn format_title_extraction_fills_slot() {
        let registry = PromptRegistry::with_defaults();
        let messages = registry.format_title_extraction("hello world").await.unwrap();
        assert_eq!(messages.len(), 2);
        assert!(messages[1].content.contains("hello world"));
    }

    #[tokio::test]
    async fn save_bumps_patch_version() {
        let registry = PromptRegistry::with_defaults();
        registry.save(TITLE_EXTRACTION, "s".into(), "u".into()).await.unwrap();
        let t = registry.current(TITLE_EXTRACTION).await.unwrap();
        assert_eq!(t.version, Version::new(1, 0, 1));
    }
}

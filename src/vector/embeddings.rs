use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::warn;

use crate::error::AppResult;

pub const DEFAULT_DIMENSION: usize = 1536;
/// Rough word-based proxy for the embedding model's token budget; a
/// token-accurate path is preferred when available (§4.1) but this crate's
/// embedding provider is swapped out behind `EmbeddingProvider`, so a
/// word-boundary truncation is the portable default.
const MAX_EMBEDDING_WORDS: usize = 6_000;

#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>>;
    fn dimension(&self) -> usize;
}

/// Real embeddings via an OpenAI-compatible HTTP endpoint.
pub struct OpenAiEmbeddingProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dimension: usize,
}

impl OpenAiEmbeddingProvider {
    pub fn new(client: reqwest::Client, api_key: String) -> Self {
        OpenAiEmbeddingProvider {
            client,
            api_key,
            model: "text-embedding-3-small".to_string(),
            dimension: DEFAULT_DIMENSION,
        }
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        let text = truncate_to_word_budget(text, MAX_EMBEDDING_WORDS);

        #[derive(serde::Serialize)]
        struct Req<'a> {
            input: &'a str,
            model: &'a str,
        }
        #[derive(serde::Deserialize)]
        struct Resp {
            data: Vec<EmbeddingData>,
        }
        #[derive(serde::Deserialize)]
        struct EmbeddingData {
            embedding: Vec<f32>,
        }

        let resp: Resp = self
            .client
            .post("https://api.openai.com/v1/embeddings")
            .bearer_auth(&self.api_key)
            .json(&Req { input: &text, model: &self.model })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        resp.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| crate::error::AppError::ProviderError("empty embedding response".into()))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Deterministic random fallback used when no embedding provider is
/// configured (§4.1, §6.4): dev-only behavior, always logs a warning.
pub struct RandomEmbeddingProvider {
    dimension: usize,
}

impl RandomEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        RandomEmbeddingProvider { dimension }
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for RandomEmbeddingProvider {
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        warn!("no embedding provider configured; falling back to deterministic random vector");
        // Seed off the text so the same input is stable across calls in tests,
        // while still being an obvious placeholder rather than a real embedding.
        let seed = deterministic_seed(text);
        let mut rng = StdRng::seed_from_u64(seed);
        Ok((0..self.dimension).map(|_| rng.gen_range(-1.0f32..1.0f32)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

fn deterministic_seed(text: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}

fn truncate_to_word_budget(text: &str, max_words: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max_words {
        text.to_string()
    } else {
        words[..max_words].join(" ")
    }
}

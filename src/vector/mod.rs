pub mod embeddings;
mod memory;

pub use embeddings::{EmbeddingProvider, OpenAiEmbeddingProvider, RandomEmbeddingProvider, DEFAULT_DIMENSION};
pub use memory::MemoryVectorStore;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

use crate::error::AppResult;
use crate::models::Article;

/// Scalar metadata projected from an `Article`, plus the derived
/// `publication_date_ts` field (§4.1/§6.3). Non-scalar/null fields are
/// dropped; tag lists are flattened to a comma-separated string before
/// reaching this map.
pub type Metadata = HashMap<String, Value>;

/// A filter over metadata fields. MUST NOT be emitted to the backend as an
/// empty map when absent — call sites pass `None` instead (§4.1/§6.3).
pub type MetadataFilter = HashMap<String, Value>;

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub metadata: Metadata,
}

#[derive(Debug, Clone)]
pub struct ClusterProjection {
    pub points: Vec<(f32, f32)>,
    pub centroids: Vec<Vec<f32>>,
    pub cluster_sizes: Vec<usize>,
}

/// Embedding, upsert, cosine k-NN and metadata-filtered retrieval over
/// article text (C2, §4.1).
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Embeds the best-available text (raw > summary > title) and writes
    /// `(id=uri, embedding, metadata)`. Fails with `NoContent`-shaped
    /// `AppError::Validation` if none of the three are present.
    async fn upsert(&self, article: &Article, raw_text: Option<&str>) -> AppResult<()>;

    /// Cosine search by free-text query; empty collection returns `[]`.
    /// `filter` of `None` MUST NOT become an empty-map filter downstream.
    async fn search(&self, query: &str, top_k: usize, filter: Option<&MetadataFilter>) -> AppResult<Vec<SearchHit>>;

    /// Nearest neighbors of an already-indexed document, excluding the seed
    /// itself. A missing seed returns `[]` rather than erroring.
    async fn similar(&self, uri: &str, top_k: usize) -> AppResult<Vec<SearchHit>>;

    async fn get_by_metadata(&self, filter: &MetadataFilter, limit: Option<usize>) -> AppResult<Vec<(String, Metadata)>>;

    /// Mini-batch k-means with k=3 over the supplied vectors (§4.1), used by
    /// visualisation collaborators outside this crate's scope.
    fn project(&self, vectors: &[Vec<f32>]) -> ClusterProjection;

    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Dot-product-over-norm-product cosine similarity, with zero-norm guards,
/// grounded directly on the teacher's `lance_data_store_simple::cosine_similarity`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Flattens an `Article`'s scalar fields (plus `publication_date_ts`) into
/// vector-store metadata, per §4.1/§6.3.
pub fn article_metadata(article: &Article) -> Metadata {
    let mut meta = Metadata::new();
    meta.insert("uri".into(), Value::String(article.uri.clone()));
    meta.insert("title".into(), Value::String(article.title.clone()));
    meta.insert("news_source".into(), Value::String(article.news_source.clone()));
    meta.insert("topic".into(), Value::String(article.topic.clone()));
    if let Some(d) = &article.publication_date {
        meta.insert("publication_date".into(), Value::String(d.clone()));
    }
    meta.insert("publication_date_ts".into(), Value::Number(publication_date_ts(article.publication_date.as_deref()).into()));
    if !article.tags.is_empty() {
        meta.insert("tags".into(), Value::String(article.tags.join(",")));
    }
    if let Some(c) = &article.category {
        meta.insert("category".into(), Value::String(c.clone()));
    }
    if let Some(s) = article.topic_alignment_score {
        if let Some(n) = serde_json::Number::from_f64(s) {
            meta.insert("topic_alignment_score".into(), Value::Number(n));
        }
    }
    meta.insert("auto_ingested".into(), Value::Bool(article.auto_ingested));
    meta
}

/// Parses `publication_date` into epoch seconds (UTC); unknown/absent
/// formats fall back to "now" and MUST be logged by the caller (§4.1).
pub fn publication_date_ts(publication_date: Option<&str>) -> i64 {
    publication_date
        .and_then(|d| {
            chrono::NaiveDate::parse_from_str(d, "%Y-%m-%d")
                .ok()
                .map(|nd| nd.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp())
                .or_else(|| {
                    chrono::DateTime::parse_from_rfc3339(d)
                        .ok()
                        .map(|dt| dt.timestamp())
                })
        })
        .unwrap_or_else(|| {
            tracing::warn!(publication_date = ?publication_date, "unparseable publication_date, falling back to now");
            chrono::Utc::now().timestamp()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_similarity_identical_vectors_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn publication_date_ts_falls_back_on_garbage() {
        let ts = publication_date_ts(Some("not-a-date"));
        assert!(ts > 0);
    }

    #[test]
    fn publication_date_ts_parses_iso_date() {
        let ts = publication_date_ts(Some("2025-01-01"));
        assert_eq!(ts, 1735689600);
    }
}

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{AppError, AppResult};
use crate::metrics::{OperationType, PerformanceMonitor};
use crate::models::Article;

use super::{article_metadata, cosine_similarity, ClusterProjection, EmbeddingProvider, Metadata, MetadataFilter, SearchHit, VectorStore};

#[derive(Clone)]
struct VectorRecord {
    embedding: Vec<f32>,
    metadata: Metadata,
    document_text: String,
}

/// Thread-safe in-memory vector engine, a direct generalization of the
/// teacher's `lance_data_store_simple::LanceDataStore` "bridge
/// implementation" — an `Arc<Mutex<HashMap<..>>>` standing in for a real ANN
/// backend, with the same hand-rolled cosine-similarity k-NN scan.
pub struct MemoryVectorStore {
    records: Arc<Mutex<HashMap<String, VectorRecord>>>,
    embedder: Arc<dyn EmbeddingProvider>,
    metrics: Arc<PerformanceMonitor>,
}

impl MemoryVectorStore {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, metrics: Arc<PerformanceMonitor>) -> Self {
        MemoryVectorStore {
            records: Arc::new(Mutex::new(HashMap::new())),
            embedder,
            metrics,
        }
    }

    fn matches_filter(metadata: &Metadata, filter: &MetadataFilter) -> bool {
        filter.iter().all(|(k, v)| metadata.get(k) == Some(v))
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn upsert(&self, article: &Article, raw_text: Option<&str>) -> AppResult<()> {
        let timer = self.metrics.start_operation(OperationType::VectorUpsert);

        let text = match article.best_text(raw_text) {
            Some(t) => t.to_string(),
            None => {
                let err = AppError::Validation(format!("no content to embed for {}", article.uri));
                timer.complete_error(err.to_string());
                return Err(err);
            }
        };

        // Transient backend errors during upsert are logged and swallowed —
        // vector indexing must never fail the enclosing article write (§4.1).
        let embedding = match self.embedder.embed(&text).await {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, uri = %article.uri, "embedding failed during upsert; skipping vector index");
                timer.complete_error(e.to_string());
                return Ok(());
            }
        };

        let metadata = article_metadata(article);
        self.records.lock().insert(
            article.uri.clone(),
            VectorRecord { embedding, metadata, document_text: text },
        );
        timer.complete_success();
        Ok(())
    }

    async fn search(&self, query: &str, top_k: usize, filter: Option<&MetadataFilter>) -> AppResult<Vec<SearchHit>> {
        let timer = self.metrics.start_operation(OperationType::VectorSearch);

        if self.records.lock().is_empty() {
            timer.complete_success();
            return Ok(Vec::new());
        }

        let query_embedding = match self.embedder.embed(query).await {
            Ok(e) => e,
            Err(e) => {
                timer.complete_error(e.to_string());
                return Err(e);
            }
        };

        let records = self.records.lock();
        let mut scored: Vec<SearchHit> = records
            .iter()
            .filter(|(_, rec)| filter.map(|f| Self::matches_filter(&rec.metadata, f)).unwrap_or(true))
            .map(|(id, rec)| SearchHit {
                id: id.clone(),
                score: cosine_similarity(&query_embedding, &rec.embedding),
                metadata: rec.metadata.clone(),
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        timer.complete_success();
        Ok(scored)
    }

    async fn similar(&self, uri: &str, top_k: usize) -> AppResult<Vec<SearchHit>> {
        let seed_embedding = {
            let records = self.records.lock();
            match records.get(uri) {
                Some(rec) => rec.embedding.clone(),
                None => return Ok(Vec::new()),
            }
        };

        let records = self.records.lock();
        let mut scored: Vec<SearchHit> = records
            .iter()
            .filter(|(id, _)| id.as_str() != uri)
            .map(|(id, rec)| SearchHit {
                id: id.clone(),
                score: cosine_similarity(&seed_embedding, &rec.embedding),
                metadata: rec.metadata.clone(),
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn get_by_metadata(&self, filter: &MetadataFilter, limit: Option<usize>) -> AppResult<Vec<(String, Metadata)>> {
        let records = self.records.lock();
        let mut out: Vec<(String, Metadata)> = records
            .iter()
            .filter(|(_, rec)| Self::matches_filter(&rec.metadata, filter))
            .map(|(id, rec)| (id.clone(), rec.metadata.clone()))
            .collect();
        if let Some(limit) = limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    fn project(&self, vectors: &[Vec<f32>]) -> ClusterProjection {
        mini_batch_kmeans(vectors, 3)
    }

    fn len(&self) -> usize {
        self.records.lock().len()
    }
}

/// Minimal mini-batch k-means (§4.1): deterministic seeding from the first
/// `k` vectors, a handful of Lloyd-step iterations. Visualisation
/// collaborators only need stable centroids/cluster sizes and 2-D
/// coordinates from the first two dims of each point.
fn mini_batch_kmeans(vectors: &[Vec<f32>], k: usize) -> ClusterProjection {
    if vectors.is_empty() {
        return ClusterProjection { points: Vec::new(), centroids: Vec::new(), cluster_sizes: Vec::new() };
    }
    let k = k.min(vectors.len());
    let dim = vectors[0].len();
    let mut centroids: Vec<Vec<f32>> = vectors.iter().take(k).cloned().collect();
    let mut assignments = vec![0usize; vectors.len()];

    for _ in 0..10 {
        for (i, v) in vectors.iter().enumerate() {
            let mut best = 0;
            let mut best_score = f32::MIN;
            for (ci, c) in centroids.iter().enumerate() {
                let score = cosine_similarity(v, c);
                if score > best_score {
                    best_score = score;
                    best = ci;
                }
            }
            assignments[i] = best;
        }

        let mut sums = vec![vec![0f32; dim]; k];
        let mut counts = vec![0usize; k];
        for (i, v) in vectors.iter().enumerate() {
            let c = assignments[i];
            counts[c] += 1;
            for (d, val) in v.iter().enumerate() {
                sums[c][d] += val;
            }
        }
        for c in 0..k {
            if counts[c] > 0 {
                for d in 0..dim {
                    centroids[c][d] = sums[c][d] / counts[c] as f32;
                }
            }
        }
    }

    let mut cluster_sizes = vec![0usize; k];
    for &c in &assignments {
        cluster_sizes[c] += 1;
    }

    let points = vectors
        .iter()
        .map(|v| (*v.first().unwrap_or(&0.0), *v.get(1).unwrap_or(&0.0)))
        .collect();

    ClusterProjection { points, centroids, cluster_sizes }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::RandomEmbeddingProvider;

    fn store() -> MemoryVectorStore {
        MemoryVectorStore::new(
            Arc::new(RandomEmbeddingProvider::new(16)),
            Arc::new(PerformanceMonitor::with_defaults()),
        )
    }

    #[tokio::test]
    async fn upsert_requires_some_content() {
        let store = store();
        let mut a = Article::minimal("u1", "", "src", None, None, "topic");
        a.summary = None;
        let err = store.upsert(&a, None).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn upsert_is_idempotent_for_search() {
        let store = store();
        let a = Article::minimal("u1", "Title", "src", None, Some("summary".into()), "topic");
        store.upsert(&a, None).await.unwrap();
        store.upsert(&a, None).await.unwrap();
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn search_on_empty_store_returns_empty() {
        let store = store();
        let hits = store.search("anything", 5, None).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn similar_on_missing_seed_returns_empty() {
        let store = store();
        let hits = store.similar("missing", 5).await.unwrap();
        assert!(hits.is_empty());
    }
}

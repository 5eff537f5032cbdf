use std::sync::Arc;

use newsradar::metrics::PerformanceMonitor;
use newsradar::models::Article;
use newsradar::vector::{RandomEmbeddingProvider, DEFAULT_DIMENSION};
use newsradar::{MemoryVectorStore, VectorStore};

fn store() -> MemoryVectorStore {
    let embeddings = Arc::new(RandomEmbeddingProvider::new(DEFAULT_DIMENSION));
    let metrics = Arc::new(PerformanceMonitor::with_defaults());
    MemoryVectorStore::new(embeddings, metrics)
}

#[tokio::test]
async fn upserted_article_is_findable_by_similar() {
    let store = store();
    let a = Article::minimal("https://ex.com/a", "AI breakthrough", "ex.com", Some("2025-01-01".to_string()), Some("Researchers announce a new model.".to_string()), "ai");
    let b = Article::minimal("https://ex.com/b", "Unrelated gardening tips", "ex.com", Some("2025-01-02".to_string()), Some("How to grow tomatoes.".to_string()), "gardening");

    store.upsert(&a, None).await.unwrap();
    store.upsert(&b, None).await.unwrap();
    assert_eq!(store.len(), 2);

    let hits = store.similar("https://ex.com/a", 5).await.unwrap();
    assert!(hits.iter().all(|h| h.id != "https://ex.com/a"), "seed must be excluded from its own neighbors");
}

#[tokio::test]
async fn search_on_empty_store_is_empty_without_embedding_call() {
    let store = store();
    let hits = store.search("anything", 5, None).await.unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn get_by_metadata_filters_on_exact_match() {
    let store = store();
    let a = Article::minimal("https://ex.com/a", "AI policy shift", "ex.com", None, Some("text".to_string()), "ai-policy");
    let b = Article::minimal("https://ex.com/b", "Sports roundup", "ex.com", None, Some("text".to_string()), "sports");
    store.upsert(&a, None).await.unwrap();
    store.upsert(&b, None).await.unwrap();

    let mut filter = std::collections::HashMap::new();
    filter.insert("topic".to_string(), serde_json::Value::String("ai-policy".to_string()));

    let hits = store.get_by_metadata(&filter, None).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].0, "https://ex.com/a");
}

#[tokio::test]
async fn upsert_with_no_content_is_rejected() {
    let store = store();
    let mut a = Article::minimal("https://ex.com/c", "", "ex.com", None, None, "ai");
    a.title = String::new();
    let result = store.upsert(&a, None).await;
    assert!(result.is_err());
}

#[test]
fn project_clusters_vectors_into_three_groups() {
    let store = store();
    let vectors = vec![vec![1.0, 0.0], vec![0.9, 0.1], vec![-1.0, 0.0], vec![-0.9, -0.1], vec![0.0, 1.0], vec![0.1, 0.9]];
    let projection = store.project(&vectors);
    assert_eq!(projection.points.len(), vectors.len());
    assert_eq!(projection.centroids.len(), 3);
    assert_eq!(projection.cluster_sizes.iter().sum::<usize>(), vectors.len());
}

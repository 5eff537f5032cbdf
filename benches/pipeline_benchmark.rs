use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tokio::runtime::Runtime;

use newsradar::metrics::PerformanceMonitor;
use newsradar::models::Article;
use newsradar::vector::RandomEmbeddingProvider;
use newsradar::{MemoryVectorStore, VectorStore};

async fn seeded_store(size: usize) -> MemoryVectorStore {
    let store = MemoryVectorStore::new(
        Arc::new(RandomEmbeddingProvider::new(256)),
        Arc::new(PerformanceMonitor::with_defaults()),
    );
    for i in 0..size {
        let article = Article::minimal(
            format!("https://example.com/article-{i}"),
            format!("Headline {i}"),
            "example.com",
            Some("2025-01-01".to_string()),
            Some(format!("Summary text for article {i} about a recurring topic.")),
            "benchmark-topic",
        );
        store.upsert(&article, None).await.unwrap();
    }
    store
}

fn bench_vector_store(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("vector_store");
    group.measurement_time(Duration::from_secs(10));

    for size in [100, 1_000] {
        let store = rt.block_on(seeded_store(size));

        group.bench_function(format!("search_top10_{size}"), |b| {
            b.iter(|| {
                rt.block_on(async { store.search(black_box("recurring topic"), 10, None).await.unwrap() })
            })
        });

        group.bench_function(format!("similar_top10_{size}"), |b| {
            b.iter(|| {
                rt.block_on(async { store.similar(black_box("https://example.com/article-0"), 10).await.unwrap() })
            })
        });
    }

    group.finish();
}

fn bench_cosine_similarity(c: &mut Criterion) {
    let a: Vec<f32> = (0..1536).map(|i| (i as f32).sin()).collect();
    let b: Vec<f32> = (0..1536).map(|i| (i as f32).cos()).collect();

    c.bench_function("cosine_similarity_1536dim", |bench| {
        bench.iter(|| newsradar::vector::cosine_similarity(black_box(&a), black_box(&b)))
    });
}

fn bench_analysis_cache(c: &mut Criterion) {
    use newsradar::cache::{AnalysisCache, CacheKey};

    let cache: AnalysisCache<String> = AnalysisCache::with_defaults();
    let key = CacheKey { uri: "https://example.com/bench".to_string(), model_name: "gpt-4o-mini".to_string() };
    let content_hash = AnalysisCache::<String>::content_hash("some article body text");
    cache.set(key.clone(), content_hash.clone(), "cached analysis".to_string(), "template-hash".to_string());

    c.bench_function("analysis_cache_hit", |b| {
        b.iter(|| cache.get(black_box(&key), black_box(&content_hash), black_box("template-hash")))
    });
}

criterion_group!(benches, bench_vector_store, bench_cosine_similarity, bench_analysis_cache);
criterion_main!(benches);

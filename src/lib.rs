pub mod analyzer;
pub mod cache;
pub mod config;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod mediabias;
pub mod metrics;
pub mod models;
pub mod monitor;
pub mod prompts;
pub mod providers;
pub mod relevance;
pub mod scraper;
pub mod store;
pub mod tasks;
pub mod vector;

pub use analyzer::{Analysis, AnalysisConfig, ArticleAnalyzer};
pub use cache::{AnalysisCache, CacheKey, CacheStats};
pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use ingest::{AutoIngestService, IngestRunResult, QualityReview};
pub use llm::{LlmClient, LlmRequestConfig};
pub use mediabias::MediaBiasRegistry;
pub use metrics::{MetricsConfig, OperationType, PerformanceMonitor, PerformanceSummary};
pub use monitor::{KeywordMonitor, TickSummary};
pub use prompts::{ChatMessage, PromptRegistry, PromptTemplate};
pub use providers::{NewsApiCollector, ProviderCollector, RateLimitedCollector};
pub use relevance::{RelevanceCalculator, RelevanceResult};
pub use scraper::{ScrapedDocument, Scraper};
pub use store::{RelationalStore, SurrealStore};
pub use tasks::{BackgroundTaskManager, TaskHandle, TaskManagerSummary};
pub use vector::{EmbeddingProvider, MemoryVectorStore, OpenAiEmbeddingProvider, RandomEmbeddingProvider, VectorStore};

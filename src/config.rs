use std::env;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::AppResult;

const OPENAI_KEY_SUBSTRING: &str = "OPENAI_API_KEY";

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct FileConfig {
    database: DatabaseFileConfig,
    vector_store: VectorStoreFileConfig,
    monitor: MonitorFileConfig,
    observability: ObservabilityFileConfig,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct DatabaseFileConfig {
    db_type: Option<String>,
    db_host: Option<String>,
    db_port: Option<u16>,
    db_name: Option<String>,
    db_pool_size: Option<u32>,
    db_max_overflow: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct VectorStoreFileConfig {
    dir: Option<String>,
    embedding_dimension: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct MonitorFileConfig {
    daily_request_limit: Option<u32>,
    max_concurrent_tasks: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct ObservabilityFileConfig {
    log_filter: Option<String>,
}

/// Process-wide settings assembled once at startup (C15). Environment
/// variables win over `newsradar.toml` values, which win over defaults.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_type: String,
    pub db_host: Option<String>,
    pub db_port: Option<u16>,
    pub db_name: String,
    pub db_pool_size: u32,
    pub db_max_overflow: u32,

    pub vector_store_dir: Option<String>,
    pub embedding_dimension: usize,
    pub openai_api_key: Option<String>,

    pub daily_request_limit: u32,
    pub max_concurrent_tasks: usize,

    pub log_filter: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            db_type: "memory".to_string(),
            db_host: None,
            db_port: None,
            db_name: "newsradar".to_string(),
            db_pool_size: 5,
            db_max_overflow: 10,
            vector_store_dir: None,
            embedding_dimension: 1536,
            openai_api_key: None,
            daily_request_limit: 200,
            max_concurrent_tasks: 3,
            log_filter: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from `newsradar.toml` (if present in `dir`) overlaid
    /// with environment variables, per §6.4 / §4.12.
    pub fn load_from_dir(dir: &Path) -> AppResult<Self> {
        let file_cfg = Self::read_file_config(dir)?;
        Ok(Self::from_file_and_env(file_cfg))
    }

    pub fn load() -> AppResult<Self> {
        Self::load_from_dir(Path::new("."))
    }

    fn read_file_config(dir: &Path) -> AppResult<FileConfig> {
        let path = dir.join("newsradar.toml");
        if !path.exists() {
            return Ok(FileConfig::default());
        }
        let contents = fs::read_to_string(&path)?;
        toml::from_str(&contents)
            .map_err(|e| crate::error::AppError::Internal(format!("invalid newsradar.toml: {e}")))
    }

    fn from_file_and_env(file_cfg: FileConfig) -> Self {
        let defaults = AppConfig::default();

        let db_type = env::var("DB_TYPE")
            .ok()
            .or(file_cfg.database.db_type)
            .unwrap_or(defaults.db_type);
        let db_host = env::var("DB_HOST").ok().or(file_cfg.database.db_host);
        let db_port = env::var("DB_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .or(file_cfg.database.db_port);
        let db_name = env::var("DB_NAME")
            .ok()
            .or(file_cfg.database.db_name)
            .unwrap_or(defaults.db_name);
        let db_pool_size = env::var("DB_POOL_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .or(file_cfg.database.db_pool_size)
            .unwrap_or(defaults.db_pool_size);
        let db_max_overflow = env::var("DB_MAX_OVERFLOW")
            .ok()
            .and_then(|v| v.parse().ok())
            .or(file_cfg.database.db_max_overflow)
            .unwrap_or(defaults.db_max_overflow);

        let vector_store_dir = env::var("CHROMA_DB_DIR").ok().or(file_cfg.vector_store.dir);
        let embedding_dimension = file_cfg
            .vector_store
            .embedding_dimension
            .unwrap_or(defaults.embedding_dimension);

        let openai_api_key = Self::find_openai_key();

        let daily_request_limit = file_cfg
            .monitor
            .daily_request_limit
            .unwrap_or(defaults.daily_request_limit);
        let max_concurrent_tasks = env::var("MAX_CONCURRENT_TASKS")
            .ok()
            .and_then(|v| v.parse().ok())
            .or(file_cfg.monitor.max_concurrent_tasks)
            .unwrap_or(defaults.max_concurrent_tasks);

        let log_filter = env::var("RUST_LOG")
            .ok()
            .or(file_cfg.observability.log_filter)
            .unwrap_or(defaults.log_filter);

        AppConfig {
            db_type,
            db_host,
            db_port,
            db_name,
            db_pool_size,
            db_max_overflow,
            vector_store_dir,
            embedding_dimension,
            openai_api_key,
            daily_request_limit,
            max_concurrent_tasks,
            log_filter,
        }
    }

    /// Per §6.4: any env var whose *name* contains `OPENAI_API_KEY` counts.
    fn find_openai_key() -> Option<String> {
        env::vars().find_map(|(k, v)| {
            if k.contains(OPENAI_KEY_SUBSTRING) && !v.is_empty() {
                Some(v)
            } else {
                None
            }
        })
    }

    pub fn has_embedding_provider(&self) -> bool {
        self.openai_api_key.is_some()
    }
}

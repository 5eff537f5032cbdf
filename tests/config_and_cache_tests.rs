use std::sync::Mutex;
use std::time::Duration;

use newsradar::cache::{AnalysisCache, CacheKey};
use newsradar::config::AppConfig;

/// `AppConfig::load_from_dir` reads process-wide env vars; serialize the
/// env-touching tests in this file so they don't race each other.
static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_config_env() {
    for key in ["DB_TYPE", "DB_HOST", "DB_PORT", "DB_NAME", "DB_POOL_SIZE", "DB_MAX_OVERFLOW", "MAX_CONCURRENT_TASKS", "RUST_LOG"] {
        std::env::remove_var(key);
    }
}

#[test]
fn defaults_apply_when_no_file_or_env_present() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_config_env();

    let dir = tempfile::tempdir().unwrap();
    let config = AppConfig::load_from_dir(dir.path()).unwrap();

    assert_eq!(config.db_type, "memory");
    assert_eq!(config.db_name, "newsradar");
    assert_eq!(config.daily_request_limit, 200);
    assert_eq!(config.max_concurrent_tasks, 3);
}

#[test]
fn file_values_override_defaults() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_config_env();

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("newsradar.toml"),
        r#"
[database]
db_type = "rocksdb"
db_name = "from-file"

[monitor]
daily_request_limit = 50
"#,
    )
    .unwrap();

    let config = AppConfig::load_from_dir(dir.path()).unwrap();
    assert_eq!(config.db_type, "rocksdb");
    assert_eq!(config.db_name, "from-file");
    assert_eq!(config.daily_request_limit, 50);
}

#[test]
fn env_vars_win_over_file_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_config_env();

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("newsradar.toml"),
        r#"
[database]
db_name = "from-file"
"#,
    )
    .unwrap();
    std::env::set_var("DB_NAME", "from-env");

    let config = AppConfig::load_from_dir(dir.path()).unwrap();
    assert_eq!(config.db_name, "from-env", "env must win over file per precedence rules");

    std::env::remove_var("DB_NAME");
}

#[test]
fn missing_toml_file_is_not_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_config_env();

    let dir = tempfile::tempdir().unwrap();
    let result = AppConfig::load_from_dir(dir.path());
    assert!(result.is_ok());
}

#[test]
fn malformed_toml_file_is_reported_as_internal_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_config_env();

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("newsradar.toml"), "not = [valid toml").unwrap();

    let result = AppConfig::load_from_dir(dir.path());
    assert!(result.is_err());
}

#[test]
fn cache_hit_rate_reflects_hits_and_misses() {
    let cache: AnalysisCache<String> = AnalysisCache::with_defaults();
    let key = CacheKey { uri: "https://ex.com/a".to_string(), model_name: "gpt-4o-mini".to_string() };
    let content_hash = AnalysisCache::<String>::content_hash("article body");

    assert!(cache.get(&key, &content_hash, "template-v1").is_none());
    cache.set(key.clone(), content_hash.clone(), "analysis".to_string(), "template-v1".to_string());
    assert_eq!(cache.get(&key, &content_hash, "template-v1"), Some("analysis".to_string()));

    let stats = cache.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert!((stats.hit_rate() - 0.5).abs() < 1e-9);
}

#[test]
fn cache_entry_expires_after_ttl() {
    let cache: AnalysisCache<String> = AnalysisCache::new(10, Duration::from_millis(1));
    let key = CacheKey { uri: "https://ex.com/b".to_string(), model_name: "gpt-4o-mini".to_string() };
    let content_hash = AnalysisCache::<String>::content_hash("body");

    cache.set(key.clone(), content_hash.clone(), "analysis".to_string(), "template-v1".to_string());
    std::thread::sleep(Duration::from_millis(10));

    assert_eq!(cache.get(&key, &content_hash, "template-v1"), None);
    assert_eq!(cache.stats().expired, 1);
}

#[test]
fn template_hash_change_invalidates_cached_entry() {
    let cache: AnalysisCache<String> = AnalysisCache::with_defaults();
    let key = CacheKey { uri: "https://ex.com/c".to_string(), model_name: "gpt-4o-mini".to_string() };
    let content_hash = AnalysisCache::<String>::content_hash("body");

    cache.set(key.clone(), content_hash.clone(), "analysis".to_string(), "template-v1".to_string());
    assert_eq!(cache.get(&key, &content_hash, "template-v2"), None, "prompt template bump must miss");
    assert_eq!(cache.stats().mismatched, 1);
}

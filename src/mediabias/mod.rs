use std::sync::Arc;

use tracing::warn;
use url::Url;

use crate::error::AppResult;
use crate::models::MediaBiasSource;
use crate::store::RelationalStore;

/// Domain-keyed lookup of bias/factuality/credibility metadata (C5, §4 row).
/// Read-mostly; enabling a disabled source on first successful lookup is a
/// single-row UPDATE with no read-modify-write lock (§5).
pub struct MediaBiasRegistry {
    store: Arc<dyn RelationalStore>,
}

impl MediaBiasRegistry {
    pub fn new(store: Arc<dyn RelationalStore>) -> Self {
        MediaBiasRegistry { store }
    }

    /// Looks up by source name first, falling back to the URI's host, per
    /// §4.8 step (a): "keyed by source, else by URI host".
    pub async fn lookup(&self, source: &str, uri: &str) -> AppResult<Option<MediaBiasSource>> {
        let normalized_source = normalize_domain(source);
        if let Some(hit) = self.store.get_media_bias(&normalized_source).await? {
            return self.auto_enable_and_return(hit).await;
        }

        if let Some(host) = host_of(uri) {
            if let Some(hit) = self.store.get_media_bias(&host).await? {
                return self.auto_enable_and_return(hit).await;
            }
        }

        Ok(None)
    }

    async fn auto_enable_and_return(&self, mut hit: MediaBiasSource) -> AppResult<Option<MediaBiasSource>> {
        if !hit.enabled {
            self.store.enable_media_bias(&hit.source).await?;
            hit.enabled = true;
        }
        Ok(Some(hit))
    }
}

fn normalize_domain(source: &str) -> String {
    source.trim().to_lowercase().trim_start_matches("www.").to_string()
}

fn host_of(uri: &str) -> Option<String> {
    match Url::parse(uri) {
        Ok(url) => url.host_str().map(normalize_domain),
        Err(e) => {
            warn!(uri, error = %e, "could not parse article uri for media-bias host fallback");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_domain_strips_www_and_case() {
        assert_eq!(normalize_domain("WWW.Example.com"), "example.com");
    }

    #[test]
    fn host_of_extracts_host_from_uri() {
        assert_eq!(host_of("https://example.com/a/b"), Some("example.com".to_string()));
    }

    #[test]
    fn host_of_returns_none_for_garbage_uri() {
        assert_eq!(host_of("not a url"), None);
    }
}

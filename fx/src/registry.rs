//! Named providers, each fronted by its own rate cache.

use std::sync::Arc;

use tracing::info;

use crate::cache::RateCache;
use crate::config::RateCacheConfig;
use crate::error::{FxError, FxResult};
use crate::provider::{ProviderInfo, RateProvider};

/// Ordered set of provider caches plus the default provider id.
pub struct ProviderRegistry {
    caches: Vec<Arc<RateCache>>,
    default_id: String,
}

impl ProviderRegistry {
    /// Create an empty registry whose default will be `default_id`.
    pub fn new(default_id: impl Into<String>) -> Self {
        Self {
            caches: Vec::new(),
            default_id: default_id.into(),
        }
    }

    /// Register a provider behind a new cache. Re-registering an id replaces it.
    pub fn register(&mut self, provider: Arc<dyn RateProvider>, config: RateCacheConfig) {
        let id = provider.id().to_string();
        let cache = Arc::new(RateCache::with_config(provider, config));

        match self.caches.iter().position(|c| c.provider().id() == id) {
            Some(idx) => self.caches[idx] = cache,
            None => self.caches.push(cache),
        }
        info!(provider = %id, "Registered rate provider");
    }

    /// Fail unless the default provider is registered.
    pub fn validate(&self) -> FxResult<()> {
        if self.find(&self.default_id).is_none() {
            return Err(FxError::InvalidConfig(format!(
                "default provider {} is not registered",
                self.default_id
            )));
        }
        Ok(())
    }

    /// Default provider id.
    pub fn default_id(&self) -> &str {
        &self.default_id
    }

    pub fn is_default(&self, id: &str) -> bool {
        self.default_id == id
    }

    /// Cache for `id`, or for the default provider when `id` is `None`.
    pub fn cache(&self, id: Option<&str>) -> FxResult<&Arc<RateCache>> {
        let id = id.unwrap_or(&self.default_id);
        self.find(id)
            .ok_or_else(|| FxError::UnknownProvider(id.to_string()))
    }

    /// Every registered cache, in registration order.
    pub fn caches(&self) -> impl Iterator<Item = &Arc<RateCache>> {
        self.caches.iter()
    }

    /// Provider descriptions, in registration order.
    pub fn providers(&self) -> Vec<ProviderInfo> {
        self.caches.iter().map(|c| c.provider().info()).collect()
    }

    /// Apply one cache configuration to every provider.
    pub fn configure_all(
        &self,
        ttl_seconds: i64,
        max_entries: usize,
        serve_stale_on_error: bool,
    ) -> FxResult<()> {
        // Validate once so a bad value cannot leave caches half-updated.
        RateCacheConfig::new(ttl_seconds, max_entries, serve_stale_on_error)?;
        for cache in &self.caches {
            cache.configure(ttl_seconds, max_entries, serve_stale_on_error)?;
        }
        Ok(())
    }

    fn find(&self, id: &str) -> Option<&Arc<RateCache>> {
        self.caches.iter().find(|c| c.provider().id() == id)
    }
}

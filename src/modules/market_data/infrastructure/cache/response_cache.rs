use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::store::{CacheStore, FileStore, MemoryStore, StoredEntry};
use crate::modules::market_data::domain::{DataCategory, ProviderKind};
use crate::shared::errors::{AppError, AppResult};

/// Cache statistics for monitoring
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries_count: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        if self.hits + self.misses == 0 {
            0.0
        } else {
            self.hits as f64 / (self.hits + self.misses) as f64
        }
    }
}

/// TTL-keyed response cache over a pluggable backend.
///
/// Identical logical requests always map to the same slot: the key
/// canonicalizes `(provider, endpoint, params)` with the parameters sorted,
/// so the caller's argument order never matters.
pub struct ResponseCache {
    store: Arc<dyn CacheStore>,
    ttl_overrides: HashMap<DataCategory, Duration>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            ttl_overrides: HashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn in_memory(max_entries: usize) -> Self {
        Self::new(Arc::new(MemoryStore::new(max_entries)))
    }

    /// Persisted cache under `dir`; falls back to the bounded in-process
    /// store when the directory is unusable.
    pub fn with_file_store(dir: impl AsRef<Path>, fallback_max_entries: usize) -> Self {
        match FileStore::new(&dir) {
            Ok(store) => {
                info!(dir = %dir.as_ref().display(), "using file-backed response cache");
                Self::new(Arc::new(store))
            }
            Err(e) => {
                warn!(
                    dir = %dir.as_ref().display(),
                    error = %e,
                    "cache directory unusable, falling back to in-memory store"
                );
                Self::in_memory(fallback_max_entries)
            }
        }
    }

    pub fn with_ttl_overrides(mut self, overrides: HashMap<DataCategory, Duration>) -> Self {
        self.ttl_overrides = overrides;
        self
    }

    /// Canonical order-independent key for one logical request.
    pub fn canonical_key(
        provider: ProviderKind,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> String {
        let mut sorted: Vec<(&str, &str)> = params.to_vec();
        sorted.sort_unstable();

        let mut key = format!("{}:{}", provider, endpoint);
        for (name, value) in sorted {
            key.push(':');
            key.push_str(name);
            key.push('=');
            key.push_str(&urlencoding::encode(value));
        }
        key
    }

    pub fn ttl_for(&self, category: DataCategory) -> Duration {
        self.ttl_overrides
            .get(&category)
            .copied()
            .unwrap_or_else(|| category.default_ttl())
    }

    /// Returns only unexpired entries. Corrupt entries are logged, dropped
    /// and reported as a miss.
    pub async fn get(&self, key: &str) -> Option<Value> {
        match self.store.get(key).await {
            Ok(Some(entry)) if !entry.is_expired() => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "cache hit");
                Some(entry.payload)
            }
            Ok(Some(_)) => {
                let _ = self.store.remove(key).await;
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "cache entry expired");
                None
            }
            Ok(None) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "cache miss");
                None
            }
            Err(AppError::CacheCorruption(msg)) => {
                warn!(key = %key, error = %msg, "corrupt cache entry treated as miss");
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                warn!(key = %key, error = %e, "cache read failed, treating as miss");
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Overwrites any existing entry under `key`.
    pub async fn set(
        &self,
        key: &str,
        value: Value,
        category: DataCategory,
        ttl: Duration,
    ) -> AppResult<()> {
        let entry = StoredEntry::new(value, category, ttl);
        self.store.set(key, entry).await?;
        debug!(key = %key, ttl_secs = ttl.as_secs(), "cached response");
        Ok(())
    }

    /// Cache a provider response under the canonical key, using the
    /// category's TTL unless one is given explicitly.
    pub async fn cache_response(
        &self,
        provider: ProviderKind,
        endpoint: &str,
        params: &[(&str, &str)],
        payload: Value,
        category: DataCategory,
        ttl: Option<Duration>,
    ) -> AppResult<()> {
        let key = Self::canonical_key(provider, endpoint, params);
        let ttl = ttl.unwrap_or_else(|| self.ttl_for(category));
        self.set(&key, payload, category, ttl).await
    }

    /// Look up a previously cached provider response.
    pub async fn cached_response(
        &self,
        provider: ProviderKind,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Option<Value> {
        let key = Self::canonical_key(provider, endpoint, params);
        self.get(&key).await
    }

    /// Drop expired entries, returning how many were removed.
    pub async fn clear_expired(&self) -> usize {
        match self.store.purge_expired().await {
            Ok(removed) => {
                if removed > 0 {
                    debug!(removed, "cleared expired cache entries");
                }
                removed
            }
            Err(e) => {
                warn!(error = %e, "failed to purge expired cache entries");
                0
            }
        }
    }

    pub async fn clear_all(&self) {
        if let Err(e) = self.store.clear().await {
            warn!(error = %e, "failed to clear cache");
        }
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        info!("cache cleared");
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries_count: self.store.len().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_key_ignores_parameter_order() {
        let a = ResponseCache::canonical_key(
            ProviderKind::Fixer,
            "latest",
            &[("base", "EUR"), ("symbols", "USD")],
        );
        let b = ResponseCache::canonical_key(
            ProviderKind::Fixer,
            "latest",
            &[("symbols", "USD"), ("base", "EUR")],
        );
        assert_eq!(a, b);
    }

    #[test]
    fn canonical_key_separates_endpoints_and_providers() {
        let a = ResponseCache::canonical_key(ProviderKind::Fixer, "latest", &[("base", "EUR")]);
        let b = ResponseCache::canonical_key(ProviderKind::Fixer, "history", &[("base", "EUR")]);
        let c =
            ResponseCache::canonical_key(ProviderKind::CurrencyApi, "latest", &[("base", "EUR")]);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn round_trip_preserves_payload() {
        let cache = ResponseCache::in_memory(16);
        cache
            .set(
                "k",
                json!({"rate": 1.1001}),
                DataCategory::Price,
                Duration::from_secs(30),
            )
            .await
            .unwrap();

        assert_eq!(cache.get("k").await, Some(json!({"rate": 1.1001})));
        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
    }

    #[tokio::test]
    async fn expired_entry_reads_as_none() {
        let cache = ResponseCache::in_memory(16);
        cache
            .set("k", json!(1.0), DataCategory::Price, Duration::ZERO)
            .await
            .unwrap();

        assert!(cache.get("k").await.is_none());
        assert_eq!(cache.stats().await.misses, 1);
    }

    #[tokio::test]
    async fn ttl_override_takes_precedence() {
        let mut overrides = HashMap::new();
        overrides.insert(DataCategory::Price, Duration::from_secs(5));
        let cache = ResponseCache::in_memory(16).with_ttl_overrides(overrides);

        assert_eq!(cache.ttl_for(DataCategory::Price), Duration::from_secs(5));
        assert_eq!(
            cache.ttl_for(DataCategory::News),
            Duration::from_secs(3_600)
        );
    }
}

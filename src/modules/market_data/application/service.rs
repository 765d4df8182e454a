use std::sync::Arc;

use crate::modules::market_data::domain::{DataCategory, FeedSettings, ProviderKind};
use crate::modules::market_data::infrastructure::cache::{CacheStats, ResponseCache};
use crate::modules::market_data::infrastructure::manager::{ApiStatistics, SmartApiManager};
use crate::modules::market_data::infrastructure::monitoring::{
    HealthMonitor, HealthMonitorConfig, HealthProbe, HttpHealthProbe,
};
use crate::modules::market_data::infrastructure::rate_limit::RateLimitTracker;
use crate::shared::errors::AppResult;

/// Wires the feed stack together: settings, tracker, health, cache, manager.
///
/// One service instance is one isolated stack. Nothing here is process-global,
/// so tests and embedders can run several side by side.
pub struct MarketDataService {
    settings: Arc<FeedSettings>,
    tracker: Arc<RateLimitTracker>,
    health: Arc<HealthMonitor>,
    cache: Arc<ResponseCache>,
    manager: SmartApiManager,
}

impl MarketDataService {
    pub fn new(settings: FeedSettings) -> AppResult<Self> {
        settings.validate()?;
        let probe: Arc<dyn HealthProbe> = Arc::new(HttpHealthProbe::new());
        Self::with_probe(settings, probe)
    }

    pub fn with_probe(settings: FeedSettings, probe: Arc<dyn HealthProbe>) -> AppResult<Self> {
        settings.validate()?;

        let cache = match &settings.cache_dir {
            Some(dir) => ResponseCache::with_file_store(dir, settings.max_cache_entries),
            None => ResponseCache::in_memory(settings.max_cache_entries),
        }
        .with_ttl_overrides(settings.ttl_overrides.clone());

        let health_config = HealthMonitorConfig {
            probe_staleness: settings.probe_staleness,
            ..HealthMonitorConfig::default()
        };

        let settings = Arc::new(settings);
        let tracker = Arc::new(RateLimitTracker::new());
        let health = Arc::new(HealthMonitor::new(probe, health_config));
        let cache = Arc::new(cache);
        let manager = SmartApiManager::new(settings.clone(), tracker.clone(), health.clone());

        Ok(Self {
            settings,
            tracker,
            health,
            cache,
            manager,
        })
    }

    pub fn settings(&self) -> &Arc<FeedSettings> {
        &self.settings
    }

    pub fn tracker(&self) -> &Arc<RateLimitTracker> {
        &self.tracker
    }

    pub fn health(&self) -> &Arc<HealthMonitor> {
        &self.health
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub fn manager(&self) -> &SmartApiManager {
        &self.manager
    }

    /// Next provider to try for a category, or `None` when the chain is
    /// exhausted.
    pub async fn available_provider(&self, category: DataCategory) -> Option<ProviderKind> {
        self.manager.available_provider(category).await
    }

    pub async fn eligible_providers(&self, category: DataCategory) -> Vec<ProviderKind> {
        self.manager.eligible_providers(category).await
    }

    pub async fn statistics(&self) -> ApiStatistics {
        self.manager.statistics().await
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }
}

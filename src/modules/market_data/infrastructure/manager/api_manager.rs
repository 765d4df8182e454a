use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::modules::market_data::domain::{
    DataCategory, FeedSettings, HealthStatus, ProviderConfig, ProviderKind, WindowKind,
};
use crate::modules::market_data::infrastructure::monitoring::HealthMonitor;
use crate::modules::market_data::infrastructure::rate_limit::RateLimitTracker;

/// Usage, health and eligibility snapshot, for observability and tests.
#[derive(Debug, Clone, Serialize)]
pub struct ApiStatistics {
    pub usage: HashMap<ProviderKind, HashMap<WindowKind, usize>>,
    pub health: HashMap<ProviderKind, HealthStatus>,
    pub eligible: HashMap<DataCategory, Vec<ProviderKind>>,
}

/// Selects the next provider for a data category from its ordered fallback
/// chain, consulting the rate tracker and the health monitor.
///
/// Exhaustion is an expected outcome, not an error: when every provider in a
/// chain is throttled or unhealthy the answer is simply `None` and the caller
/// decides whether to wait, serve stale cache, or skip.
pub struct SmartApiManager {
    settings: Arc<FeedSettings>,
    tracker: Arc<RateLimitTracker>,
    health: Arc<HealthMonitor>,
}

impl SmartApiManager {
    pub fn new(
        settings: Arc<FeedSettings>,
        tracker: Arc<RateLimitTracker>,
        health: Arc<HealthMonitor>,
    ) -> Self {
        Self {
            settings,
            tracker,
            health,
        }
    }

    /// First provider in the category chain that is not unhealthy and is
    /// within budget on every configured window.
    pub async fn available_provider(&self, category: DataCategory) -> Option<ProviderKind> {
        for provider in self.settings.chain(category) {
            if self.is_eligible(provider).await {
                return Some(provider.kind);
            }
        }
        debug!(category = %category, "provider chain exhausted");
        None
    }

    /// Every provider in the category chain currently eligible for a call,
    /// in chain order. The consensus path fans out across all of them.
    pub async fn eligible_providers(&self, category: DataCategory) -> Vec<ProviderKind> {
        let mut eligible = Vec::new();
        for provider in self.settings.chain(category) {
            if self.is_eligible(provider).await {
                eligible.push(provider.kind);
            }
        }
        eligible
    }

    async fn is_eligible(&self, provider: &ProviderConfig) -> bool {
        if !self.within_budget(provider) {
            debug!(provider = %provider.kind, "throttled, skipping");
            return false;
        }

        // Degraded providers stay in rotation; only Unhealthy is excluded.
        // Both states are re-evaluated on every scheduling decision.
        if self.health.status(provider.kind).await == HealthStatus::Unhealthy {
            debug!(provider = %provider.kind, "unhealthy, skipping");
            return false;
        }

        true
    }

    fn within_budget(&self, provider: &ProviderConfig) -> bool {
        provider.limits.iter().all(|limit| {
            self.tracker.can_call(
                provider.kind,
                limit.window,
                limit.max_calls,
                limit.window.period(),
            )
        })
    }

    pub async fn statistics(&self) -> ApiStatistics {
        let mut eligible = HashMap::new();
        for category in [
            DataCategory::Price,
            DataCategory::Series,
            DataCategory::Economic,
            DataCategory::Sentiment,
            DataCategory::News,
        ] {
            eligible.insert(category, self.eligible_providers(category).await);
        }

        ApiStatistics {
            usage: self.tracker.usage(),
            health: self.health.all_statuses().await,
            eligible,
        }
    }
}

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::modules::market_data::domain::value_objects::{
    HealthStatus, ProviderHealth, ProviderHealthMetrics, ProviderKind,
};
use crate::shared::errors::AppResult;

/// A lightweight reachability check against one provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, provider: ProviderKind) -> AppResult<()>;
}

/// Configuration for health monitoring
#[derive(Debug, Clone)]
pub struct HealthMonitorConfig {
    /// Consecutive call failures before a provider is considered degraded.
    pub degraded_after: u32,
    /// Consecutive call failures before a provider is excluded.
    pub unhealthy_after: u32,
    /// How long a probe result is trusted before `status()` re-probes.
    pub probe_staleness: Duration,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self {
            degraded_after: 3,
            unhealthy_after: 5,
            probe_staleness: Duration::from_secs(600),
        }
    }
}

/// Tracks per-provider health from probe results and observed call outcomes.
pub struct HealthMonitor {
    state: RwLock<HashMap<ProviderKind, ProviderHealth>>,
    probe: Arc<dyn HealthProbe>,
    config: HealthMonitorConfig,
}

impl HealthMonitor {
    pub fn new(probe: Arc<dyn HealthProbe>, config: HealthMonitorConfig) -> Self {
        Self {
            state: RwLock::new(HashMap::new()),
            probe,
            config,
        }
    }

    /// Probe the provider now and record the outcome.
    pub async fn check(&self, provider: ProviderKind) -> HealthStatus {
        let outcome = self.probe.probe(provider).await;
        if let Err(ref e) = outcome {
            warn!(provider = %provider, error = %e, "health probe failed");
        }

        let mut state = self.state.write().await;
        let health = state
            .entry(provider)
            .or_insert_with(|| ProviderHealth::new(provider));
        health.record_probe(outcome.is_ok());
        health.status
    }

    /// Current status for a provider. Never-probed providers are trusted as
    /// healthy; once the last probe exceeds the staleness window the provider
    /// is re-probed before answering.
    pub async fn status(&self, provider: ProviderKind) -> HealthStatus {
        let needs_probe = {
            let state = self.state.read().await;
            match state.get(&provider) {
                Some(health) => health.probe_stale(self.config.probe_staleness),
                None => false,
            }
        };

        if needs_probe {
            debug!(provider = %provider, "probe result stale, re-checking");
            return self.check(provider).await;
        }

        let state = self.state.read().await;
        state
            .get(&provider)
            .map(|health| health.status)
            .unwrap_or(HealthStatus::Healthy)
    }

    /// Record a successful call observed against this provider.
    pub async fn record_success(&self, provider: ProviderKind) {
        let mut state = self.state.write().await;
        state
            .entry(provider)
            .or_insert_with(|| ProviderHealth::new(provider))
            .record_success();
    }

    /// Record a failed call observed against this provider.
    pub async fn record_failure(&self, provider: ProviderKind) {
        let mut state = self.state.write().await;
        let health = state
            .entry(provider)
            .or_insert_with(|| ProviderHealth::new(provider));
        health.record_failure(self.config.degraded_after, self.config.unhealthy_after);
        debug!(
            provider = %provider,
            consecutive = health.consecutive_failures,
            status = ?health.status,
            "recorded call failure"
        );
    }

    /// Snapshot of all tracked providers, for statistics.
    pub async fn all_statuses(&self) -> HashMap<ProviderKind, HealthStatus> {
        let state = self.state.read().await;
        state.iter().map(|(k, h)| (*k, h.status)).collect()
    }

    pub async fn metrics(&self, provider: ProviderKind) -> Option<ProviderHealthMetrics> {
        let state = self.state.read().await;
        state.get(&provider).map(|h| h.to_metrics())
    }
}

/// Probe that issues a GET against each provider's public base endpoint and
/// only asks for reachability, not a meaningful payload.
pub struct HttpHealthProbe {
    client: reqwest::Client,
    endpoints: HashMap<ProviderKind, String>,
}

impl HttpHealthProbe {
    pub fn new() -> Self {
        let endpoints = [
            (ProviderKind::AlphaVantage, "https://www.alphavantage.co"),
            (ProviderKind::TwelveData, "https://api.twelvedata.com"),
            (ProviderKind::Fred, "https://api.stlouisfed.org"),
            (ProviderKind::Finnhub, "https://finnhub.io"),
            (ProviderKind::NewsApi, "https://newsapi.org"),
            (ProviderKind::ExchangeRate, "https://v6.exchangerate-api.com"),
            (
                ProviderKind::FreeCurrency,
                "https://api.freecurrencyapi.com",
            ),
            (ProviderKind::CurrencyApi, "https://api.currencyapi.com"),
            (ProviderKind::Fixer, "http://data.fixer.io"),
            (
                ProviderKind::ExchangeRates,
                "http://api.exchangeratesapi.io",
            ),
        ]
        .into_iter()
        .map(|(kind, url)| (kind, url.to_string()))
        .collect();

        Self {
            client: reqwest::Client::new(),
            endpoints,
        }
    }
}

impl Default for HttpHealthProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe(&self, provider: ProviderKind) -> AppResult<()> {
        let url = self.endpoints.get(&provider).ok_or_else(|| {
            crate::shared::errors::AppError::ConfigurationError(format!(
                "no probe endpoint for {}",
                provider
            ))
        })?;

        let response = self
            .client
            .get(url)
            .timeout(Duration::from_secs(10))
            .send()
            .await?;

        // Any HTTP answer counts as alive; 4xx just means we probed an
        // endpoint that wants parameters.
        debug!(provider = %provider, status = %response.status(), "health probe answered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::errors::AppError;
    use tokio::time::advance;

    fn monitor_with(probe: MockHealthProbe) -> HealthMonitor {
        HealthMonitor::new(Arc::new(probe), HealthMonitorConfig::default())
    }

    #[tokio::test]
    async fn unprobed_provider_is_healthy_without_probing() {
        let mut probe = MockHealthProbe::new();
        probe.expect_probe().never();

        let monitor = monitor_with(probe);
        assert_eq!(
            monitor.status(ProviderKind::AlphaVantage).await,
            HealthStatus::Healthy
        );
    }

    #[tokio::test]
    async fn failed_probe_marks_unhealthy() {
        let mut probe = MockHealthProbe::new();
        probe
            .expect_probe()
            .returning(|_| Err(AppError::ProviderTimeout("no answer".to_string())));

        let monitor = monitor_with(probe);
        assert_eq!(
            monitor.check(ProviderKind::Fixer).await,
            HealthStatus::Unhealthy
        );
        assert_eq!(
            monitor.status(ProviderKind::Fixer).await,
            HealthStatus::Unhealthy
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stale_probe_triggers_recheck() {
        let mut probe = MockHealthProbe::new();
        let mut seq = mockall::Sequence::new();
        probe
            .expect_probe()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(AppError::ProviderTimeout("down".to_string())));
        probe
            .expect_probe()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let monitor = monitor_with(probe);
        monitor.check(ProviderKind::Fred).await;
        assert_eq!(
            monitor.status(ProviderKind::Fred).await,
            HealthStatus::Unhealthy
        );

        // Past the staleness window the next status() re-probes and recovers.
        advance(Duration::from_secs(601)).await;
        assert_eq!(
            monitor.status(ProviderKind::Fred).await,
            HealthStatus::Healthy
        );
    }

    #[tokio::test]
    async fn call_outcomes_degrade_and_recover() {
        let mut probe = MockHealthProbe::new();
        probe.expect_probe().never();
        let monitor = monitor_with(probe);

        for _ in 0..3 {
            monitor.record_failure(ProviderKind::Finnhub).await;
        }
        assert_eq!(
            monitor.status(ProviderKind::Finnhub).await,
            HealthStatus::Degraded
        );

        monitor.record_failure(ProviderKind::Finnhub).await;
        monitor.record_failure(ProviderKind::Finnhub).await;
        assert_eq!(
            monitor.status(ProviderKind::Finnhub).await,
            HealthStatus::Unhealthy
        );

        monitor.record_success(ProviderKind::Finnhub).await;
        assert_eq!(
            monitor.status(ProviderKind::Finnhub).await,
            HealthStatus::Healthy
        );
    }
}
